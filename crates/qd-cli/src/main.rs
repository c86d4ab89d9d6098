//! Operator CLI for the QuickDraw settlement backend.

use anyhow::Result;
use clap::{Parser, Subcommand};

use qd_daemon::auth::SessionVerifier;
use qd_ledger::{Ledger, RpcTreasury};
use qd_types::Principal;

#[derive(Parser)]
#[command(name = "qd")]
#[command(about = "QuickDraw settlement CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Database commands
    Db {
        #[command(subcommand)]
        cmd: DbCmd,
    },

    /// Treasury commands
    Treasury {
        #[command(subcommand)]
        cmd: TreasuryCmd,
    },

    /// Session token utilities (dev / support)
    Session {
        #[command(subcommand)]
        cmd: SessionCmd,
    },
}

#[derive(Subcommand)]
enum DbCmd {
    Status,

    /// Apply SQL migrations. Guardrail: refuses when matches still have money
    /// in motion unless --yes is provided.
    Migrate {
        /// Acknowledge you are migrating a DB with live settlement state.
        #[arg(long, default_value_t = false)]
        yes: bool,
    },
}

#[derive(Subcommand)]
enum TreasuryCmd {
    /// Print the treasury balance in base units.
    Balance,
}

#[derive(Subcommand)]
enum SessionCmd {
    /// Mint a session token for a user/wallet pair. Dev convenience only;
    /// production tokens come from the matchmaking frontend.
    Issue {
        #[arg(long)]
        user: String,

        #[arg(long)]
        wallet: String,

        /// Token lifetime in hours.
        #[arg(long, default_value_t = 24)]
        ttl_hours: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    let cli = Cli::parse();

    match cli.cmd {
        Commands::Db { cmd } => {
            let pool = qd_db::connect_from_env().await?;
            match cmd {
                DbCmd::Status => {
                    let s = qd_db::status(&pool).await?;
                    println!("db_ok={} has_matches_table={}", s.ok, s.has_matches_table);
                }
                DbCmd::Migrate { yes } => {
                    // Guardrail: refuse migrations while matches are active or
                    // completed with an unclaimed payout, unless acknowledged.
                    let n = qd_db::count_live_matches(&pool).await?;
                    if n > 0 && !yes {
                        anyhow::bail!(
                            "REFUSING MIGRATE: detected {} live match(es) with settlement in motion. Re-run with: `qd db migrate --yes`",
                            n
                        );
                    }

                    qd_db::migrate(&pool).await?;
                    println!("migrations_applied=true");
                }
            }
        }

        Commands::Treasury { cmd } => match cmd {
            TreasuryCmd::Balance => {
                let treasury = RpcTreasury::from_env()?;
                let balance = treasury.balance().await?;
                println!("treasury={}", treasury.treasury_address());
                println!("balance={}", balance);
            }
        },

        Commands::Session { cmd } => match cmd {
            SessionCmd::Issue {
                user,
                wallet,
                ttl_hours,
            } => {
                let sessions = SessionVerifier::from_env()?;
                let token = sessions.issue(
                    &Principal::new(user, wallet),
                    chrono::Duration::hours(ttl_hours),
                )?;
                println!("{token}");
            }
        },
    }

    Ok(())
}
