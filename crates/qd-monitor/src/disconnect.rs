//! Disconnect monitor.
//!
//! Scans active matches on a short interval and resolves the ones whose
//! players stopped sending heartbeats: one stale seat forfeits to the other,
//! both stale voids the match and frees the stakes for refund. The
//! resolution decision itself is the pure [`resolve_liveness`] function;
//! everything around it is guarded database writes.

use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use qd_db::MatchRow;
use qd_types::{CancelReason, Settings};

/// Verdict over the two seats' heartbeats.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DisconnectOutcome {
    /// Both players are live (or at least one is within the timeout).
    BothFresh,
    /// Exactly one seat went stale; the other wins by forfeit.
    OneStale { winner_user: String },
    /// Nobody is listening anymore; void the match.
    BothStale,
}

/// Decide liveness for a match. A seat that never pinged is measured from
/// match creation, so a player who joined and vanished before the first
/// heartbeat still times out.
pub fn resolve_liveness(m: &MatchRow, now: DateTime<Utc>, timeout: Duration) -> DisconnectOutcome {
    let p1_seen = m.player1_last_ping.unwrap_or(m.created_at);
    let p2_seen = m.player2_last_ping.unwrap_or(m.created_at);
    let p1_stale = now - p1_seen > timeout;
    let p2_stale = now - p2_seen > timeout;

    match (p1_stale, p2_stale) {
        (false, false) => DisconnectOutcome::BothFresh,
        (true, true) => DisconnectOutcome::BothStale,
        (true, false) => DisconnectOutcome::OneStale {
            winner_user: m.player2_user.clone(),
        },
        (false, true) => DisconnectOutcome::OneStale {
            winner_user: m.player1_user.clone(),
        },
    }
}

/// One pass over the active matches. Returns how many were resolved.
///
/// Re-runnable at any time: resolved matches leave the active set, and the
/// refund marker flip makes the void path single-winner even across
/// concurrent ticks.
pub async fn disconnect_tick(pool: &PgPool, settings: &Settings) -> anyhow::Result<u64> {
    let now = Utc::now();
    let timeout = settings.heartbeat_timeout();
    let mut resolved = 0u64;

    for m in qd_db::scan_active_matches(pool, settings.monitor_grace()).await? {
        match resolve_liveness(&m, now, timeout) {
            DisconnectOutcome::BothFresh => {}
            DisconnectOutcome::OneStale { winner_user } => {
                let deadline = now + settings.claim_window();
                if qd_db::award_win_on_disconnect(pool, m.match_id, &winner_user, deadline).await? {
                    info!(
                        match_id = %m.match_id,
                        winner = %winner_user,
                        claim_deadline = %deadline,
                        "opponent disconnected; win awarded by forfeit"
                    );
                    resolved += 1;
                }
            }
            DisconnectOutcome::BothStale => {
                // The marker flip elects a single winner among racing ticks.
                if !qd_db::try_mark_refund_processed(pool, m.match_id).await? {
                    continue;
                }
                qd_db::cancel_match(pool, m.match_id, CancelReason::BothPlayersDisconnect).await?;
                let freed = qd_db::mark_match_stakes_refund_eligible(
                    pool,
                    m.match_id,
                    CancelReason::BothPlayersDisconnect.as_str(),
                    now + settings.refund_window(),
                )
                .await?;
                info!(
                    match_id = %m.match_id,
                    stakes_freed = freed,
                    "both players disconnected; match voided"
                );
                resolved += 1;
            }
        }
    }

    Ok(resolved)
}

/// Run the disconnect monitor until `shutdown` flips to true.
///
/// If the heartbeat columns are not migrated in yet the monitor disables
/// itself instead of failing the daemon; matches simply go unresolved until
/// the schema catches up.
pub fn spawn_disconnect_monitor(
    pool: PgPool,
    settings: Settings,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        match qd_db::has_heartbeat_columns(&pool).await {
            Ok(true) => {}
            Ok(false) => {
                warn!("heartbeat columns missing; disconnect monitor disabled");
                return;
            }
            Err(e) => {
                error!(error = %e, "heartbeat column probe failed; disconnect monitor disabled");
                return;
            }
        }

        let mut ticker =
            tokio::time::interval(std::time::Duration::from_secs(settings.monitor_interval_secs));
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = disconnect_tick(&pool, &settings).await {
                        error!(error = %e, "disconnect tick failed");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("disconnect monitor stopping");
                        break;
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use qd_types::{Amount, ClaimStatus, MatchStatus};
    use uuid::Uuid;

    fn active_match(created_ago: Duration) -> MatchRow {
        let now = Utc::now();
        MatchRow {
            match_id: Uuid::new_v4(),
            player1_user: "alice".into(),
            player2_user: "bob".into(),
            player1_wallet: "0xaaa".into(),
            player2_wallet: "0xbbb".into(),
            stake_amount: Amount::from_u64(100_000),
            status: MatchStatus::Signal,
            winner_user: None,
            claim_status: ClaimStatus::Unclaimed,
            claim_deadline: None,
            total_claimed_amount: Amount::zero(),
            cancelled: false,
            cancel_reason: None,
            refund_processed: false,
            player1_last_ping: None,
            player2_last_ping: None,
            created_at: now - created_ago,
        }
    }

    #[test]
    fn both_recent_pings_are_fresh() {
        let now = Utc::now();
        let mut m = active_match(Duration::minutes(5));
        m.player1_last_ping = Some(now - Duration::seconds(5));
        m.player2_last_ping = Some(now - Duration::seconds(12));
        assert_eq!(
            resolve_liveness(&m, now, Duration::seconds(30)),
            DisconnectOutcome::BothFresh
        );
    }

    #[test]
    fn stale_seat_forfeits_to_the_live_one() {
        let now = Utc::now();
        let mut m = active_match(Duration::minutes(5));
        m.player1_last_ping = Some(now - Duration::seconds(90));
        m.player2_last_ping = Some(now - Duration::seconds(3));
        assert_eq!(
            resolve_liveness(&m, now, Duration::seconds(30)),
            DisconnectOutcome::OneStale {
                winner_user: "bob".into()
            }
        );

        m.player1_last_ping = Some(now - Duration::seconds(3));
        m.player2_last_ping = Some(now - Duration::seconds(90));
        assert_eq!(
            resolve_liveness(&m, now, Duration::seconds(30)),
            DisconnectOutcome::OneStale {
                winner_user: "alice".into()
            }
        );
    }

    #[test]
    fn both_stale_voids_the_match() {
        let now = Utc::now();
        let mut m = active_match(Duration::minutes(5));
        m.player1_last_ping = Some(now - Duration::minutes(2));
        m.player2_last_ping = Some(now - Duration::minutes(3));
        assert_eq!(
            resolve_liveness(&m, now, Duration::seconds(30)),
            DisconnectOutcome::BothStale
        );
    }

    #[test]
    fn never_pinged_seats_measure_from_creation() {
        let now = Utc::now();
        // Old match, no pings at all: both seats stale.
        let silent = active_match(Duration::minutes(5));
        assert_eq!(
            resolve_liveness(&silent, now, Duration::seconds(30)),
            DisconnectOutcome::BothStale
        );

        // One seat pinged recently, the other never did.
        let mut half = active_match(Duration::minutes(5));
        half.player1_last_ping = Some(now - Duration::seconds(2));
        assert_eq!(
            resolve_liveness(&half, now, Duration::seconds(30)),
            DisconnectOutcome::OneStale {
                winner_user: "alice".into()
            }
        );
    }

    #[test]
    fn boundary_is_exclusive() {
        // Exactly at the timeout is still fresh; staleness requires strictly
        // older than the threshold.
        let now = Utc::now();
        let mut m = active_match(Duration::minutes(5));
        m.player1_last_ping = Some(now - Duration::seconds(30));
        m.player2_last_ping = Some(now - Duration::seconds(30));
        assert_eq!(
            resolve_liveness(&m, now, Duration::seconds(30)),
            DisconnectOutcome::BothFresh
        );
    }
}
