//! Postgres access layer for QuickDraw settlement.
//!
//! The Match Store is the single source of truth for match, stake, and claim
//! state. Every mutation here is a guarded SQL statement — conditional
//! `UPDATE … WHERE <expected state> RETURNING`, or a read under `FOR UPDATE`
//! inside a caller-owned transaction. No caller may cache a row across
//! requests and write it back; the guarded statements are the API.

use anyhow::{Context, Result};
use sqlx::{postgres::PgPoolOptions, PgPool, Row};

pub mod claims;
pub mod matches;
pub mod stakes;

pub use claims::*;
pub use matches::*;
pub use stakes::*;

pub const ENV_DB_URL: &str = "QD_DATABASE_URL";

/// Connect to Postgres using QD_DATABASE_URL.
pub async fn connect_from_env() -> Result<PgPool> {
    let url =
        std::env::var(ENV_DB_URL).with_context(|| format!("missing env var {ENV_DB_URL}"))?;

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&url)
        .await
        .context("failed to connect to Postgres")?;

    Ok(pool)
}

/// Run embedded SQLx migrations.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("db migrate failed")?;
    Ok(())
}

#[derive(Debug, Clone)]
pub struct DbStatus {
    pub ok: bool,
    pub has_matches_table: bool,
}

/// Simple status query (connectivity + schema presence).
pub async fn status(pool: &PgPool) -> Result<DbStatus> {
    let (one,): (i32,) = sqlx::query_as::<_, (i32,)>("select 1")
        .fetch_one(pool)
        .await
        .context("status connectivity query failed")?;
    let ok = one == 1;

    let (exists,): (bool,) = sqlx::query_as::<_, (bool,)>(
        r#"
        select exists (
            select 1
            from information_schema.tables
            where table_schema='public' and table_name='matches'
        )
        "#,
    )
    .fetch_one(pool)
    .await
    .context("status table-exists query failed")?;

    Ok(DbStatus {
        ok,
        has_matches_table: exists,
    })
}

/// Capability probe: do the heartbeat columns exist yet?
///
/// The disconnect monitor can run against a database that is mid-deployment
/// (ping columns not yet migrated in). Probing `information_schema` and
/// skipping the scan is a compatibility concern, not a correctness one — a
/// match that cannot be heartbeat-checked is simply left alone.
pub async fn has_heartbeat_columns(pool: &PgPool) -> Result<bool> {
    let (n,): (i64,) = sqlx::query_as::<_, (i64,)>(
        r#"
        select count(*)::bigint
        from information_schema.columns
        where table_schema='public'
          and table_name='matches'
          and column_name in ('player1_last_ping','player2_last_ping')
        "#,
    )
    .fetch_one(pool)
    .await
    .context("heartbeat column probe failed")?;

    Ok(n == 2)
}

/// Count matches that are operationally live: active lifecycle, or completed
/// with an unclaimed payout still on the table.
///
/// Used by the CLI migration guard to prevent schema changes under matches
/// that still have money in motion.
pub async fn count_live_matches(pool: &PgPool) -> Result<i64> {
    // If the schema doesn't exist yet, treat as 0 (safe) rather than failing.
    let st = status(pool).await?;
    if !st.has_matches_table {
        return Ok(0);
    }

    let (n,): (i64,) = sqlx::query_as::<_, (i64,)>(
        r#"
        select count(*)::bigint
        from matches
        where status in ('waiting','ready','countdown','signal')
           or (status = 'completed' and claim_status = 'unclaimed')
        "#,
    )
    .fetch_one(pool)
    .await
    .context("count_live_matches failed")?;

    Ok(n)
}

/// Shared helper: decode a TEXT money column into an [`qd_types::Amount`].
pub(crate) fn amount_col(row: &sqlx::postgres::PgRow, col: &str) -> Result<qd_types::Amount> {
    let raw: String = row.try_get(col)?;
    qd_types::Amount::parse(&raw).with_context(|| format!("bad amount in column {col}: {raw:?}"))
}
