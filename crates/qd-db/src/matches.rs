//! Match store: guarded reads and writes on the `matches` table.
//!
//! Mutations come in two shapes:
//! - caller-owned transaction + `FOR UPDATE` lock ([`lock_match`]) for the
//!   claim engine's reservation phase, and
//! - single conditional `UPDATE … WHERE <still in expected state> RETURNING`
//!   statements for the periodic jobs, so a slow tick racing the next one
//!   (or racing the claim engine) can never double-apply an action.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use uuid::Uuid;

use qd_types::{Amount, CancelReason, ClaimStatus, MatchStatus};

use crate::amount_col;

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct MatchRow {
    pub match_id: Uuid,
    pub player1_user: String,
    pub player2_user: String,
    pub player1_wallet: String,
    pub player2_wallet: String,
    pub stake_amount: Amount,
    pub status: MatchStatus,
    pub winner_user: Option<String>,
    pub claim_status: ClaimStatus,
    pub claim_deadline: Option<DateTime<Utc>>,
    pub total_claimed_amount: Amount,
    pub cancelled: bool,
    pub cancel_reason: Option<String>,
    pub refund_processed: bool,
    pub player1_last_ping: Option<DateTime<Utc>>,
    pub player2_last_ping: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl MatchRow {
    /// The wallet bound to the recorded winner, if a winner is recorded.
    pub fn winner_wallet(&self) -> Option<&str> {
        match self.winner_user.as_deref() {
            Some(w) if w == self.player1_user => Some(&self.player1_wallet),
            Some(w) if w == self.player2_user => Some(&self.player2_wallet),
            _ => None,
        }
    }

    pub fn is_player(&self, user_id: &str) -> bool {
        self.player1_user == user_id || self.player2_user == user_id
    }
}

#[derive(Debug, Clone)]
pub struct NewMatch {
    pub match_id: Uuid,
    pub player1_user: String,
    pub player2_user: String,
    pub player1_wallet: String,
    pub player2_wallet: String,
    pub stake_amount: Amount,
}

const MATCH_COLUMNS: &str = r#"
    match_id, player1_user, player2_user, player1_wallet, player2_wallet,
    stake_amount, status, winner_user, claim_status, claim_deadline,
    total_claimed_amount, cancelled, cancel_reason, refund_processed,
    player1_last_ping, player2_last_ping, created_at
"#;

fn row_to_match(row: &PgRow) -> Result<MatchRow> {
    Ok(MatchRow {
        match_id: row.try_get("match_id")?,
        player1_user: row.try_get("player1_user")?,
        player2_user: row.try_get("player2_user")?,
        player1_wallet: row.try_get("player1_wallet")?,
        player2_wallet: row.try_get("player2_wallet")?,
        stake_amount: amount_col(row, "stake_amount")?,
        status: MatchStatus::parse(&row.try_get::<String, _>("status")?)?,
        winner_user: row.try_get("winner_user")?,
        claim_status: ClaimStatus::parse(&row.try_get::<String, _>("claim_status")?)?,
        claim_deadline: row.try_get("claim_deadline")?,
        total_claimed_amount: amount_col(row, "total_claimed_amount")?,
        cancelled: row.try_get("cancelled")?,
        cancel_reason: row.try_get("cancel_reason")?,
        refund_processed: row.try_get("refund_processed")?,
        player1_last_ping: row.try_get("player1_last_ping")?,
        player2_last_ping: row.try_get("player2_last_ping")?,
        created_at: row.try_get("created_at")?,
    })
}

// ---------------------------------------------------------------------------
// Creation / lookup
// ---------------------------------------------------------------------------

/// Insert a new wagered match. Players and wallets are immutable after this.
pub async fn insert_match(pool: &PgPool, m: &NewMatch) -> Result<()> {
    sqlx::query(
        r#"
        insert into matches (
          match_id, player1_user, player2_user, player1_wallet, player2_wallet, stake_amount
        ) values (
          $1, $2, $3, $4, $5, $6
        )
        "#,
    )
    .bind(m.match_id)
    .bind(&m.player1_user)
    .bind(&m.player2_user)
    .bind(&m.player1_wallet)
    .bind(&m.player2_wallet)
    .bind(m.stake_amount.to_string())
    .execute(pool)
    .await
    .context("insert_match failed")?;

    Ok(())
}

pub async fn fetch_match(pool: &PgPool, match_id: Uuid) -> Result<Option<MatchRow>> {
    let row = sqlx::query(&format!(
        "select {MATCH_COLUMNS} from matches where match_id = $1"
    ))
    .bind(match_id)
    .fetch_optional(pool)
    .await
    .context("fetch_match failed")?;

    row.as_ref().map(row_to_match).transpose()
}

/// Lock a match row for the duration of the caller's transaction.
///
/// The claim engine's lock order is match → claim → stake; this is always
/// the first lock taken.
pub async fn lock_match(
    tx: &mut Transaction<'_, Postgres>,
    match_id: Uuid,
) -> Result<Option<MatchRow>> {
    let row = sqlx::query(&format!(
        "select {MATCH_COLUMNS} from matches where match_id = $1 for update"
    ))
    .bind(match_id)
    .fetch_optional(&mut **tx)
    .await
    .context("lock_match failed")?;

    row.as_ref().map(row_to_match).transpose()
}

// ---------------------------------------------------------------------------
// Heartbeats
// ---------------------------------------------------------------------------

/// Record a heartbeat for whichever seat `user_id` occupies.
///
/// Only active matches accept pings; returns false if the match is already
/// resolved (or the user is not a player in it).
pub async fn record_heartbeat(pool: &PgPool, match_id: Uuid, user_id: &str) -> Result<bool> {
    let res = sqlx::query(
        r#"
        update matches
        set player1_last_ping = case when player1_user = $2 then now() else player1_last_ping end,
            player2_last_ping = case when player2_user = $2 then now() else player2_last_ping end
        where match_id = $1
          and (player1_user = $2 or player2_user = $2)
          and status in ('waiting','ready','countdown','signal')
        "#,
    )
    .bind(match_id)
    .bind(user_id)
    .execute(pool)
    .await
    .context("record_heartbeat failed")?;

    Ok(res.rows_affected() > 0)
}

/// All matches still in an active state, older than the grace window.
///
/// This is the disconnect monitor's working set; a match the previous tick
/// resolved is no longer active and therefore absent here, which is what
/// makes re-running the scan idempotent.
pub async fn scan_active_matches(pool: &PgPool, grace: Duration) -> Result<Vec<MatchRow>> {
    let cutoff = Utc::now() - grace;
    let rows = sqlx::query(&format!(
        r#"
        select {MATCH_COLUMNS}
        from matches
        where status in ('waiting','ready','countdown','signal')
          and created_at < $1
        order by created_at
        "#
    ))
    .bind(cutoff)
    .fetch_all(pool)
    .await
    .context("scan_active_matches failed")?;

    rows.iter().map(row_to_match).collect()
}

// ---------------------------------------------------------------------------
// Lifecycle resolution (disconnect monitor / timeout sweeper)
// ---------------------------------------------------------------------------

/// Award a win-by-default and open the claim window.
///
/// Guarded on the match still being active: if the previous tick's write (or
/// a concurrent resolution) already moved the match, this affects zero rows
/// and returns false.
pub async fn award_win_on_disconnect(
    pool: &PgPool,
    match_id: Uuid,
    winner_user: &str,
    claim_deadline: DateTime<Utc>,
) -> Result<bool> {
    let row = sqlx::query(
        r#"
        update matches
        set status = 'completed',
            winner_user = $2,
            claim_status = 'unclaimed',
            claim_deadline = $3
        where match_id = $1
          and status in ('waiting','ready','countdown','signal')
        returning match_id
        "#,
    )
    .bind(match_id)
    .bind(winner_user)
    .bind(claim_deadline)
    .fetch_optional(pool)
    .await
    .context("award_win_on_disconnect failed")?;

    Ok(row.is_some())
}

/// Void an active match with a reason. Same still-active guard as above.
pub async fn cancel_match(pool: &PgPool, match_id: Uuid, reason: CancelReason) -> Result<bool> {
    let row = sqlx::query(
        r#"
        update matches
        set status = 'cancelled',
            cancelled = true,
            cancel_reason = $2
        where match_id = $1
          and status in ('waiting','ready','countdown','signal')
        returning match_id
        "#,
    )
    .bind(match_id)
    .bind(reason.as_str())
    .fetch_optional(pool)
    .await
    .context("cancel_match failed")?;

    Ok(row.is_some())
}

/// Race-free refund marker: flip `refund_processed` and report whether this
/// caller won the flip.
///
/// Two concurrent sweep ticks can both see the same timed-out match; only
/// the one that gets a row back here proceeds with cancellation side
/// effects.
pub async fn try_mark_refund_processed(pool: &PgPool, match_id: Uuid) -> Result<bool> {
    let row = sqlx::query(
        r#"
        update matches
        set refund_processed = true
        where match_id = $1
          and refund_processed = false
        returning match_id
        "#,
    )
    .bind(match_id)
    .fetch_optional(pool)
    .await
    .context("try_mark_refund_processed failed")?;

    Ok(row.is_some())
}

/// Matches stuck in `waiting` since before `cutoff`.
pub async fn waiting_matches_older_than(
    pool: &PgPool,
    cutoff: DateTime<Utc>,
) -> Result<Vec<MatchRow>> {
    let rows = sqlx::query(&format!(
        r#"
        select {MATCH_COLUMNS}
        from matches
        where status = 'waiting'
          and created_at < $1
        order by created_at
        "#
    ))
    .bind(cutoff)
    .fetch_all(pool)
    .await
    .context("waiting_matches_older_than failed")?;

    rows.iter().map(row_to_match).collect()
}

// ---------------------------------------------------------------------------
// Expiry sweep
// ---------------------------------------------------------------------------

/// Close out unclaimed payouts whose deadline passed. Idempotent by
/// construction: once applied, the predicate matches zero rows.
pub async fn expire_overdue_claims(pool: &PgPool) -> Result<u64> {
    let res = sqlx::query(
        r#"
        update matches
        set claim_status = 'expired'
        where claim_status = 'unclaimed'
          and claim_deadline is not null
          and claim_deadline < now()
        "#,
    )
    .execute(pool)
    .await
    .context("expire_overdue_claims failed")?;

    Ok(res.rows_affected())
}

// ---------------------------------------------------------------------------
// Settlement confirmation
// ---------------------------------------------------------------------------

/// Mark the match claimed and add `net` to its cumulative claimed amount.
///
/// Runs inside the confirmation transaction, after the ledger transfer
/// succeeded; the row is re-read under lock so the cumulative add is not a
/// lost update.
pub async fn settle_match_claimed(
    tx: &mut Transaction<'_, Postgres>,
    match_id: Uuid,
    net: &Amount,
) -> Result<()> {
    let row = sqlx::query("select total_claimed_amount from matches where match_id = $1 for update")
        .bind(match_id)
        .fetch_one(&mut **tx)
        .await
        .context("settle_match_claimed lock failed")?;

    let current = amount_col(&row, "total_claimed_amount")?;
    let new_total = &current + net;

    sqlx::query(
        r#"
        update matches
        set claim_status = 'claimed',
            total_claimed_amount = $2
        where match_id = $1
        "#,
    )
    .bind(match_id)
    .bind(new_total.to_string())
    .execute(&mut **tx)
    .await
    .context("settle_match_claimed update failed")?;

    Ok(())
}
