//! Stake record store (payment intents).
//!
//! A StakeRecord is a confirmed inbound deposit. It can be claimed against
//! at most twice its amount over its lifetime (stake return + opponent's
//! stake); the claim engine enforces that bound against
//! `total_claimed_amount` before every payout, and this module keeps that
//! column honest by only updating it under a row lock.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use uuid::Uuid;

use qd_types::{Amount, RefundState};

use crate::amount_col;

pub const DEPOSIT_PENDING: &str = "pending";
pub const DEPOSIT_CONFIRMED: &str = "confirmed";
pub const DEPOSIT_FAILED: &str = "failed";

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct StakeRow {
    pub reference: String,
    pub user_id: String,
    pub amount: Amount,
    pub normalized_status: String,
    pub match_id: Option<Uuid>,
    pub used_for_match: bool,
    pub total_claimed_amount: Amount,
    pub refund_status: RefundState,
    pub refund_deadline: Option<DateTime<Utc>>,
    pub refund_reason: Option<String>,
    pub refund_tx_hash: Option<String>,
    pub deposit_tx_hash: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl StakeRow {
    pub fn is_confirmed(&self) -> bool {
        self.normalized_status == DEPOSIT_CONFIRMED
    }

    /// Lifetime disbursement ceiling: 2 × the original stake.
    pub fn max_claimable(&self) -> Amount {
        self.amount.double()
    }
}

#[derive(Debug, Clone)]
pub struct NewStake {
    pub reference: String,
    pub user_id: String,
    pub amount: Amount,
    pub normalized_status: String,
    pub match_id: Option<Uuid>,
}

const STAKE_COLUMNS: &str = r#"
    reference, user_id, amount, normalized_status, match_id, used_for_match,
    total_claimed_amount, refund_status, refund_deadline, refund_reason,
    refund_tx_hash, deposit_tx_hash, created_at
"#;

fn row_to_stake(row: &PgRow) -> Result<StakeRow> {
    let refund_raw: Option<String> = row.try_get("refund_status")?;
    Ok(StakeRow {
        reference: row.try_get("reference")?,
        user_id: row.try_get("user_id")?,
        amount: amount_col(row, "amount")?,
        normalized_status: row.try_get("normalized_status")?,
        match_id: row.try_get("match_id")?,
        used_for_match: row.try_get("used_for_match")?,
        total_claimed_amount: amount_col(row, "total_claimed_amount")?,
        refund_status: RefundState::parse_opt(refund_raw.as_deref())?,
        refund_deadline: row.try_get("refund_deadline")?,
        refund_reason: row.try_get("refund_reason")?,
        refund_tx_hash: row.try_get("refund_tx_hash")?,
        deposit_tx_hash: row.try_get("deposit_tx_hash")?,
        created_at: row.try_get("created_at")?,
    })
}

// ---------------------------------------------------------------------------
// Creation / lookup
// ---------------------------------------------------------------------------

pub async fn insert_stake(pool: &PgPool, s: &NewStake) -> Result<()> {
    sqlx::query(
        r#"
        insert into stake_records (reference, user_id, amount, normalized_status, match_id)
        values ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(&s.reference)
    .bind(&s.user_id)
    .bind(s.amount.to_string())
    .bind(&s.normalized_status)
    .bind(s.match_id)
    .execute(pool)
    .await
    .context("insert_stake failed")?;

    Ok(())
}

pub async fn fetch_stake(pool: &PgPool, reference: &str) -> Result<Option<StakeRow>> {
    let row = sqlx::query(&format!(
        "select {STAKE_COLUMNS} from stake_records where reference = $1"
    ))
    .bind(reference)
    .fetch_optional(pool)
    .await
    .context("fetch_stake failed")?;

    row.as_ref().map(row_to_stake).transpose()
}

/// Lock a stake row by reference for the caller's transaction.
pub async fn lock_stake(
    tx: &mut Transaction<'_, Postgres>,
    reference: &str,
) -> Result<Option<StakeRow>> {
    let row = sqlx::query(&format!(
        "select {STAKE_COLUMNS} from stake_records where reference = $1 for update"
    ))
    .bind(reference)
    .fetch_optional(&mut **tx)
    .await
    .context("lock_stake failed")?;

    row.as_ref().map(row_to_stake).transpose()
}

/// Lock the requester's confirmed stake for a match — the proof-of-stake
/// step of the claim reservation. Third lock in the match → claim → stake
/// order.
pub async fn lock_confirmed_stake_for_match(
    tx: &mut Transaction<'_, Postgres>,
    match_id: Uuid,
    user_id: &str,
) -> Result<Option<StakeRow>> {
    let row = sqlx::query(&format!(
        r#"
        select {STAKE_COLUMNS}
        from stake_records
        where match_id = $1
          and user_id = $2
          and normalized_status = 'confirmed'
        order by created_at
        limit 1
        for update
        "#
    ))
    .bind(match_id)
    .bind(user_id)
    .fetch_optional(&mut **tx)
    .await
    .context("lock_confirmed_stake_for_match failed")?;

    row.as_ref().map(row_to_stake).transpose()
}

/// Bind an orphaned confirmed stake to a match. Refuses records already
/// attached or already consumed.
pub async fn attach_stake_to_match(pool: &PgPool, reference: &str, match_id: Uuid) -> Result<bool> {
    let row = sqlx::query(
        r#"
        update stake_records
        set match_id = $2
        where reference = $1
          and match_id is null
          and used_for_match = false
        returning reference
        "#,
    )
    .bind(reference)
    .bind(match_id)
    .fetch_optional(pool)
    .await
    .context("attach_stake_to_match failed")?;

    Ok(row.is_some())
}

// ---------------------------------------------------------------------------
// Claim-side mutation (inside the engine's transactions)
// ---------------------------------------------------------------------------

/// Mark the stake consumed by its match. Part of the reservation write-set;
/// committed before the ledger call, which is safe because it only prevents
/// reuse of this stake — it authorizes no payment by itself.
pub async fn mark_stake_used(tx: &mut Transaction<'_, Postgres>, reference: &str) -> Result<()> {
    sqlx::query("update stake_records set used_for_match = true where reference = $1")
        .bind(reference)
        .execute(&mut **tx)
        .await
        .context("mark_stake_used failed")?;

    Ok(())
}

/// Add `net` to the stake's lifetime claimed amount, under a row lock.
pub async fn add_stake_claimed_amount(
    tx: &mut Transaction<'_, Postgres>,
    reference: &str,
    net: &Amount,
) -> Result<()> {
    let row =
        sqlx::query("select total_claimed_amount from stake_records where reference = $1 for update")
            .bind(reference)
            .fetch_one(&mut **tx)
            .await
            .context("add_stake_claimed_amount lock failed")?;

    let current = amount_col(&row, "total_claimed_amount")?;
    let new_total = &current + net;

    sqlx::query("update stake_records set total_claimed_amount = $2 where reference = $1")
        .bind(reference)
        .bind(new_total.to_string())
        .execute(&mut **tx)
        .await
        .context("add_stake_claimed_amount update failed")?;

    Ok(())
}

// ---------------------------------------------------------------------------
// Refund eligibility and execution
// ---------------------------------------------------------------------------

/// Conditionally mark one stake refund-eligible.
///
/// The `refund_status IS NULL OR = 'none'` guard is what lets concurrent
/// sweeps race safely: the loser of the race matches zero rows.
pub async fn mark_refund_eligible(
    pool: &PgPool,
    reference: &str,
    reason: &str,
    deadline: DateTime<Utc>,
) -> Result<bool> {
    let row = sqlx::query(
        r#"
        update stake_records
        set refund_status = 'eligible',
            refund_reason = $2,
            refund_deadline = $3
        where reference = $1
          and (refund_status is null or refund_status = 'none')
          and used_for_match = false
        returning reference
        "#,
    )
    .bind(reference)
    .bind(reason)
    .bind(deadline)
    .fetch_optional(pool)
    .await
    .context("mark_refund_eligible failed")?;

    Ok(row.is_some())
}

/// Mark every unmarked stake of a match refund-eligible (match voided).
pub async fn mark_match_stakes_refund_eligible(
    pool: &PgPool,
    match_id: Uuid,
    reason: &str,
    deadline: DateTime<Utc>,
) -> Result<u64> {
    let res = sqlx::query(
        r#"
        update stake_records
        set refund_status = 'eligible',
            refund_reason = $2,
            refund_deadline = $3
        where match_id = $1
          and (refund_status is null or refund_status = 'none')
          and used_for_match = false
        "#,
    )
    .bind(match_id)
    .bind(reason)
    .bind(deadline)
    .execute(pool)
    .await
    .context("mark_match_stakes_refund_eligible failed")?;

    Ok(res.rows_affected())
}

/// Confirmed stakes never attached to any match, older than `cutoff` and not
/// yet refund-marked.
pub async fn orphaned_confirmed_stakes(
    pool: &PgPool,
    cutoff: DateTime<Utc>,
) -> Result<Vec<StakeRow>> {
    let rows = sqlx::query(&format!(
        r#"
        select {STAKE_COLUMNS}
        from stake_records
        where match_id is null
          and normalized_status = 'confirmed'
          and used_for_match = false
          and (refund_status is null or refund_status = 'none')
          and created_at < $1
        order by created_at
        "#
    ))
    .bind(cutoff)
    .fetch_all(pool)
    .await
    .context("orphaned_confirmed_stakes failed")?;

    rows.iter().map(row_to_stake).collect()
}

/// All refund-eligible stakes for one user.
pub async fn eligible_refunds_for_user(pool: &PgPool, user_id: &str) -> Result<Vec<StakeRow>> {
    let rows = sqlx::query(&format!(
        r#"
        select {STAKE_COLUMNS}
        from stake_records
        where user_id = $1
          and refund_status = 'eligible'
        order by created_at
        "#
    ))
    .bind(user_id)
    .fetch_all(pool)
    .await
    .context("eligible_refunds_for_user failed")?;

    rows.iter().map(row_to_stake).collect()
}

/// Reserve a refund: `eligible → processing`, inside the caller's
/// transaction. Returns false if another request got there first.
pub async fn begin_stake_refund(
    tx: &mut Transaction<'_, Postgres>,
    reference: &str,
) -> Result<bool> {
    let row = sqlx::query(
        r#"
        update stake_records
        set refund_status = 'processing'
        where reference = $1
          and refund_status = 'eligible'
        returning reference
        "#,
    )
    .bind(reference)
    .fetch_optional(&mut **tx)
    .await
    .context("begin_stake_refund failed")?;

    Ok(row.is_some())
}

/// Record the completed refund transfer.
pub async fn complete_stake_refund(pool: &PgPool, reference: &str, tx_hash: &str) -> Result<bool> {
    let row = sqlx::query(
        r#"
        update stake_records
        set refund_status = 'completed',
            refund_tx_hash = $2
        where reference = $1
          and refund_status = 'processing'
        returning reference
        "#,
    )
    .bind(reference)
    .bind(tx_hash)
    .fetch_optional(pool)
    .await
    .context("complete_stake_refund failed")?;

    Ok(row.is_some())
}

/// Normalize a pending deposit to confirmed once the on-chain transfer
/// verified. Guarded on `pending` so a repeated confirmation is a no-op.
pub async fn confirm_stake_deposit(pool: &PgPool, reference: &str, tx_hash: &str) -> Result<bool> {
    let row = sqlx::query(
        r#"
        update stake_records
        set normalized_status = 'confirmed',
            deposit_tx_hash = $2
        where reference = $1
          and normalized_status = 'pending'
        returning reference
        "#,
    )
    .bind(reference)
    .bind(tx_hash)
    .fetch_optional(pool)
    .await
    .context("confirm_stake_deposit failed")?;

    Ok(row.is_some())
}
