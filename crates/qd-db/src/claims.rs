//! Claim store: one settlement attempt per match.
//!
//! `match_id` is the primary key, so the database itself enforces "at most
//! one claim row per match" — the retry path must explicitly delete a
//! `failed` row before a new reservation can be inserted. The `claimed`
//! flag is only ever set by [`complete_claim`], together with the
//! transaction hash, after the ledger confirmed the transfer.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use uuid::Uuid;

use qd_types::{Amount, ClaimState, PayoutBreakdown};

use crate::amount_col;

#[derive(Debug, Clone)]
pub struct ClaimRow {
    pub match_id: Uuid,
    pub winner_wallet: String,
    pub gross_pool: Amount,
    pub platform_fee: Amount,
    pub net_payout: Amount,
    pub status: ClaimState,
    pub claimed: bool,
    pub idempotency_key: String,
    pub tx_hash: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

const CLAIM_COLUMNS: &str = r#"
    match_id, winner_wallet, gross_pool, platform_fee, net_payout,
    status, claimed, idempotency_key, tx_hash, error_message,
    created_at, updated_at
"#;

fn row_to_claim(row: &PgRow) -> Result<ClaimRow> {
    Ok(ClaimRow {
        match_id: row.try_get("match_id")?,
        winner_wallet: row.try_get("winner_wallet")?,
        gross_pool: amount_col(row, "gross_pool")?,
        platform_fee: amount_col(row, "platform_fee")?,
        net_payout: amount_col(row, "net_payout")?,
        status: ClaimState::parse(&row.try_get::<String, _>("status")?)?,
        claimed: row.try_get("claimed")?,
        idempotency_key: row.try_get("idempotency_key")?,
        tx_hash: row.try_get("tx_hash")?,
        error_message: row.try_get("error_message")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

pub async fn fetch_claim(pool: &PgPool, match_id: Uuid) -> Result<Option<ClaimRow>> {
    let row = sqlx::query(&format!(
        "select {CLAIM_COLUMNS} from claims where match_id = $1"
    ))
    .bind(match_id)
    .fetch_optional(pool)
    .await
    .context("fetch_claim failed")?;

    row.as_ref().map(row_to_claim).transpose()
}

/// Lock the claim row for this match, if any. Second lock in the
/// match → claim → stake order.
pub async fn lock_claim(
    tx: &mut Transaction<'_, Postgres>,
    match_id: Uuid,
) -> Result<Option<ClaimRow>> {
    let row = sqlx::query(&format!(
        "select {CLAIM_COLUMNS} from claims where match_id = $1 for update"
    ))
    .bind(match_id)
    .fetch_optional(&mut **tx)
    .await
    .context("lock_claim failed")?;

    row.as_ref().map(row_to_claim).transpose()
}

/// Insert the reservation row: `status = processing`, `claimed = false`.
///
/// Committed before the ledger is called; a crash after this commit leaves a
/// `processing` row that blocks further claims until reconciled, which is
/// the safe direction (no payout can be duplicated, only delayed).
pub async fn insert_processing_claim(
    tx: &mut Transaction<'_, Postgres>,
    match_id: Uuid,
    winner_wallet: &str,
    payout: &PayoutBreakdown,
    idempotency_key: &str,
) -> Result<()> {
    sqlx::query(
        r#"
        insert into claims (
          match_id, winner_wallet, gross_pool, platform_fee, net_payout,
          status, claimed, idempotency_key
        ) values (
          $1, $2, $3, $4, $5, 'processing', false, $6
        )
        "#,
    )
    .bind(match_id)
    .bind(winner_wallet)
    .bind(payout.gross_pool.to_string())
    .bind(payout.platform_fee.to_string())
    .bind(payout.net_payout.to_string())
    .bind(idempotency_key)
    .execute(&mut **tx)
    .await
    .context("insert_processing_claim failed")?;

    Ok(())
}

/// Remove a failed claim so the winner can retry. Guarded on `failed`:
/// completed and in-flight rows are never deletable.
pub async fn delete_failed_claim(
    tx: &mut Transaction<'_, Postgres>,
    match_id: Uuid,
) -> Result<bool> {
    let row = sqlx::query(
        r#"
        delete from claims
        where match_id = $1
          and status = 'failed'
        returning match_id
        "#,
    )
    .bind(match_id)
    .fetch_optional(&mut **tx)
    .await
    .context("delete_failed_claim failed")?;

    Ok(row.is_some())
}

/// Confirm the payout: `processing → completed`, `claimed = true`, store the
/// transaction hash. Returns false if the row was not in `processing`.
pub async fn complete_claim(
    tx: &mut Transaction<'_, Postgres>,
    match_id: Uuid,
    tx_hash: &str,
) -> Result<bool> {
    let row = sqlx::query(
        r#"
        update claims
        set status = 'completed',
            claimed = true,
            tx_hash = $2,
            updated_at = now()
        where match_id = $1
          and status = 'processing'
        returning match_id
        "#,
    )
    .bind(match_id)
    .bind(tx_hash)
    .fetch_optional(&mut **tx)
    .await
    .context("complete_claim failed")?;

    Ok(row.is_some())
}

/// Record a failed ledger call: `processing → failed` with the error. The
/// match row stays untouched so the winner can retry through the
/// failed-claim path.
pub async fn fail_claim(pool: &PgPool, match_id: Uuid, error: &str) -> Result<bool> {
    let row = sqlx::query(
        r#"
        update claims
        set status = 'failed',
            error_message = $2,
            updated_at = now()
        where match_id = $1
          and status = 'processing'
        returning match_id
        "#,
    )
    .bind(match_id)
    .bind(error)
    .fetch_optional(pool)
    .await
    .context("fail_claim failed")?;

    Ok(row.is_some())
}
