//! Stake refunds.
//!
//! A refund becomes possible when a stake's match is voided (cancellation,
//! double disconnect, matchmaking timeout) or when a confirmed deposit never
//! found a match at all. The sweepers mark eligibility; the user then claims
//! inside the refund window through [`claim_refund`], which runs the same
//! reserve / execute / confirm discipline as the winnings path.
//!
//! A refund whose ledger transfer fails stays in `processing`. It is not
//! automatically retried or rolled back: eligibility was consumed and money
//! may or may not have moved, so the row is left for operator
//! reconciliation and logged loudly.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use tracing::{info, warn};

use qd_db::StakeRow;
use qd_ledger::Ledger;
use qd_types::{Amount, CancelReason, Principal, RefundBreakdown, RefundState, SettleError, Settings};

use crate::map_ledger_error;

/// Proof of a completed refund transfer.
#[derive(Clone, Debug, Serialize)]
pub struct RefundReceipt {
    pub reference: String,
    pub tx_hash: String,
    pub refund_amount: Amount,
    pub gas_fee: Amount,
}

// ---------------------------------------------------------------------------
// Validation (pure)
// ---------------------------------------------------------------------------

/// Can this stake be refunded to this requester right now? Called under the
/// stake row lock. Ownership failures read as not-found so references cannot
/// be probed across users.
fn validate_stake_for_refund(
    s: &StakeRow,
    principal: &Principal,
    now: DateTime<Utc>,
) -> Result<(), SettleError> {
    if s.user_id != principal.user_id {
        return Err(SettleError::StakeNotFound);
    }
    match s.refund_status {
        RefundState::Completed => Err(SettleError::RefundAlreadyCompleted {
            tx_hash: s.refund_tx_hash.clone(),
        }),
        RefundState::Processing => Err(SettleError::RefundInProgress),
        RefundState::None => Err(SettleError::RefundNotEligible),
        RefundState::Eligible => match s.refund_deadline {
            Some(deadline) if now > deadline => Err(SettleError::RefundWindowExpired { deadline }),
            _ => Ok(()),
        },
    }
}

/// Is this stake an orphan the requester may self-serve a refund for?
/// Orphans are confirmed deposits that never attached to any match.
fn validate_orphan_stake(
    s: &StakeRow,
    principal: &Principal,
    now: DateTime<Utc>,
    settings: &Settings,
) -> Result<(), SettleError> {
    if s.user_id != principal.user_id {
        return Err(SettleError::StakeNotFound);
    }
    if !s.is_confirmed() {
        return Err(SettleError::DepositNotConfirmed);
    }
    if s.match_id.is_some() || s.used_for_match {
        return Err(SettleError::RefundNotEligible);
    }
    if now - s.created_at < settings.orphan_timeout() {
        // Matchmaking may still pick this deposit up.
        return Err(SettleError::RefundNotEligible);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// The refund flow
// ---------------------------------------------------------------------------

/// Claim a refund on an eligible stake and transfer it back.
///
/// Reservation: `eligible → processing` committed under the stake row lock
/// before the ledger is called. Of concurrent requests for the same stake,
/// exactly one reaches the ledger.
pub async fn claim_refund(
    pool: &PgPool,
    ledger: &dyn Ledger,
    settings: &Settings,
    reference: &str,
    principal: &Principal,
) -> Result<RefundReceipt, SettleError> {
    let now = Utc::now();

    let breakdown = {
        let mut tx = pool.begin().await?;

        let stake = qd_db::lock_stake(&mut tx, reference)
            .await?
            .ok_or(SettleError::StakeNotFound)?;
        validate_stake_for_refund(&stake, principal, now)?;

        if !qd_db::begin_stake_refund(&mut tx, reference).await? {
            return Err(SettleError::RefundInProgress);
        }
        tx.commit().await?;

        RefundBreakdown::compute(&stake.amount, settings.refund_fee_bps)
    };

    let tx_hash = match ledger
        .send_payout(&principal.wallet, &breakdown.refund_amount)
        .await
    {
        Ok(h) => h,
        Err(err) => {
            // Eligibility was consumed and the transfer outcome is unknown;
            // leave the processing marker for reconciliation.
            warn!(
                %reference,
                error = %err,
                "refund transfer failed; stake left in processing for reconciliation"
            );
            return Err(map_ledger_error(err));
        }
    };

    if !qd_db::complete_stake_refund(pool, reference, &tx_hash).await? {
        warn!(%reference, %tx_hash, "refund row left processing state before confirmation");
    }

    info!(
        %reference,
        wallet = %principal.wallet,
        amount = %breakdown.refund_amount,
        %tx_hash,
        "stake refunded"
    );

    Ok(RefundReceipt {
        reference: reference.to_string(),
        tx_hash,
        refund_amount: breakdown.refund_amount,
        gas_fee: breakdown.gas_fee,
    })
}

/// Self-service refund for an orphaned deposit: a confirmed stake that never
/// attached to a match. Marks eligibility if the orphan timeout has passed,
/// then runs the normal refund flow (which re-validates under lock).
pub async fn claim_deposit_refund(
    pool: &PgPool,
    ledger: &dyn Ledger,
    settings: &Settings,
    reference: &str,
    principal: &Principal,
) -> Result<RefundReceipt, SettleError> {
    let now = Utc::now();
    let stake = qd_db::fetch_stake(pool, reference)
        .await?
        .ok_or(SettleError::StakeNotFound)?;

    if stake.refund_status == RefundState::None {
        validate_orphan_stake(&stake, principal, now, settings)?;
        // Conditional on the stake still being unmarked; losing the race to
        // a sweep tick is fine, the stake is eligible either way.
        qd_db::mark_refund_eligible(
            pool,
            reference,
            CancelReason::NoMatchFound.as_str(),
            now + settings.refund_window(),
        )
        .await?;
    }

    claim_refund(pool, ledger, settings, reference, principal).await
}

// ---------------------------------------------------------------------------
// Deposit confirmation
// ---------------------------------------------------------------------------

/// Verify an inbound deposit against the chain and normalize the stake to
/// confirmed. Idempotent: re-confirming a confirmed stake is a no-op.
pub async fn confirm_deposit(
    pool: &PgPool,
    ledger: &dyn Ledger,
    reference: &str,
    tx_hash: &str,
    principal: &Principal,
) -> Result<(), SettleError> {
    let stake = qd_db::fetch_stake(pool, reference)
        .await?
        .ok_or(SettleError::StakeNotFound)?;
    if stake.user_id != principal.user_id {
        return Err(SettleError::StakeNotFound);
    }
    if stake.is_confirmed() {
        return Ok(());
    }

    let verified = ledger
        .verify_deposit(tx_hash, &stake.amount, ledger.treasury_address())
        .await
        .map_err(map_ledger_error)?;
    if !verified {
        return Err(SettleError::DepositVerificationFailed);
    }

    // Guarded on pending; a concurrent confirmation winning the race is
    // equivalent to success.
    qd_db::confirm_stake_deposit(pool, reference, tx_hash).await?;
    info!(%reference, %tx_hash, "stake deposit confirmed");
    Ok(())
}

// ---------------------------------------------------------------------------
// Read-only views
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Serialize)]
pub struct RefundStatusView {
    pub reference: String,
    pub refund_status: &'static str,
    pub refund_reason: Option<String>,
    pub refund_deadline: Option<DateTime<Utc>>,
    pub refund_tx_hash: Option<String>,
    pub breakdown: RefundBreakdown,
}

pub async fn refund_status(
    pool: &PgPool,
    settings: &Settings,
    reference: &str,
    principal: &Principal,
) -> Result<RefundStatusView, SettleError> {
    let s = qd_db::fetch_stake(pool, reference)
        .await?
        .ok_or(SettleError::StakeNotFound)?;
    if s.user_id != principal.user_id {
        return Err(SettleError::StakeNotFound);
    }

    Ok(RefundStatusView {
        reference: s.reference.clone(),
        refund_status: s.refund_status.as_str(),
        refund_reason: s.refund_reason.clone(),
        refund_deadline: s.refund_deadline,
        refund_tx_hash: s.refund_tx_hash.clone(),
        breakdown: RefundBreakdown::compute(&s.amount, settings.refund_fee_bps),
    })
}

/// One claimable refund, as listed to the user.
#[derive(Clone, Debug, Serialize)]
pub struct RefundOffer {
    pub reference: String,
    pub staked: Amount,
    pub refund_amount: Amount,
    pub gas_fee: Amount,
    pub refund_reason: Option<String>,
    pub refund_deadline: Option<DateTime<Utc>>,
}

/// Every refund the requester could claim right now.
pub async fn eligible_refunds(
    pool: &PgPool,
    settings: &Settings,
    principal: &Principal,
) -> Result<Vec<RefundOffer>, SettleError> {
    let stakes = qd_db::eligible_refunds_for_user(pool, &principal.user_id).await?;
    Ok(stakes
        .into_iter()
        .map(|s| {
            let b = RefundBreakdown::compute(&s.amount, settings.refund_fee_bps);
            RefundOffer {
                reference: s.reference,
                staked: s.amount,
                refund_amount: b.refund_amount,
                gas_fee: b.gas_fee,
                refund_reason: s.refund_reason,
                refund_deadline: s.refund_deadline,
            }
        })
        .collect())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use qd_db::DEPOSIT_CONFIRMED;

    fn alice() -> Principal {
        Principal::new("alice", "0xaaa1")
    }

    fn eligible_stake(deadline: Option<DateTime<Utc>>) -> StakeRow {
        StakeRow {
            reference: "pay_123".into(),
            user_id: "alice".into(),
            amount: Amount::from_u64(100_000),
            normalized_status: DEPOSIT_CONFIRMED.into(),
            match_id: None,
            used_for_match: false,
            total_claimed_amount: Amount::zero(),
            refund_status: RefundState::Eligible,
            refund_deadline: deadline,
            refund_reason: Some("matchmaking_timeout".into()),
            refund_tx_hash: None,
            deposit_tx_hash: Some("0xdep".into()),
            created_at: Utc::now() - Duration::hours(1),
        }
    }

    #[test]
    fn eligible_inside_window_validates() {
        let now = Utc::now();
        let s = eligible_stake(Some(now + Duration::hours(1)));
        assert!(validate_stake_for_refund(&s, &alice(), now).is_ok());
    }

    #[test]
    fn other_users_stake_reads_as_missing() {
        let now = Utc::now();
        let s = eligible_stake(Some(now + Duration::hours(1)));
        let mallory = Principal::new("mallory", "0xmmm");
        assert!(matches!(
            validate_stake_for_refund(&s, &mallory, now),
            Err(SettleError::StakeNotFound)
        ));
    }

    #[test]
    fn refund_window_is_enforced() {
        let now = Utc::now();
        let s = eligible_stake(Some(now - Duration::minutes(1)));
        assert!(matches!(
            validate_stake_for_refund(&s, &alice(), now),
            Err(SettleError::RefundWindowExpired { .. })
        ));
    }

    #[test]
    fn refund_states_map_to_distinct_errors() {
        let now = Utc::now();

        let mut unmarked = eligible_stake(None);
        unmarked.refund_status = RefundState::None;
        assert!(matches!(
            validate_stake_for_refund(&unmarked, &alice(), now),
            Err(SettleError::RefundNotEligible)
        ));

        let mut inflight = eligible_stake(None);
        inflight.refund_status = RefundState::Processing;
        assert!(matches!(
            validate_stake_for_refund(&inflight, &alice(), now),
            Err(SettleError::RefundInProgress)
        ));

        let mut done = eligible_stake(None);
        done.refund_status = RefundState::Completed;
        done.refund_tx_hash = Some("0xrf".into());
        match validate_stake_for_refund(&done, &alice(), now) {
            Err(SettleError::RefundAlreadyCompleted { tx_hash }) => {
                assert_eq!(tx_hash.as_deref(), Some("0xrf"));
            }
            other => panic!("expected RefundAlreadyCompleted, got {other:?}"),
        }
    }

    #[test]
    fn orphan_requires_age_and_detachment() {
        let now = Utc::now();
        let settings = Settings::default(); // 15 minute orphan timeout

        let mut fresh = eligible_stake(None);
        fresh.refund_status = RefundState::None;
        fresh.created_at = now - Duration::minutes(5);
        assert!(matches!(
            validate_orphan_stake(&fresh, &alice(), now, &settings),
            Err(SettleError::RefundNotEligible)
        ));

        let mut old = fresh.clone();
        old.created_at = now - Duration::minutes(20);
        assert!(validate_orphan_stake(&old, &alice(), now, &settings).is_ok());

        let mut attached = old.clone();
        attached.match_id = Some(uuid::Uuid::new_v4());
        assert!(matches!(
            validate_orphan_stake(&attached, &alice(), now, &settings),
            Err(SettleError::RefundNotEligible)
        ));

        let mut unconfirmed = old;
        unconfirmed.normalized_status = "pending".into();
        assert!(matches!(
            validate_orphan_stake(&unconfirmed, &alice(), now, &settings),
            Err(SettleError::DepositNotConfirmed)
        ));
    }
}
