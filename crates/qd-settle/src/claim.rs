//! Winnings claims.
//!
//! [`claim_winnings`] is the only path that pays a winner. Its reservation
//! transaction locks rows in the fixed match → claim → stake order, validates
//! everything, and commits a `processing` claim row *before* the ledger is
//! asked to move money; the confirmation transaction afterwards takes its
//! locks in the same order. A concurrent duplicate request therefore blocks
//! on the match lock, re-reads, and is rejected with the first claim's
//! transaction hash as proof.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sqlx::PgPool;
use tracing::{error, info, warn};
use uuid::Uuid;

use qd_db::{ClaimRow, MatchRow};
use qd_ledger::Ledger;
use qd_types::{
    claim_idempotency_key, wallets_match, Amount, ClaimStatus, MatchStatus, PayoutBreakdown,
    Principal, SettleError, Settings,
};

use crate::map_ledger_error;

/// Proof of a completed payout, echoed back to the winner.
#[derive(Clone, Debug, Serialize)]
pub struct ClaimReceipt {
    pub match_id: Uuid,
    pub tx_hash: String,
    pub gross_pool: Amount,
    pub platform_fee: Amount,
    pub net_payout: Amount,
}

// ---------------------------------------------------------------------------
// Validation (pure)
// ---------------------------------------------------------------------------

/// Validate the match row against the requester. No I/O; called under the
/// match row lock so the row cannot change underneath the checks.
fn validate_match_for_claim(
    m: &MatchRow,
    principal: &Principal,
    now: DateTime<Utc>,
    settings: &Settings,
) -> Result<(), SettleError> {
    if m.status != MatchStatus::Completed {
        return Err(SettleError::MatchNotCompleted);
    }
    let winner = m.winner_user.as_deref().ok_or(SettleError::NotWinner)?;
    if winner != principal.user_id {
        return Err(SettleError::NotWinner);
    }
    let wallet = m.winner_wallet().ok_or(SettleError::WalletMismatch)?;
    if !wallets_match(wallet, &principal.wallet) {
        return Err(SettleError::WalletMismatch);
    }

    match m.claim_status {
        ClaimStatus::Claimed => Err(SettleError::AlreadyClaimed {
            wallet: wallet.to_string(),
            tx_hash: None,
        }),
        ClaimStatus::Unclaimed | ClaimStatus::Expired => {
            // The grace window is authoritative over the sweeper's marker: a
            // request inside deadline + grace is honored even if the sweep
            // already flipped the row to expired.
            match m.claim_deadline {
                Some(deadline) if now > deadline + settings.claim_grace() => {
                    Err(SettleError::ClaimWindowExpired { deadline })
                }
                None if m.claim_status == ClaimStatus::Expired => {
                    Err(SettleError::ClaimWindowExpired { deadline: now })
                }
                _ => Ok(()),
            }
        }
    }
}

/// What an existing claim row means for a new attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
enum PriorClaim {
    None,
    /// A payout is in flight or done; refuse, with proof if we have it.
    Blocked {
        wallet: String,
        tx_hash: Option<String>,
    },
    /// A failed row inside the retry window: delete it and go again.
    Retryable,
    /// A failed row past the retry window: permanently refused.
    RetryExpired,
}

fn evaluate_prior_claim(
    prior: Option<&ClaimRow>,
    now: DateTime<Utc>,
    retry_window: Duration,
) -> PriorClaim {
    match prior {
        None => PriorClaim::None,
        Some(c) if c.status.blocks_new_claim() => PriorClaim::Blocked {
            wallet: c.winner_wallet.clone(),
            tx_hash: c.tx_hash.clone(),
        },
        // Failed: the retry window counts from the recorded failure.
        Some(c) => {
            if now - c.updated_at > retry_window {
                PriorClaim::RetryExpired
            } else {
                PriorClaim::Retryable
            }
        }
    }
}

// ---------------------------------------------------------------------------
// The claim flow
// ---------------------------------------------------------------------------

/// Claim the winnings of a completed match and pay them out.
///
/// Exactly-once: of any number of concurrent calls for the same match, at
/// most one reaches the ledger; the rest fail with
/// [`SettleError::AlreadyClaimed`].
pub async fn claim_winnings(
    pool: &PgPool,
    ledger: &dyn Ledger,
    settings: &Settings,
    match_id: Uuid,
    principal: &Principal,
) -> Result<ClaimReceipt, SettleError> {
    let now = Utc::now();

    // Phase 1: reservation. Commit a processing claim row under the
    // match → claim → stake lock order, or reject without mutating.
    let (payout, stake_reference, winner_wallet) = {
        let mut tx = pool.begin().await?;

        let m = qd_db::lock_match(&mut tx, match_id)
            .await?
            .ok_or(SettleError::MatchNotFound)?;

        if let Err(e) = validate_match_for_claim(&m, principal, now, settings) {
            // Enrich the already-claimed rejection with the original payout
            // proof when the claim row still exists.
            if matches!(e, SettleError::AlreadyClaimed { .. }) {
                if let Some(c) = qd_db::lock_claim(&mut tx, match_id).await? {
                    return Err(SettleError::AlreadyClaimed {
                        wallet: c.winner_wallet,
                        tx_hash: c.tx_hash,
                    });
                }
            }
            return Err(e);
        }

        let prior = qd_db::lock_claim(&mut tx, match_id).await?;
        match evaluate_prior_claim(prior.as_ref(), now, settings.retry_window()) {
            PriorClaim::None => {}
            PriorClaim::Blocked { wallet, tx_hash } => {
                return Err(SettleError::AlreadyClaimed { wallet, tx_hash });
            }
            PriorClaim::RetryExpired => return Err(SettleError::RetryWindowExpired),
            PriorClaim::Retryable => {
                qd_db::delete_failed_claim(&mut tx, match_id).await?;
            }
        }

        let stake = qd_db::lock_confirmed_stake_for_match(&mut tx, match_id, &principal.user_id)
            .await?
            .ok_or(SettleError::StakeNotFound)?;

        let payout = PayoutBreakdown::compute(&m.stake_amount, settings.fee_bps);

        // Max-payout bound: lifetime disbursement against a stake record may
        // never exceed twice its amount. A breach here means corrupted state
        // or an exploit attempt, so it is logged as a security event.
        let projected = &stake.total_claimed_amount + &payout.net_payout;
        if projected > stake.max_claimable() {
            error!(
                %match_id,
                user = %principal.user_id,
                stake = %stake.reference,
                already_claimed = %stake.total_claimed_amount,
                requested_net = %payout.net_payout,
                ceiling = %stake.max_claimable(),
                "security: claim would exceed max payout against stake; rejected"
            );
            return Err(SettleError::MaxPayoutExceeded);
        }

        let winner_wallet = m
            .winner_wallet()
            .ok_or(SettleError::WalletMismatch)?
            .to_string();
        let key = claim_idempotency_key(match_id, &winner_wallet);

        qd_db::mark_stake_used(&mut tx, &stake.reference).await?;
        qd_db::insert_processing_claim(&mut tx, match_id, &winner_wallet, &payout, &key).await?;
        tx.commit().await?;

        (payout, stake.reference, winner_wallet)
    };

    // Phase 2: the ledger transfer, outside any row lock.
    let tx_hash = match ledger.send_payout(&winner_wallet, &payout.net_payout).await {
        Ok(h) => h,
        Err(err) => {
            let message = err.to_string();
            warn!(%match_id, error = %message, "payout submission failed; recording failed claim");
            if let Err(db_err) = qd_db::fail_claim(pool, match_id, &message).await {
                // Claim stays in processing and blocks retries until an
                // operator reconciles it.
                error!(%match_id, error = %db_err, "could not record claim failure");
            }
            return Err(map_ledger_error(err));
        }
    };

    // Phase 3: confirmation, same lock order as the reservation.
    let mut tx = pool.begin().await?;
    qd_db::settle_match_claimed(&mut tx, match_id, &payout.net_payout).await?;
    if !qd_db::complete_claim(&mut tx, match_id, &tx_hash).await? {
        warn!(%match_id, %tx_hash, "claim row left processing state before confirmation");
    }
    qd_db::add_stake_claimed_amount(&mut tx, &stake_reference, &payout.net_payout).await?;
    tx.commit().await?;

    info!(
        %match_id,
        wallet = %winner_wallet,
        net = %payout.net_payout,
        %tx_hash,
        "winnings claimed"
    );

    Ok(ClaimReceipt {
        match_id,
        tx_hash,
        gross_pool: payout.gross_pool,
        platform_fee: payout.platform_fee,
        net_payout: payout.net_payout,
    })
}

// ---------------------------------------------------------------------------
// Read-only preview
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Serialize)]
pub struct ClaimStatusView {
    pub match_id: Uuid,
    pub claimable: bool,
    /// Reason code when not claimable.
    pub reason: Option<&'static str>,
    pub match_status: &'static str,
    pub claim_status: &'static str,
    pub claim_deadline: Option<DateTime<Utc>>,
    pub payout: PayoutBreakdown,
    pub tx_hash: Option<String>,
}

/// What would happen if the requester claimed right now. No locks, no
/// mutation; the answer can be stale by the time a claim is actually made,
/// which is fine because [`claim_winnings`] re-validates under lock.
pub async fn claim_status(
    pool: &PgPool,
    settings: &Settings,
    match_id: Uuid,
    principal: &Principal,
) -> Result<ClaimStatusView, SettleError> {
    let m = qd_db::fetch_match(pool, match_id)
        .await?
        .ok_or(SettleError::MatchNotFound)?;
    // Only the two players may inspect a match's settlement state.
    if !m.is_player(&principal.user_id) {
        return Err(SettleError::MatchNotFound);
    }

    let now = Utc::now();
    let prior = qd_db::fetch_claim(pool, match_id).await?;

    let verdict = validate_match_for_claim(&m, principal, now, settings).and_then(|()| {
        match evaluate_prior_claim(prior.as_ref(), now, settings.retry_window()) {
            PriorClaim::None | PriorClaim::Retryable => Ok(()),
            PriorClaim::Blocked { wallet, tx_hash } => {
                Err(SettleError::AlreadyClaimed { wallet, tx_hash })
            }
            PriorClaim::RetryExpired => Err(SettleError::RetryWindowExpired),
        }
    });

    Ok(ClaimStatusView {
        match_id,
        claimable: verdict.is_ok(),
        reason: verdict.err().map(|e| e.reason()),
        match_status: m.status.as_str(),
        claim_status: m.claim_status.as_str(),
        claim_deadline: m.claim_deadline,
        payout: PayoutBreakdown::compute(&m.stake_amount, settings.fee_bps),
        tx_hash: prior.and_then(|c| c.tx_hash),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use qd_types::ClaimState;

    fn settings() -> Settings {
        Settings::default()
    }

    fn alice() -> Principal {
        Principal::new("alice", "0xAAA1")
    }

    fn completed_match(winner: &str, deadline: Option<DateTime<Utc>>) -> MatchRow {
        MatchRow {
            match_id: Uuid::new_v4(),
            player1_user: "alice".into(),
            player2_user: "bob".into(),
            player1_wallet: "0xaaa1".into(),
            player2_wallet: "0xbbb2".into(),
            stake_amount: Amount::from_u64(100_000),
            status: MatchStatus::Completed,
            winner_user: Some(winner.to_string()),
            claim_status: ClaimStatus::Unclaimed,
            claim_deadline: deadline,
            total_claimed_amount: Amount::zero(),
            cancelled: false,
            cancel_reason: None,
            refund_processed: false,
            player1_last_ping: None,
            player2_last_ping: None,
            created_at: Utc::now() - Duration::minutes(10),
        }
    }

    fn failed_claim(updated_at: DateTime<Utc>) -> ClaimRow {
        ClaimRow {
            match_id: Uuid::new_v4(),
            winner_wallet: "0xaaa1".into(),
            gross_pool: Amount::from_u64(200_000),
            platform_fee: Amount::from_u64(6_000),
            net_payout: Amount::from_u64(194_000),
            status: ClaimState::Failed,
            claimed: false,
            idempotency_key: "k".into(),
            tx_hash: None,
            error_message: Some("boom".into()),
            created_at: updated_at,
            updated_at,
        }
    }

    #[test]
    fn winner_inside_window_validates() {
        let now = Utc::now();
        let m = completed_match("alice", Some(now + Duration::minutes(30)));
        assert!(validate_match_for_claim(&m, &alice(), now, &settings()).is_ok());
    }

    #[test]
    fn wallet_comparison_is_case_insensitive() {
        // Session wallet 0xAAA1 vs recorded 0xaaa1.
        let now = Utc::now();
        let m = completed_match("alice", Some(now + Duration::minutes(30)));
        assert!(validate_match_for_claim(&m, &alice(), now, &settings()).is_ok());

        let wrong = Principal::new("alice", "0xdead");
        assert!(matches!(
            validate_match_for_claim(&m, &wrong, now, &settings()),
            Err(SettleError::WalletMismatch)
        ));
    }

    #[test]
    fn non_winner_is_rejected() {
        let now = Utc::now();
        let m = completed_match("bob", Some(now + Duration::minutes(30)));
        assert!(matches!(
            validate_match_for_claim(&m, &alice(), now, &settings()),
            Err(SettleError::NotWinner)
        ));
    }

    #[test]
    fn active_match_is_not_claimable() {
        let now = Utc::now();
        let mut m = completed_match("alice", None);
        m.status = MatchStatus::Signal;
        m.winner_user = None;
        assert!(matches!(
            validate_match_for_claim(&m, &alice(), now, &settings()),
            Err(SettleError::MatchNotCompleted)
        ));
    }

    #[test]
    fn grace_extends_the_deadline() {
        let now = Utc::now();
        let s = settings(); // 60s grace

        // 30 seconds past the deadline: still accepted.
        let m = completed_match("alice", Some(now - Duration::seconds(30)));
        assert!(validate_match_for_claim(&m, &alice(), now, &s).is_ok());

        // Two minutes past: rejected with the original deadline.
        let late = completed_match("alice", Some(now - Duration::minutes(2)));
        assert!(matches!(
            validate_match_for_claim(&late, &alice(), now, &s),
            Err(SettleError::ClaimWindowExpired { .. })
        ));
    }

    #[test]
    fn expired_marker_yields_inside_grace() {
        // The sweep may flip the row right at the deadline; a request still
        // inside deadline + grace goes through anyway.
        let now = Utc::now();
        let mut m = completed_match("alice", Some(now - Duration::seconds(10)));
        m.claim_status = ClaimStatus::Expired;
        assert!(validate_match_for_claim(&m, &alice(), now, &settings()).is_ok());
    }

    #[test]
    fn claimed_match_reports_already_claimed() {
        let now = Utc::now();
        let mut m = completed_match("alice", Some(now + Duration::minutes(30)));
        m.claim_status = ClaimStatus::Claimed;
        assert!(matches!(
            validate_match_for_claim(&m, &alice(), now, &settings()),
            Err(SettleError::AlreadyClaimed { .. })
        ));
    }

    #[test]
    fn prior_claim_states_gate_retries() {
        let now = Utc::now();
        let window = settings().retry_window();

        assert_eq!(evaluate_prior_claim(None, now, window), PriorClaim::None);

        let mut inflight = failed_claim(now);
        inflight.status = ClaimState::Processing;
        assert!(matches!(
            evaluate_prior_claim(Some(&inflight), now, window),
            PriorClaim::Blocked { .. }
        ));

        let mut done = failed_claim(now);
        done.status = ClaimState::Completed;
        done.tx_hash = Some("0xfeed".into());
        match evaluate_prior_claim(Some(&done), now, window) {
            PriorClaim::Blocked { tx_hash, .. } => assert_eq!(tx_hash.as_deref(), Some("0xfeed")),
            other => panic!("expected Blocked, got {other:?}"),
        }

        let recent = failed_claim(now - Duration::hours(1));
        assert_eq!(
            evaluate_prior_claim(Some(&recent), now, window),
            PriorClaim::Retryable
        );

        let stale = failed_claim(now - Duration::hours(25));
        assert_eq!(
            evaluate_prior_claim(Some(&stale), now, window),
            PriorClaim::RetryExpired
        );
    }
}
