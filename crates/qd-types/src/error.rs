//! The settlement error taxonomy.
//!
//! Four classes, per the settlement design:
//! - *validation* — bad input / wrong state; rejected synchronously, no
//!   mutation (4xx).
//! - *conflict* — a race was lost or the work is already done; no mutation
//!   (409).
//! - *external failure* — the ledger call failed; the claim row records the
//!   failure and a retry is permitted inside the retry window (5xx).
//! - *invariant violation* — the max-payout bound would be breached; logged
//!   as a security event at the rejection site, no further mutation.
//!
//! Every variant has a stable machine-readable [`reason`](SettleError::reason)
//! string that is echoed to clients; the HTTP status mapping lives in the
//! daemon.

use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SettleError {
    // -- validation ---------------------------------------------------------
    #[error("match not found")]
    MatchNotFound,

    #[error("match is not completed")]
    MatchNotCompleted,

    #[error("requester is not the recorded winner")]
    NotWinner,

    #[error("recorded winner wallet does not match session wallet")]
    WalletMismatch,

    #[error("claim window expired at {deadline}")]
    ClaimWindowExpired { deadline: DateTime<Utc> },

    #[error("failed claim is past the retry window")]
    RetryWindowExpired,

    #[error("no confirmed stake found for this match")]
    StakeNotFound,

    #[error("stake is not eligible for refund")]
    RefundNotEligible,

    #[error("refund window expired at {deadline}")]
    RefundWindowExpired { deadline: DateTime<Utc> },

    #[error("stake deposit is not confirmed")]
    DepositNotConfirmed,

    #[error("deposit transaction did not verify on chain")]
    DepositVerificationFailed,

    // -- conflict -----------------------------------------------------------
    #[error("winnings already claimed by {wallet}")]
    AlreadyClaimed {
        wallet: String,
        tx_hash: Option<String>,
    },

    #[error("refund already in progress")]
    RefundInProgress,

    #[error("refund already completed")]
    RefundAlreadyCompleted { tx_hash: Option<String> },

    // -- invariant violation ------------------------------------------------
    #[error("payout would exceed the maximum claimable against this stake")]
    MaxPayoutExceeded,

    // -- external failure ---------------------------------------------------
    #[error("treasury has insufficient funds")]
    InsufficientTreasury,

    #[error("ledger submission failed: {0}")]
    LedgerSubmit(String),

    // -- infrastructure -----------------------------------------------------
    #[error(transparent)]
    Db(#[from] sqlx::Error),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl SettleError {
    /// Stable snake_case reason string for API responses and logs.
    pub fn reason(&self) -> &'static str {
        match self {
            SettleError::MatchNotFound => "match_not_found",
            SettleError::MatchNotCompleted => "match_not_completed",
            SettleError::NotWinner => "not_winner",
            SettleError::WalletMismatch => "wallet_mismatch",
            SettleError::ClaimWindowExpired { .. } => "claim_window_expired",
            SettleError::RetryWindowExpired => "retry_window_expired",
            SettleError::StakeNotFound => "stake_not_found",
            SettleError::RefundNotEligible => "refund_not_eligible",
            SettleError::RefundWindowExpired { .. } => "refund_window_expired",
            SettleError::DepositNotConfirmed => "deposit_not_confirmed",
            SettleError::DepositVerificationFailed => "deposit_verification_failed",
            SettleError::AlreadyClaimed { .. } => "already_claimed",
            SettleError::RefundInProgress => "refund_in_progress",
            SettleError::RefundAlreadyCompleted { .. } => "refund_already_completed",
            SettleError::MaxPayoutExceeded => "max_payout_exceeded",
            SettleError::InsufficientTreasury => "insufficient_treasury",
            SettleError::LedgerSubmit(_) => "ledger_submit_failed",
            SettleError::Db(_) => "database_error",
            SettleError::Internal(_) => "internal_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reasons_are_stable_snake_case() {
        let errs: Vec<SettleError> = vec![
            SettleError::MatchNotFound,
            SettleError::NotWinner,
            SettleError::AlreadyClaimed {
                wallet: "0xabc".into(),
                tx_hash: Some("0xdead".into()),
            },
            SettleError::MaxPayoutExceeded,
            SettleError::InsufficientTreasury,
        ];
        for e in errs {
            let r = e.reason();
            assert!(!r.is_empty());
            assert!(r.bytes().all(|b| b.is_ascii_lowercase() || b == b'_'));
        }
    }
}
