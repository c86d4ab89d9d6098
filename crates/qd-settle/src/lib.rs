//! The settlement engine: exactly-once winnings claims and stake refunds.
//!
//! Both flows follow the same two-phase discipline against the ledger:
//!
//! 1. *Reserve* — a database transaction validates the request under row
//!    locks (always match → claim → stake) and commits a `processing`
//!    marker. From this commit on, no concurrent request can start the same
//!    payout.
//! 2. *Execute* — the ledger transfer runs outside any database lock.
//! 3. *Confirm* — success is recorded with the transaction hash; failure
//!    downgrades the marker so the caller may retry inside the retry window.
//!
//! The failure mode this buys: a crash between phases leaves a `processing`
//! marker that blocks further attempts. Payouts can be delayed by an
//! operator reconciliation, never duplicated.

use qd_ledger::LedgerError;
use qd_types::SettleError;

pub mod claim;
pub mod refund;

pub use claim::{claim_status, claim_winnings, ClaimReceipt, ClaimStatusView};
pub use refund::{
    claim_deposit_refund, claim_refund, confirm_deposit, eligible_refunds, refund_status,
    RefundOffer, RefundReceipt, RefundStatusView,
};

/// InsufficientFunds is an operational alarm, not a transient fault; the
/// rest of the ledger taxonomy maps to the retryable submit error.
pub(crate) fn map_ledger_error(err: LedgerError) -> SettleError {
    match err {
        LedgerError::InsufficientFunds { .. } => SettleError::InsufficientTreasury,
        other => SettleError::LedgerSubmit(other.to_string()),
    }
}
