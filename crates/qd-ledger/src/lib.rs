//! Ledger Client — the only component that leaves the system boundary.
//!
//! Wraps the external value-transfer network behind the [`Ledger`] trait:
//! send a payout, read the treasury balance, verify an inbound deposit. The
//! client holds no mutable state beyond its HTTP connection pool and is
//! safely shared across concurrent settlement calls. Idempotency exists
//! only at the network level — the transaction hash is the proof of
//! execution — which is exactly why the claim engine records its
//! reservation *before* calling in here.

use async_trait::async_trait;
use thiserror::Error;

use qd_types::Amount;

pub mod rpc;

pub use rpc::RpcTreasury;

/// Ledger failure classes. Callers treat these differently:
/// [`LedgerError::InsufficientFunds`] is an operational condition (alert,
/// do not hammer retries), while `Submit`/`Rpc` are transient and safe to
/// retry through the failed-claim path.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("insufficient treasury funds: have {have}, need {need}")]
    InsufficientFunds { have: Amount, need: Amount },

    #[error("ledger submission failed: {0}")]
    Submit(String),

    #[error("ledger rpc failed: {0}")]
    Rpc(String),
}

/// The value-transfer seam. Production uses [`RpcTreasury`]; tests use the
/// recording mock in `qd-testkit`.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Transfer `amount` base units from the treasury to `wallet`.
    /// Returns the transaction hash on success.
    ///
    /// Implementations must pre-check their own balance and fail fast with
    /// [`LedgerError::InsufficientFunds`] instead of submitting a transfer
    /// that will revert.
    async fn send_payout(&self, wallet: &str, amount: &Amount) -> Result<String, LedgerError>;

    /// Current treasury balance in base units.
    async fn balance(&self) -> Result<Amount, LedgerError>;

    /// The custodial treasury address — the expected recipient of every
    /// inbound stake deposit.
    fn treasury_address(&self) -> &str;

    /// Check that `tx_hash` is a successful on-chain transfer of
    /// approximately `expected_amount` to `expected_recipient`.
    ///
    /// Strict on recipient (case-insensitive) and on success status;
    /// tolerates a 0.1% amount variance for gas/rounding.
    async fn verify_deposit(
        &self,
        tx_hash: &str,
        expected_amount: &Amount,
        expected_recipient: &str,
    ) -> Result<bool, LedgerError>;
}

/// Amount variance tolerated by deposit verification, in basis points.
pub const DEPOSIT_VARIANCE_BPS: u32 = 10;

/// Is `actual` within `bps` basis points of `expected`?
///
/// Integer-only: `|actual − expected| × 10_000 ≤ expected × bps`, evaluated
/// without division so no precision is lost.
pub fn within_variance(actual: &Amount, expected: &Amount, bps: u32) -> bool {
    let diff = match actual.checked_sub(expected) {
        Some(d) => d,
        None => expected
            .checked_sub(actual)
            .unwrap_or_else(Amount::zero),
    };
    let scaled_diff = Amount::from(diff.as_biguint() * num_scale(10_000));
    let allowance = Amount::from(expected.as_biguint() * num_scale(bps));
    scaled_diff <= allowance
}

fn num_scale(n: u32) -> num_bigint::BigUint {
    num_bigint::BigUint::from(n)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn amt(n: u64) -> Amount {
        Amount::from_u64(n)
    }

    #[test]
    fn exact_amount_is_within_variance() {
        assert!(within_variance(&amt(100_000), &amt(100_000), DEPOSIT_VARIANCE_BPS));
    }

    #[test]
    fn tenth_percent_boundary() {
        // 0.1% of 100_000 is exactly 100: boundary inclusive.
        assert!(within_variance(&amt(99_900), &amt(100_000), DEPOSIT_VARIANCE_BPS));
        assert!(within_variance(&amt(100_100), &amt(100_000), DEPOSIT_VARIANCE_BPS));
        assert!(!within_variance(&amt(99_899), &amt(100_000), DEPOSIT_VARIANCE_BPS));
        assert!(!within_variance(&amt(100_101), &amt(100_000), DEPOSIT_VARIANCE_BPS));
    }

    #[test]
    fn zero_expected_requires_zero_actual() {
        assert!(within_variance(&amt(0), &amt(0), DEPOSIT_VARIANCE_BPS));
        assert!(!within_variance(&amt(1), &amt(0), DEPOSIT_VARIANCE_BPS));
    }
}
