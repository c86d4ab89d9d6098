//! Payout and refund arithmetic.
//!
//! Pure integer math in base units. The claim engine persists every field of
//! the breakdown on the claim row, so a reviewer can re-derive the payout
//! from the stored stake without trusting application state.

use serde::Serialize;

use crate::amount::Amount;

/// The settlement split for a completed match.
///
/// gross = 2 × stake, fee = gross × fee_bps / 10_000, net = gross − fee.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PayoutBreakdown {
    pub gross_pool: Amount,
    pub platform_fee: Amount,
    pub net_payout: Amount,
}

impl PayoutBreakdown {
    /// Compute the winner's payout for a per-side stake.
    ///
    /// `fee_bps` must be ≤ 10_000 (validated at settings load), so the fee
    /// can never exceed the gross pool and the subtraction cannot underflow.
    pub fn compute(stake: &Amount, fee_bps: u32) -> Self {
        let gross_pool = stake.double();
        let platform_fee = gross_pool.mul_bps(fee_bps);
        let net_payout = gross_pool
            .checked_sub(&platform_fee)
            .unwrap_or_else(Amount::zero);
        Self {
            gross_pool,
            platform_fee,
            net_payout,
        }
    }
}

/// The refund split for a voided stake: the stake minus a flat
/// basis-point gas-recovery cut.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RefundBreakdown {
    pub refund_amount: Amount,
    pub gas_fee: Amount,
}

impl RefundBreakdown {
    pub fn compute(stake: &Amount, fee_bps: u32) -> Self {
        let gas_fee = stake.mul_bps(fee_bps);
        let refund_amount = stake.checked_sub(&gas_fee).unwrap_or_else(Amount::zero);
        Self {
            refund_amount,
            gas_fee,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_vector_300bps() {
        // stake 100000 each side, 300 bps → gross 200000, fee 6000, net 194000
        let b = PayoutBreakdown::compute(&Amount::from_u64(100_000), 300);
        assert_eq!(b.gross_pool, Amount::from_u64(200_000));
        assert_eq!(b.platform_fee, Amount::from_u64(6_000));
        assert_eq!(b.net_payout, Amount::from_u64(194_000));
    }

    #[test]
    fn zero_fee_pays_full_pool() {
        let b = PayoutBreakdown::compute(&Amount::from_u64(100_000), 0);
        assert_eq!(b.platform_fee, Amount::zero());
        assert_eq!(b.net_payout, Amount::from_u64(200_000));
    }

    #[test]
    fn full_fee_pays_nothing() {
        let b = PayoutBreakdown::compute(&Amount::from_u64(100_000), 10_000);
        assert_eq!(b.platform_fee, Amount::from_u64(200_000));
        assert_eq!(b.net_payout, Amount::zero());
    }

    #[test]
    fn net_never_exceeds_stake_ceiling() {
        // The max-payout invariant compares net against 2 × stake; by
        // construction net ≤ gross = 2 × stake for any legal fee.
        for bps in [0, 1, 299, 300, 9_999, 10_000] {
            let stake = Amount::from_u64(7_777);
            let b = PayoutBreakdown::compute(&stake, bps);
            assert!(b.net_payout <= stake.double());
        }
    }

    #[test]
    fn refund_withholds_gas_fee() {
        let r = RefundBreakdown::compute(&Amount::from_u64(100_000), 100);
        assert_eq!(r.gas_fee, Amount::from_u64(1_000));
        assert_eq!(r.refund_amount, Amount::from_u64(99_000));
    }
}
