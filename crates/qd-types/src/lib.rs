//! Shared domain types for the QuickDraw settlement backend.
//!
//! Everything that moves money flows through the types in this crate:
//! base-unit [`Amount`]s, the match/claim/refund state machines, the payout
//! math, and the [`SettleError`] taxonomy every rejection is expressed in.
//! No component performs settlement arithmetic outside [`amount`] and
//! [`payout`] — floating point is banned from the money path.

pub mod amount;
pub mod error;
pub mod keys;
pub mod payout;
pub mod settings;
pub mod status;

pub use amount::{Amount, AmountParseError};
pub use error::SettleError;
pub use keys::{claim_idempotency_key, wallets_match};
pub use payout::{PayoutBreakdown, RefundBreakdown};
pub use settings::Settings;
pub use status::{CancelReason, ClaimState, ClaimStatus, MatchStatus, RefundState};

use serde::{Deserialize, Serialize};

/// The authenticated caller of a settlement operation.
///
/// Always constructed by the daemon's session verification layer and passed
/// explicitly into every engine function — there is no ambient "current user"
/// anywhere in the workspace. The wallet is the one bound to the verified
/// session, which the claim engine compares (case-insensitively) against the
/// wallet recorded on the match.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub user_id: String,
    pub wallet: String,
}

impl Principal {
    pub fn new(user_id: impl Into<String>, wallet: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            wallet: wallet.into(),
        }
    }
}
