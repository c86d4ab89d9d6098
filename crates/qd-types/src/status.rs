//! Lifecycle state machines for matches, claims, and refunds.
//!
//! Every enum here is persisted as a lowercase `TEXT` column and re-parsed on
//! read; `as_str` / `parse` are the single encode/decode points. The SQL
//! layer additionally CHECK-constrains the columns to the same value sets,
//! so a bad write fails loudly at the database rather than decoding into a
//! phantom state later.

use anyhow::{anyhow, Result};

// ---------------------------------------------------------------------------
// MatchStatus
// ---------------------------------------------------------------------------

/// Lifecycle of a wagered match:
/// `waiting → ready → countdown → signal → completed | cancelled`.
///
/// `completed` requires a recorded winner (or tie determination);
/// `cancelled` requires a [`CancelReason`]. The disconnect monitor only ever
/// acts on matches in an *active* state, which is what makes its scan
/// idempotent: a match it resolved last tick no longer appears in the next
/// tick's result set.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MatchStatus {
    Waiting,
    Ready,
    Countdown,
    Signal,
    Completed,
    Cancelled,
}

impl MatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchStatus::Waiting => "waiting",
            MatchStatus::Ready => "ready",
            MatchStatus::Countdown => "countdown",
            MatchStatus::Signal => "signal",
            MatchStatus::Completed => "completed",
            MatchStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "waiting" => Ok(MatchStatus::Waiting),
            "ready" => Ok(MatchStatus::Ready),
            "countdown" => Ok(MatchStatus::Countdown),
            "signal" => Ok(MatchStatus::Signal),
            "completed" => Ok(MatchStatus::Completed),
            "cancelled" => Ok(MatchStatus::Cancelled),
            other => Err(anyhow!("invalid match status: {}", other)),
        }
    }

    /// States in which the match is still being played (or waiting to be).
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            MatchStatus::Waiting | MatchStatus::Ready | MatchStatus::Countdown | MatchStatus::Signal
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, MatchStatus::Completed | MatchStatus::Cancelled)
    }
}

// ---------------------------------------------------------------------------
// ClaimStatus (on the match row)
// ---------------------------------------------------------------------------

/// Claimability of a completed match, as recorded on the match row.
///
/// Transitions to `claimed` only after the corresponding claim row reached
/// `completed` — never before money actually moved.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ClaimStatus {
    Unclaimed,
    Claimed,
    Expired,
}

impl ClaimStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClaimStatus::Unclaimed => "unclaimed",
            ClaimStatus::Claimed => "claimed",
            ClaimStatus::Expired => "expired",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "unclaimed" => Ok(ClaimStatus::Unclaimed),
            "claimed" => Ok(ClaimStatus::Claimed),
            "expired" => Ok(ClaimStatus::Expired),
            other => Err(anyhow!("invalid claim status: {}", other)),
        }
    }
}

// ---------------------------------------------------------------------------
// ClaimState (on the claim row)
// ---------------------------------------------------------------------------

/// State of one settlement attempt.
///
/// The engine inserts rows directly in `processing` (the reservation), so
/// `pending` only exists for rows created by out-of-band tooling. A `failed`
/// row is the retry token: it may be deleted and recreated within the retry
/// window, and only then.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ClaimState {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl ClaimState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClaimState::Pending => "pending",
            ClaimState::Processing => "processing",
            ClaimState::Completed => "completed",
            ClaimState::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(ClaimState::Pending),
            "processing" => Ok(ClaimState::Processing),
            "completed" => Ok(ClaimState::Completed),
            "failed" => Ok(ClaimState::Failed),
            other => Err(anyhow!("invalid claim state: {}", other)),
        }
    }

    /// A payout is in flight or done: a second claim must be refused.
    pub fn blocks_new_claim(&self) -> bool {
        matches!(
            self,
            ClaimState::Pending | ClaimState::Processing | ClaimState::Completed
        )
    }
}

// ---------------------------------------------------------------------------
// RefundState (on the stake record)
// ---------------------------------------------------------------------------

/// Refund sub-state of a stake record. `none` and SQL NULL are equivalent
/// (NULL predates the column backfill); the conditional eligibility update
/// treats both as unmarked.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RefundState {
    None,
    Eligible,
    Processing,
    Completed,
}

impl RefundState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefundState::None => "none",
            RefundState::Eligible => "eligible",
            RefundState::Processing => "processing",
            RefundState::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "none" => Ok(RefundState::None),
            "eligible" => Ok(RefundState::Eligible),
            "processing" => Ok(RefundState::Processing),
            "completed" => Ok(RefundState::Completed),
            other => Err(anyhow!("invalid refund state: {}", other)),
        }
    }

    pub fn parse_opt(s: Option<&str>) -> Result<Self> {
        match s {
            None => Ok(RefundState::None),
            Some(v) => Self::parse(v),
        }
    }
}

// ---------------------------------------------------------------------------
// CancelReason
// ---------------------------------------------------------------------------

/// Why a match was voided. Entry to `cancelled` always records one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CancelReason {
    BothPlayersDisconnect,
    OpponentDisconnect,
    MatchmakingTimeout,
    NoMatchFound,
}

impl CancelReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CancelReason::BothPlayersDisconnect => "both_players_disconnect",
            CancelReason::OpponentDisconnect => "opponent_disconnect",
            CancelReason::MatchmakingTimeout => "matchmaking_timeout",
            CancelReason::NoMatchFound => "no_match_found",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "both_players_disconnect" => Ok(CancelReason::BothPlayersDisconnect),
            "opponent_disconnect" => Ok(CancelReason::OpponentDisconnect),
            "matchmaking_timeout" => Ok(CancelReason::MatchmakingTimeout),
            "no_match_found" => Ok(CancelReason::NoMatchFound),
            other => Err(anyhow!("invalid cancel reason: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn match_status_round_trip() {
        for s in ["waiting", "ready", "countdown", "signal", "completed", "cancelled"] {
            assert_eq!(MatchStatus::parse(s).unwrap().as_str(), s);
        }
        assert!(MatchStatus::parse("COMPLETED").is_err());
        assert!(MatchStatus::parse("").is_err());
    }

    #[test]
    fn active_and_terminal_are_disjoint_and_exhaustive() {
        let all = [
            MatchStatus::Waiting,
            MatchStatus::Ready,
            MatchStatus::Countdown,
            MatchStatus::Signal,
            MatchStatus::Completed,
            MatchStatus::Cancelled,
        ];
        for st in all {
            assert_ne!(st.is_active(), st.is_terminal(), "{st:?}");
        }
    }

    #[test]
    fn claim_state_blocking() {
        assert!(ClaimState::Pending.blocks_new_claim());
        assert!(ClaimState::Processing.blocks_new_claim());
        assert!(ClaimState::Completed.blocks_new_claim());
        assert!(!ClaimState::Failed.blocks_new_claim());
    }

    #[test]
    fn refund_state_null_is_none() {
        assert_eq!(RefundState::parse_opt(None).unwrap(), RefundState::None);
        assert_eq!(
            RefundState::parse_opt(Some("eligible")).unwrap(),
            RefundState::Eligible
        );
        assert!(RefundState::parse_opt(Some("bogus")).is_err());
    }

    #[test]
    fn cancel_reason_round_trip() {
        for s in [
            "both_players_disconnect",
            "opponent_disconnect",
            "matchmaking_timeout",
            "no_match_found",
        ] {
            assert_eq!(CancelReason::parse(s).unwrap().as_str(), s);
        }
    }
}
