//! Request and response types for all qd-daemon HTTP endpoints.
//!
//! Wire casing is camelCase to match the game client; amounts serialize as
//! decimal strings (see `qd_types::Amount`). No business logic lives here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use qd_settle::{ClaimReceipt, ClaimStatusView, RefundOffer, RefundReceipt, RefundStatusView};
use qd_types::Amount;

// ---------------------------------------------------------------------------
// /v1/health
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub service: &'static str,
    pub version: &'static str,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Uniform error body. `reason` is the stable machine-readable code from
/// `SettleError::reason`; the optional fields carry conflict proof (who
/// claimed, with which transaction) when one exists.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiErrorResponse {
    pub error: String,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wallet: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deadline: Option<DateTime<Utc>>,
}

impl ApiErrorResponse {
    pub fn new(error: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            reason: reason.into(),
            wallet: None,
            tx_hash: None,
            deadline: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Claims
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimRequest {
    pub match_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimResponse {
    pub match_id: Uuid,
    pub tx_hash: String,
    pub gross_pool: Amount,
    pub platform_fee: Amount,
    pub net_payout: Amount,
}

impl From<ClaimReceipt> for ClaimResponse {
    fn from(r: ClaimReceipt) -> Self {
        Self {
            match_id: r.match_id,
            tx_hash: r.tx_hash,
            gross_pool: r.gross_pool,
            platform_fee: r.platform_fee,
            net_payout: r.net_payout,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimStatusResponse {
    pub match_id: Uuid,
    pub claimable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub match_status: String,
    pub claim_status: String,
    pub claim_deadline: Option<DateTime<Utc>>,
    pub gross_pool: Amount,
    pub platform_fee: Amount,
    pub net_payout: Amount,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
}

impl From<ClaimStatusView> for ClaimStatusResponse {
    fn from(v: ClaimStatusView) -> Self {
        Self {
            match_id: v.match_id,
            claimable: v.claimable,
            reason: v.reason.map(str::to_string),
            match_status: v.match_status.to_string(),
            claim_status: v.claim_status.to_string(),
            claim_deadline: v.claim_deadline,
            gross_pool: v.payout.gross_pool,
            platform_fee: v.payout.platform_fee,
            net_payout: v.payout.net_payout,
            tx_hash: v.tx_hash,
        }
    }
}

// ---------------------------------------------------------------------------
// Refunds
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefundClaimRequest {
    pub payment_reference: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefundResponse {
    pub payment_reference: String,
    pub tx_hash: String,
    pub refund_amount: Amount,
    pub gas_fee: Amount,
}

impl From<RefundReceipt> for RefundResponse {
    fn from(r: RefundReceipt) -> Self {
        Self {
            payment_reference: r.reference,
            tx_hash: r.tx_hash,
            refund_amount: r.refund_amount,
            gas_fee: r.gas_fee,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefundStatusResponse {
    pub payment_reference: String,
    pub refund_status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refund_reason: Option<String>,
    pub refund_deadline: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
    pub refund_amount: Amount,
    pub gas_fee: Amount,
}

impl From<RefundStatusView> for RefundStatusResponse {
    fn from(v: RefundStatusView) -> Self {
        Self {
            payment_reference: v.reference,
            refund_status: v.refund_status.to_string(),
            refund_reason: v.refund_reason,
            refund_deadline: v.refund_deadline,
            tx_hash: v.refund_tx_hash,
            refund_amount: v.breakdown.refund_amount,
            gas_fee: v.breakdown.gas_fee,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefundOfferResponse {
    pub payment_reference: String,
    pub staked: Amount,
    pub refund_amount: Amount,
    pub gas_fee: Amount,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refund_reason: Option<String>,
    pub refund_deadline: Option<DateTime<Utc>>,
}

impl From<RefundOffer> for RefundOfferResponse {
    fn from(o: RefundOffer) -> Self {
        Self {
            payment_reference: o.reference,
            staked: o.staked,
            refund_amount: o.refund_amount,
            gas_fee: o.gas_fee,
            refund_reason: o.refund_reason,
            refund_deadline: o.refund_deadline,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EligibleRefundsResponse {
    pub refunds: Vec<RefundOfferResponse>,
}

// ---------------------------------------------------------------------------
// Stake confirmation / heartbeats
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StakeConfirmRequest {
    pub payment_reference: String,
    pub tx_hash: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StakeConfirmResponse {
    pub confirmed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatResponse {
    pub accepted: bool,
}
