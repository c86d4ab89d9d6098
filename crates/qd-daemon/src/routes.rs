//! Axum router and all HTTP handlers for qd-daemon.
//!
//! `build_router` is the single entry point; `main.rs` calls it and attaches
//! middleware layers.  All handlers are `pub(crate)` so the scenario tests in
//! `tests/` can compose the router directly.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tracing::error;
use uuid::Uuid;

use qd_types::SettleError;

use crate::api_types::{
    ApiErrorResponse, ClaimRequest, ClaimResponse, ClaimStatusResponse, EligibleRefundsResponse,
    HealthResponse, HeartbeatResponse, RefundClaimRequest, RefundOfferResponse, RefundResponse,
    RefundStatusResponse, StakeConfirmRequest, StakeConfirmResponse,
};
use crate::auth::Session;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Build the complete application router wired to the given shared state.
///
/// Middleware layers (CORS, tracing) are **not** applied here; `main.rs`
/// attaches them after this call so tests can use the bare router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/claim", post(claim))
        .route("/v1/claim/status/:match_id", get(claim_status))
        .route("/v1/refund/claim", post(refund_claim))
        .route("/v1/refund/claim-deposit", post(refund_claim_deposit))
        .route("/v1/refund/status/:reference", get(refund_status))
        .route("/v1/refund/eligible", get(refund_eligible))
        .route("/v1/stake/confirm", post(stake_confirm))
        .route("/v1/match/:match_id/heartbeat", post(heartbeat))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

/// One place where engine errors become HTTP. Infrastructure errors are
/// logged here and reach the client only as an opaque 500.
fn error_response(err: SettleError) -> Response {
    let status = match &err {
        SettleError::MatchNotFound | SettleError::StakeNotFound => StatusCode::NOT_FOUND,
        SettleError::NotWinner | SettleError::WalletMismatch => StatusCode::FORBIDDEN,
        SettleError::AlreadyClaimed { .. }
        | SettleError::RefundInProgress
        | SettleError::RefundAlreadyCompleted { .. } => StatusCode::CONFLICT,
        SettleError::MatchNotCompleted
        | SettleError::ClaimWindowExpired { .. }
        | SettleError::RetryWindowExpired
        | SettleError::RefundNotEligible
        | SettleError::RefundWindowExpired { .. }
        | SettleError::DepositNotConfirmed
        | SettleError::DepositVerificationFailed
        | SettleError::MaxPayoutExceeded => StatusCode::BAD_REQUEST,
        SettleError::InsufficientTreasury | SettleError::LedgerSubmit(_) => StatusCode::BAD_GATEWAY,
        SettleError::Db(_) | SettleError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };

    let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
        error!(error = %err, "settlement request failed");
        "internal error".to_string()
    } else {
        err.to_string()
    };

    let mut body = ApiErrorResponse::new(message, err.reason());
    match err {
        SettleError::AlreadyClaimed { wallet, tx_hash } => {
            body.wallet = Some(wallet);
            body.tx_hash = tx_hash;
        }
        SettleError::RefundAlreadyCompleted { tx_hash } => body.tx_hash = tx_hash,
        SettleError::ClaimWindowExpired { deadline }
        | SettleError::RefundWindowExpired { deadline } => body.deadline = Some(deadline),
        _ => {}
    }

    (status, Json(body)).into_response()
}

// ---------------------------------------------------------------------------
// GET /v1/health
// ---------------------------------------------------------------------------

pub(crate) async fn health(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            ok: true,
            service: st.build.service,
            version: st.build.version,
        }),
    )
}

// ---------------------------------------------------------------------------
// POST /v1/claim
// ---------------------------------------------------------------------------

pub(crate) async fn claim(
    State(st): State<Arc<AppState>>,
    Session(principal): Session,
    Json(req): Json<ClaimRequest>,
) -> Response {
    match qd_settle::claim_winnings(
        &st.pool,
        st.ledger.as_ref(),
        &st.settings,
        req.match_id,
        &principal,
    )
    .await
    {
        Ok(receipt) => (StatusCode::OK, Json(ClaimResponse::from(receipt))).into_response(),
        Err(e) => error_response(e),
    }
}

// ---------------------------------------------------------------------------
// GET /v1/claim/status/:match_id
// ---------------------------------------------------------------------------

pub(crate) async fn claim_status(
    State(st): State<Arc<AppState>>,
    Session(principal): Session,
    Path(match_id): Path<Uuid>,
) -> Response {
    match qd_settle::claim_status(&st.pool, &st.settings, match_id, &principal).await {
        Ok(view) => (StatusCode::OK, Json(ClaimStatusResponse::from(view))).into_response(),
        Err(e) => error_response(e),
    }
}

// ---------------------------------------------------------------------------
// POST /v1/refund/claim
// ---------------------------------------------------------------------------

pub(crate) async fn refund_claim(
    State(st): State<Arc<AppState>>,
    Session(principal): Session,
    Json(req): Json<RefundClaimRequest>,
) -> Response {
    match qd_settle::claim_refund(
        &st.pool,
        st.ledger.as_ref(),
        &st.settings,
        &req.payment_reference,
        &principal,
    )
    .await
    {
        Ok(receipt) => (StatusCode::OK, Json(RefundResponse::from(receipt))).into_response(),
        Err(e) => error_response(e),
    }
}

// ---------------------------------------------------------------------------
// POST /v1/refund/claim-deposit
// ---------------------------------------------------------------------------

pub(crate) async fn refund_claim_deposit(
    State(st): State<Arc<AppState>>,
    Session(principal): Session,
    Json(req): Json<RefundClaimRequest>,
) -> Response {
    match qd_settle::claim_deposit_refund(
        &st.pool,
        st.ledger.as_ref(),
        &st.settings,
        &req.payment_reference,
        &principal,
    )
    .await
    {
        Ok(receipt) => (StatusCode::OK, Json(RefundResponse::from(receipt))).into_response(),
        Err(e) => error_response(e),
    }
}

// ---------------------------------------------------------------------------
// GET /v1/refund/status/:reference
// ---------------------------------------------------------------------------

pub(crate) async fn refund_status(
    State(st): State<Arc<AppState>>,
    Session(principal): Session,
    Path(reference): Path<String>,
) -> Response {
    match qd_settle::refund_status(&st.pool, &st.settings, &reference, &principal).await {
        Ok(view) => (StatusCode::OK, Json(RefundStatusResponse::from(view))).into_response(),
        Err(e) => error_response(e),
    }
}

// ---------------------------------------------------------------------------
// GET /v1/refund/eligible
// ---------------------------------------------------------------------------

pub(crate) async fn refund_eligible(
    State(st): State<Arc<AppState>>,
    Session(principal): Session,
) -> Response {
    match qd_settle::eligible_refunds(&st.pool, &st.settings, &principal).await {
        Ok(offers) => (
            StatusCode::OK,
            Json(EligibleRefundsResponse {
                refunds: offers.into_iter().map(RefundOfferResponse::from).collect(),
            }),
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

// ---------------------------------------------------------------------------
// POST /v1/stake/confirm
// ---------------------------------------------------------------------------

pub(crate) async fn stake_confirm(
    State(st): State<Arc<AppState>>,
    Session(principal): Session,
    Json(req): Json<StakeConfirmRequest>,
) -> Response {
    match qd_settle::confirm_deposit(
        &st.pool,
        st.ledger.as_ref(),
        &req.payment_reference,
        &req.tx_hash,
        &principal,
    )
    .await
    {
        Ok(()) => (
            StatusCode::OK,
            Json(StakeConfirmResponse { confirmed: true }),
        )
            .into_response(),
        Err(e) => error_response(e),
    }
}

// ---------------------------------------------------------------------------
// POST /v1/match/:match_id/heartbeat
// ---------------------------------------------------------------------------

pub(crate) async fn heartbeat(
    State(st): State<Arc<AppState>>,
    Session(principal): Session,
    Path(match_id): Path<Uuid>,
) -> Response {
    match qd_db::record_heartbeat(&st.pool, match_id, &principal.user_id).await {
        Ok(accepted) => (StatusCode::OK, Json(HeartbeatResponse { accepted })).into_response(),
        Err(e) => error_response(SettleError::Internal(e)),
    }
}
