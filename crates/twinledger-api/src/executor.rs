//! Executor HTTP routes.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::trace::TraceLayer;
use twinledger_types::{
    ActionReceipt, Address, BalanceSummary, ExecutorApi, ExecutorBalance, ExecutorPayload,
    LedgerError, NonceResponse, SettlementReport, SettlementStatus, SignedEnvelope,
};

use crate::error::{ApiError, ApiResult};
use crate::wire::{self, Health, SyncRequest};

type ExecutorState = Arc<dyn ExecutorApi>;

/// Router serving `api` under the Executor paths.
pub fn executor_router(api: ExecutorState) -> Router {
    Router::new()
        .route(wire::HEALTH, get(health))
        .route(wire::BET, post(bet))
        .route(wire::WITHDRAW, post(withdraw))
        .route("/balance/:address", get(balance))
        .route("/balance/details/:address", get(balance_details))
        .route("/nonce/:address", get(nonce))
        .route(wire::SETTLE, post(settle))
        .route(wire::SETTLE_STATUS, get(settlement_status))
        .route(wire::SYNC, post(sync))
        .layer(TraceLayer::new_for_http())
        .with_state(api)
}

/// Reject envelopes whose payload does not belong on this route.
fn expect_payload(
    envelope: &SignedEnvelope,
    accept: fn(&ExecutorPayload) -> bool,
    route: &str,
) -> Result<(), ApiError> {
    let payload = envelope.parse_payload::<ExecutorPayload>()?;
    if accept(&payload) {
        Ok(())
    } else {
        Err(LedgerError::MalformedEnvelope {
            reason: format!("{} payload not accepted on {route}", payload.kind()),
        }
        .into())
    }
}

async fn health() -> Json<Health> {
    Json(Health::ok("executor"))
}

/// Bets and executor transfers.
async fn bet(
    State(api): State<ExecutorState>,
    Json(envelope): Json<SignedEnvelope>,
) -> ApiResult<ActionReceipt> {
    expect_payload(
        &envelope,
        |p| !matches!(p, ExecutorPayload::Withdraw { .. }),
        wire::BET,
    )?;
    Ok(Json(api.apply_action(envelope).await?))
}

async fn withdraw(
    State(api): State<ExecutorState>,
    Json(envelope): Json<SignedEnvelope>,
) -> ApiResult<ActionReceipt> {
    expect_payload(
        &envelope,
        |p| matches!(p, ExecutorPayload::Withdraw { .. }),
        wire::WITHDRAW,
    )?;
    Ok(Json(api.apply_action(envelope).await?))
}

async fn balance(
    State(api): State<ExecutorState>,
    Path(address): Path<String>,
) -> ApiResult<BalanceSummary> {
    let details = api.balance(&Address::from(address)).await?;
    Ok(Json(BalanceSummary::from(&details)))
}

async fn balance_details(
    State(api): State<ExecutorState>,
    Path(address): Path<String>,
) -> ApiResult<ExecutorBalance> {
    Ok(Json(api.balance(&Address::from(address)).await?))
}

async fn nonce(
    State(api): State<ExecutorState>,
    Path(address): Path<String>,
) -> ApiResult<NonceResponse> {
    Ok(Json(api.nonce(&Address::from(address)).await?))
}

async fn settle(State(api): State<ExecutorState>) -> ApiResult<SettlementReport> {
    Ok(Json(api.settle().await?))
}

async fn settlement_status(State(api): State<ExecutorState>) -> ApiResult<SettlementStatus> {
    Ok(Json(api.settlement_status().await?))
}

async fn sync(
    State(api): State<ExecutorState>,
    Json(req): Json<SyncRequest>,
) -> ApiResult<ExecutorBalance> {
    Ok(Json(api.sync(&req.address).await?))
}
