//! Authority HTTP routes.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::trace::TraceLayer;
use twinledger_types::{
    Address, AuthorityApi, AuthorityBalance, BatchAck, BridgeId, BridgeLock, BridgeStats,
    LockReceipt, NonceResponse, RegisterResponse, ReleaseReceipt, SettlementBatch,
    SettlementProof, SignatureCheck, SignedEnvelope, TransferReceipt, VerifySettlementResponse,
};
use uuid::Uuid;

use crate::error::ApiResult;
use crate::wire::{self, Health, RegisterRequest, ReleaseRequest};

type AuthorityState = Arc<dyn AuthorityApi>;

/// Router serving `api` under the Authority paths.
pub fn authority_router(api: AuthorityState) -> Router {
    Router::new()
        .route(wire::HEALTH, get(health))
        .route("/balance/:address", get(balance))
        .route("/nonce/:address", get(nonce))
        .route(wire::REGISTER, post(register))
        .route(wire::TRANSFER, post(transfer))
        .route(wire::BRIDGE_INITIATE, post(initiate_lock))
        .route(wire::BRIDGE_VERIFY, post(verify_settlement))
        .route(wire::BRIDGE_RELEASE, post(release))
        .route(wire::VERIFY_SIGNATURE, post(verify_signature))
        .route(wire::BRIDGE_STATS, get(bridge_stats))
        .route(wire::BRIDGE_PENDING, get(pending_locks))
        .route("/bridge/status/:bridge_id", get(bridge_status))
        .route(wire::SETTLE_BATCH, post(submit_batch))
        .layer(TraceLayer::new_for_http())
        .with_state(api)
}

async fn health() -> Json<Health> {
    Json(Health::ok("authority"))
}

async fn balance(
    State(api): State<AuthorityState>,
    Path(address): Path<String>,
) -> ApiResult<AuthorityBalance> {
    Ok(Json(api.balance(&Address::from(address)).await?))
}

async fn nonce(
    State(api): State<AuthorityState>,
    Path(address): Path<String>,
) -> ApiResult<NonceResponse> {
    Ok(Json(api.nonce(&Address::from(address)).await?))
}

async fn register(
    State(api): State<AuthorityState>,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<RegisterResponse> {
    Ok(Json(api.register_account(&req.public_key).await?))
}

async fn transfer(
    State(api): State<AuthorityState>,
    Json(envelope): Json<SignedEnvelope>,
) -> ApiResult<TransferReceipt> {
    Ok(Json(api.transfer(envelope).await?))
}

async fn initiate_lock(
    State(api): State<AuthorityState>,
    Json(envelope): Json<SignedEnvelope>,
) -> ApiResult<LockReceipt> {
    Ok(Json(api.initiate_lock(envelope).await?))
}

async fn verify_settlement(
    State(api): State<AuthorityState>,
    Json(proof): Json<SettlementProof>,
) -> ApiResult<VerifySettlementResponse> {
    Ok(Json(api.verify_settlement(proof).await?))
}

async fn release(
    State(api): State<AuthorityState>,
    Json(req): Json<ReleaseRequest>,
) -> ApiResult<ReleaseReceipt> {
    Ok(Json(api.release(req.lock_id).await?))
}

async fn verify_signature(
    State(api): State<AuthorityState>,
    Json(envelope): Json<SignedEnvelope>,
) -> ApiResult<SignatureCheck> {
    Ok(Json(api.verify_signature(envelope).await?))
}

async fn bridge_stats(State(api): State<AuthorityState>) -> ApiResult<BridgeStats> {
    Ok(Json(api.bridge_stats().await?))
}

async fn pending_locks(State(api): State<AuthorityState>) -> ApiResult<Vec<BridgeLock>> {
    Ok(Json(api.pending_locks().await?))
}

async fn bridge_status(
    State(api): State<AuthorityState>,
    Path(bridge_id): Path<Uuid>,
) -> ApiResult<Option<BridgeLock>> {
    Ok(Json(api.bridge_status(BridgeId(bridge_id)).await?))
}

async fn submit_batch(
    State(api): State<AuthorityState>,
    Json(batch): Json<SettlementBatch>,
) -> ApiResult<BatchAck> {
    Ok(Json(api.submit_batch(batch).await?))
}
