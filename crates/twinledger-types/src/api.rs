//! Service seams between the two ledgers and their clients.
//!
//! The Authority and the Executor share no memory. Each talks to the other
//! through these traits, implemented both by the in-process services and by
//! the HTTP clients in `twinledger-api`.

use async_trait::async_trait;

use crate::{
    ActionReceipt, Address, AuthorityBalance, BatchAck, BridgeId, BridgeLock, BridgeStats,
    ExecutorBalance, LockId, LockReceipt, NonceResponse, RegisterResponse, ReleaseReceipt,
    Result, SettlementBatch, SettlementProof, SettlementReport, SettlementStatus, SignatureCheck,
    SignedEnvelope, TransferReceipt, VerifySettlementResponse,
};

/// The Authority ledger's public operations.
#[async_trait]
pub trait AuthorityApi: Send + Sync {
    async fn balance(&self, address: &Address) -> Result<AuthorityBalance>;

    async fn nonce(&self, address: &Address) -> Result<NonceResponse>;

    /// Ensure an account exists for `public_key_hex`. Idempotent.
    async fn register_account(&self, public_key_hex: &str) -> Result<RegisterResponse>;

    async fn transfer(&self, envelope: SignedEnvelope) -> Result<TransferReceipt>;

    async fn initiate_lock(&self, envelope: SignedEnvelope) -> Result<LockReceipt>;

    async fn verify_settlement(&self, proof: SettlementProof) -> Result<VerifySettlementResponse>;

    async fn release(&self, lock_id: LockId) -> Result<ReleaseReceipt>;

    /// Check an envelope without consuming its nonce.
    async fn verify_signature(&self, envelope: SignedEnvelope) -> Result<SignatureCheck>;

    async fn bridge_stats(&self) -> Result<BridgeStats>;

    /// Every open lock.
    async fn pending_locks(&self) -> Result<Vec<BridgeLock>>;

    async fn bridge_status(&self, bridge_id: BridgeId) -> Result<Option<BridgeLock>>;

    async fn submit_batch(&self, batch: SettlementBatch) -> Result<BatchAck>;
}

/// The Executor's public operations.
#[async_trait]
pub trait ExecutorApi: Send + Sync {
    /// Apply a signed bet, transfer or withdrawal.
    async fn apply_action(&self, envelope: SignedEnvelope) -> Result<ActionReceipt>;

    async fn balance(&self, address: &Address) -> Result<ExecutorBalance>;

    async fn nonce(&self, address: &Address) -> Result<NonceResponse>;

    /// Refresh the confirmed component from the Authority.
    async fn sync(&self, address: &Address) -> Result<ExecutorBalance>;

    /// Run one settlement cycle.
    async fn settle(&self) -> Result<SettlementReport>;

    async fn settlement_status(&self) -> Result<SettlementStatus>;
}
