//! Shared, clock-reading wrapper around [`AuthorityLedger`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, info};
use twinledger_types::{
    Address, AuthorityApi, AuthorityBalance, AuthorityConfig, BatchAck, BridgeId, BridgeLock,
    BridgeStats, LockId, LockReceipt, NonceResponse, RegisterResponse, ReleaseReceipt, Result,
    SettlementBatch, SettlementProof, SignatureCheck, SignedEnvelope, TransferReceipt,
    VerifySettlementResponse, unix_now,
};

use crate::ledger::AuthorityLedger;

/// The Authority ledger behind a single mutex.
///
/// Every operation takes the lock for its whole duration, so authentication,
/// the state transition and the nonce commit are one critical section.
/// The lock is never held across an `.await`.
#[derive(Debug)]
pub struct AuthorityService {
    ledger: Mutex<AuthorityLedger>,
}

impl AuthorityService {
    #[must_use]
    pub fn new(ledger: AuthorityLedger) -> Self {
        Self {
            ledger: Mutex::new(ledger),
        }
    }

    pub fn from_config(config: &AuthorityConfig) -> Result<Self> {
        AuthorityLedger::from_config(config).map(Self::new)
    }

    /// Run `f` against the ledger under the lock.
    pub fn with_ledger<T>(&self, f: impl FnOnce(&mut AuthorityLedger) -> T) -> T {
        f(&mut self.ledger.lock())
    }

    /// Expire stale locks now.
    pub fn sweep(&self) -> Vec<LockId> {
        self.ledger.lock().expire_stale_locks(unix_now())
    }

    /// Run [`Self::sweep`] every `period` until the task is aborted.
    pub fn spawn_expiry_sweeper(self: Arc<Self>, period: Duration) -> JoinHandle<()> {
        info!(period_secs = period.as_secs(), "lock expiry sweeper started");
        tokio::spawn(async move {
            let mut ticker = interval(period);
            loop {
                ticker.tick().await;
                let expired = self.sweep();
                if expired.is_empty() {
                    debug!("sweep: nothing to expire");
                } else {
                    info!(count = expired.len(), "sweep expired locks");
                }
            }
        })
    }
}

#[async_trait]
impl AuthorityApi for AuthorityService {
    async fn balance(&self, address: &Address) -> Result<AuthorityBalance> {
        Ok(self.ledger.lock().balance(address))
    }

    async fn nonce(&self, address: &Address) -> Result<NonceResponse> {
        Ok(self.ledger.lock().nonce(address))
    }

    async fn register_account(&self, public_key_hex: &str) -> Result<RegisterResponse> {
        self.ledger.lock().register_account(public_key_hex)
    }

    async fn transfer(&self, envelope: SignedEnvelope) -> Result<TransferReceipt> {
        self.ledger.lock().transfer(&envelope, unix_now())
    }

    async fn initiate_lock(&self, envelope: SignedEnvelope) -> Result<LockReceipt> {
        self.ledger.lock().initiate_lock(&envelope, unix_now())
    }

    async fn verify_settlement(&self, proof: SettlementProof) -> Result<VerifySettlementResponse> {
        self.ledger.lock().verify_settlement(&proof, unix_now())
    }

    async fn release(&self, lock_id: LockId) -> Result<ReleaseReceipt> {
        self.ledger.lock().release(lock_id, unix_now())
    }

    async fn verify_signature(&self, envelope: SignedEnvelope) -> Result<SignatureCheck> {
        Ok(self.ledger.lock().verify_signature(&envelope, unix_now()))
    }

    async fn bridge_stats(&self) -> Result<BridgeStats> {
        Ok(self.ledger.lock().bridge_stats())
    }

    async fn pending_locks(&self) -> Result<Vec<BridgeLock>> {
        Ok(self.ledger.lock().pending_locks())
    }

    async fn bridge_status(&self, bridge_id: BridgeId) -> Result<Option<BridgeLock>> {
        Ok(self.ledger.lock().bridge_status(&bridge_id))
    }

    async fn submit_batch(&self, batch: SettlementBatch) -> Result<BatchAck> {
        self.ledger.lock().apply_batch(&batch)
    }
}
