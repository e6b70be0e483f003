//! The Executor service: ledger behind a mutex, plus everything that talks
//! to the Authority.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, error, info, warn};
use twinledger_auth::{
    Authenticator, SigningKey, public_key_hex, sign_settlement_proof, signing_key_from_hex,
};
use twinledger_types::{
    ActionReceipt, Address, AuthorityApi, AuthorityBalance, BridgeLock, ErrorClass,
    ExecutorApi, ExecutorBalance, ExecutorConfig, Layer, LedgerError, LockId, LockStatus,
    NonceResponse, Result, RetryPolicy, SettlementProof, SettlementReport, SettlementStatus,
    SignedEnvelope, unix_now,
};

use crate::batcher::gross_volume;
use crate::ledger::ExecutorLedger;
use crate::retry::with_retry;

/// Market id carried by proofs for bridge credits.
pub const BRIDGE_MARKET_ID: &str = "bridge";
const BRIDGE_OUTCOME: &str = "credit";

/// A definitive rejection: the batch was not applied and never will be.
fn is_batch_rejection(e: &LedgerError) -> bool {
    matches!(e.class(), ErrorClass::Settlement | ErrorClass::Authentication)
}

pub struct ExecutorService {
    ledger: Mutex<ExecutorLedger>,
    authority: Arc<dyn AuthorityApi>,
    /// Signs settlement proofs and batches.
    signing_key: SigningKey,
    retry: RetryPolicy,
    /// One settlement cycle at a time.
    settle_guard: tokio::sync::Mutex<()>,
}

impl std::fmt::Debug for ExecutorService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutorService")
            .field("public_key", &self.public_key_hex())
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl ExecutorService {
    #[must_use]
    pub fn new(
        ledger: ExecutorLedger,
        authority: Arc<dyn AuthorityApi>,
        signing_key: SigningKey,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            ledger: Mutex::new(ledger),
            authority,
            signing_key,
            retry,
            settle_guard: tokio::sync::Mutex::new(()),
        }
    }

    pub fn from_config(config: &ExecutorConfig, authority: Arc<dyn AuthorityApi>) -> Result<Self> {
        if config.signing_key_hex.is_empty() {
            return Err(LedgerError::Configuration(
                "executor signing_key_hex is required".into(),
            ));
        }
        let signing_key = signing_key_from_hex(&config.signing_key_hex)?;
        let ledger = ExecutorLedger::new(
            Authenticator::new(config.max_skew_secs),
            config.house_address.clone(),
        );
        let service = Self::new(ledger, authority, signing_key, config.retry);
        info!(
            public_key = %service.public_key_hex(),
            house = %config.house_address,
            "executor initialised"
        );
        Ok(service)
    }

    /// Hex key the Authority must be configured with.
    #[must_use]
    pub fn public_key_hex(&self) -> String {
        public_key_hex(&self.signing_key)
    }

    pub fn with_ledger<T>(&self, f: impl FnOnce(&mut ExecutorLedger) -> T) -> T {
        f(&mut self.ledger.lock())
    }

    /// Credit a market-resolution payout from the house account.
    pub fn credit_payout(
        &self,
        address: &Address,
        market_id: &str,
        amount: Decimal,
    ) -> Result<ExecutorBalance> {
        self.ledger.lock().credit_payout(address, market_id, amount)
    }

    async fn fetch_balance(&self, address: &Address) -> Result<AuthorityBalance> {
        let authority = &self.authority;
        with_retry(&self.retry, "authority.balance", move || authority.balance(address)).await
    }

    // -----------------------------------------------------------------
    // Bridge credits
    // -----------------------------------------------------------------

    /// Verify and release one inbound lock.
    async fn finalize_lock(&self, lock: &BridgeLock) -> Result<()> {
        let authority = &self.authority;
        let lock_id = lock.lock_id;

        if lock.status == LockStatus::Locked {
            let origin_height = self.ledger.lock().last_confirmed_sequence();
            let mut proof = SettlementProof {
                lock_id,
                market_id: BRIDGE_MARKET_ID.into(),
                outcome: BRIDGE_OUTCOME.into(),
                beneficiary: lock.target_address.clone(),
                amount: lock.amount,
                origin_height,
                origin_signature: String::new(),
            };
            sign_settlement_proof(&mut proof, &self.signing_key);
            with_retry(&self.retry, "authority.verify_settlement", move || {
                authority.verify_settlement(proof.clone())
            })
            .await?;
        }

        match with_retry(&self.retry, "authority.release", move || authority.release(lock_id)).await {
            Ok(receipt) => {
                info!(lock_id = %lock_id, beneficiary = %receipt.beneficiary, amount = %receipt.amount, "bridge credit finalised");
                Ok(())
            }
            Err(LedgerError::AlreadyReleased(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Finalise every open Executor-layer lock targeting a known account.
    ///
    /// Released locks drop out of the Authority's inbound list, so each one is
    /// recorded as credited here; the next sync picks up the amount.
    pub async fn finalize_bridge_credits(&self) -> Result<usize> {
        let authority = &self.authority;
        let pending =
            with_retry(&self.retry, "authority.pending_locks", move || authority.pending_locks())
                .await?;

        let mut finalized = 0;
        for lock in pending.iter().filter(|l| l.target_layer == Layer::Executor) {
            let known = self.ledger.lock().is_registered(&lock.target_address);
            if !known {
                continue;
            }
            match self.finalize_lock(lock).await {
                Ok(()) => {
                    self.ledger
                        .lock()
                        .record_credit(&lock.target_address, lock.lock_id);
                    finalized += 1;
                }
                Err(e) => warn!(lock_id = %lock.lock_id, error = %e, "bridge credit not finalised"),
            }
        }
        Ok(finalized)
    }

    // -----------------------------------------------------------------
    // Sync
    // -----------------------------------------------------------------

    /// Finalise inbound locks for `address`, then mirror the Authority's
    /// executor view into the confirmed balance.
    pub async fn sync_from_l1(&self, address: &Address) -> Result<ExecutorBalance> {
        let before = self.fetch_balance(address).await?;

        let mut credited: Vec<LockId> = Vec::new();
        for lock in &before.inbound_locks {
            match self.finalize_lock(lock).await {
                Ok(()) => credited.push(lock.lock_id),
                Err(e) => warn!(lock_id = %lock.lock_id, error = %e, "bridge credit not finalised"),
            }
        }

        let after = if before.inbound_locks.is_empty() {
            before
        } else {
            self.fetch_balance(address).await?
        };
        credited.extend(
            after
                .inbound_locks
                .iter()
                .filter(|l| l.status == LockStatus::SettlementVerified)
                .map(|l| l.lock_id),
        );

        let mut ledger = self.ledger.lock();
        ledger.apply_sync(&after, &credited, unix_now())?;
        Ok(ledger.balance(address))
    }

    // -----------------------------------------------------------------
    // Settlement
    // -----------------------------------------------------------------

    /// One settlement cycle: finalise bridge credits, then submit the
    /// in-flight batch or a fresh snapshot.
    pub async fn settle_to_l1(&self) -> Result<SettlementReport> {
        let _cycle = self.settle_guard.lock().await;

        let bridges_finalized = match self.finalize_bridge_credits().await {
            Ok(n) => n,
            Err(e) => {
                warn!(error = %e, "could not finalise bridge credits");
                0
            }
        };

        let observed = self.ledger.lock().sequence_observed();
        if !observed {
            let house = self.ledger.lock().house().clone();
            let remote = self.fetch_balance(&house).await?;
            self.ledger.lock().apply_sync(&remote, &[], unix_now())?;
        }

        let staged = self
            .ledger
            .lock()
            .stage_batch(&self.signing_key, unix_now())?;
        let Some(batch) = staged else {
            debug!("nothing to settle");
            return Ok(SettlementReport {
                batch_id: None,
                sequence: None,
                entries: 0,
                duplicate: false,
                settled_volume: Decimal::ZERO,
                withdrawn: Decimal::ZERO,
                bridges_finalized,
            });
        };

        let authority = &self.authority;
        let submit = batch.clone();
        let result = with_retry(&self.retry, "authority.submit_batch", move || {
            authority.submit_batch(submit.clone())
        })
        .await;

        match result {
            Ok(ack) => {
                self.ledger.lock().confirm_batch(&ack)?;
                info!(
                    batch_id = %ack.batch_id,
                    sequence = ack.sequence,
                    duplicate = ack.duplicate,
                    "settled to authority"
                );
                Ok(SettlementReport {
                    batch_id: Some(batch.batch_id),
                    sequence: Some(batch.sequence),
                    entries: batch.entries.len(),
                    duplicate: ack.duplicate,
                    settled_volume: gross_volume(&batch),
                    withdrawn: batch.total_withdrawal(),
                    bridges_finalized,
                })
            }
            Err(e) if is_batch_rejection(&e) => {
                error!(batch_id = %batch.batch_id, error = %e, "settlement batch rejected");
                self.ledger.lock().abandon_batch(&batch);
                Err(e)
            }
            Err(e) => {
                warn!(batch_id = %batch.batch_id, error = %e, "settlement batch left in flight");
                Err(e)
            }
        }
    }

    #[must_use]
    pub fn settlement_status(&self) -> SettlementStatus {
        self.ledger.lock().settlement_status()
    }

    /// Run [`Self::settle_to_l1`] every `period` until the task is aborted.
    pub fn spawn_settle_loop(self: Arc<Self>, period: Duration) -> JoinHandle<()> {
        info!(period_secs = period.as_secs(), "settlement loop started");
        tokio::spawn(async move {
            let mut ticker = interval(period);
            loop {
                ticker.tick().await;
                match self.settle_to_l1().await {
                    Ok(report) if report.batch_id.is_some() => {
                        debug!(entries = report.entries, "settlement cycle done");
                    }
                    Ok(_) => {}
                    Err(e) => warn!(error = %e, "settlement cycle failed"),
                }
            }
        })
    }
}

#[async_trait]
impl ExecutorApi for ExecutorService {
    async fn apply_action(&self, envelope: SignedEnvelope) -> Result<ActionReceipt> {
        self.ledger.lock().apply_action(&envelope, unix_now())
    }

    async fn balance(&self, address: &Address) -> Result<ExecutorBalance> {
        Ok(self.ledger.lock().balance(address))
    }

    async fn nonce(&self, address: &Address) -> Result<NonceResponse> {
        Ok(self.ledger.lock().nonce(address))
    }

    async fn sync(&self, address: &Address) -> Result<ExecutorBalance> {
        self.sync_from_l1(address).await
    }

    async fn settle(&self) -> Result<SettlementReport> {
        self.settle_to_l1().await
    }

    async fn settlement_status(&self) -> Result<SettlementStatus> {
        Ok(ExecutorService::settlement_status(self))
    }
}
