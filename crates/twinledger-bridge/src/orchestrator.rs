//! The auto-bridge orchestrator.
//!
//! Before an Executor action that needs `A`, [`AutoBridge`] makes sure the
//! actor's available Executor balance covers it, pulling the deficit across
//! from the Authority when it does not:
//!
//! ```text
//!   sync ──► remaining = max(0, A - available) - in_transit
//!              │ 0                     │ > 0
//!              ▼                       ▼
//!           action        authority.balance ≥ remaining? ── no ──► InsufficientFunds
//!                                      │ yes
//!                                      ▼
//!                             initiate_lock(bridge_id)
//!                                      │
//!                                      ▼
//!                          poll sync until credited ── exhausted ──► BridgePending
//!                                      │
//!                                      ▼
//!                                   action
//! ```
//!
//! Locks created here stay tracked until the Executor reports them credited
//! or they expire, so a retried call never bridges the same deficit twice.

use std::sync::Arc;

use parking_lot::Mutex;
use rust_decimal::Decimal;
use tracing::{debug, info, warn};
use twinledger_auth::Wallet;
use twinledger_executor::with_retry;
use twinledger_types::{
    ActionReceipt, Address, AuthorityApi, AuthorityPayload, BridgeConfig, BridgeId,
    ExecutorApi, ExecutorBalance, ExecutorPayload, Layer, LedgerError, Result, unix_now,
};

use crate::tracker::{PendingBridges, TrackedBridge};

/// What [`AutoBridge::ensure_funds`] had to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Funding {
    /// Executor balance after funding.
    pub balance: ExecutorBalance,
    /// The lock created by this call, if any.
    pub bridged: Option<TrackedBridge>,
}

pub struct AutoBridge {
    authority: Arc<dyn AuthorityApi>,
    executor: Arc<dyn ExecutorApi>,
    config: BridgeConfig,
    pending: Mutex<PendingBridges>,
}

impl std::fmt::Debug for AutoBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AutoBridge")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl AutoBridge {
    #[must_use]
    pub fn new(
        authority: Arc<dyn AuthorityApi>,
        executor: Arc<dyn ExecutorApi>,
        config: BridgeConfig,
    ) -> Self {
        Self {
            authority,
            executor,
            config,
            pending: Mutex::new(PendingBridges::new()),
        }
    }

    /// Bridges created for `address` that the Executor has not credited yet.
    #[must_use]
    pub fn pending_for(&self, address: &Address) -> Vec<TrackedBridge> {
        self.pending.lock().get(address).to_vec()
    }

    async fn sync(&self, address: &Address) -> Result<ExecutorBalance> {
        let executor = &self.executor;
        with_retry(&self.config.retry, "executor.sync", move || executor.sync(address)).await
    }

    /// Forget bridges the Executor has credited or that expired.
    fn prune(&self, balance: &ExecutorBalance) {
        let dropped =
            self.pending
                .lock()
                .prune(&balance.address, &balance.credited_locks, unix_now());
        if dropped > 0 {
            debug!(address = %balance.address, dropped, "pending bridges settled");
        }
    }

    /// Make the Executor's available balance for `wallet` cover `required`,
    /// bridging from the Authority if needed.
    pub async fn ensure_funds(&self, wallet: &Wallet, required: Decimal) -> Result<Funding> {
        let address = wallet.address();
        if required <= Decimal::ZERO {
            return Err(LedgerError::NonPositiveAmount(required));
        }

        let balance = self.sync(address).await?;
        self.prune(&balance);
        if balance.available >= required {
            return Ok(Funding {
                balance,
                bridged: None,
            });
        }

        let deficit = required - balance.available;
        let in_transit = self.pending.lock().in_transit(address);
        let remaining = deficit - in_transit;

        let bridged = if remaining > Decimal::ZERO {
            let authority = &self.authority;
            let remote = with_retry(&self.config.retry, "authority.balance", move || {
                authority.balance(address)
            })
            .await?;
            if remote.confirmed_balance < remaining {
                warn!(
                    address = %address,
                    required = %required,
                    executor_available = %balance.available,
                    authority_balance = %remote.confirmed_balance,
                    in_transit = %in_transit,
                    "cannot cover action on either layer"
                );
                return Err(LedgerError::InsufficientFunds {
                    address: address.clone(),
                    required,
                    executor_available: balance.available,
                    authority_balance: remote.confirmed_balance,
                    deficit,
                });
            }
            let tracked = self.initiate(wallet, remaining).await?;
            self.pending.lock().track(address, tracked.clone());
            Some(tracked)
        } else {
            debug!(address = %address, in_transit = %in_transit, "deficit already in transit");
            None
        };

        self.await_credit(address, required, bridged).await
    }

    /// Lock `amount` towards the Executor under a fresh bridge id.
    ///
    /// A network failure may hide a lock the Authority did create, so the
    /// bridge id is looked up before the envelope is re-signed.
    async fn initiate(&self, wallet: &Wallet, amount: Decimal) -> Result<TrackedBridge> {
        let address = wallet.address();
        let bridge_id = BridgeId::new();
        let payload = AuthorityPayload::BridgeInitiate {
            target_address: address.clone(),
            amount,
            target_layer: Layer::Executor,
            bridge_id: Some(bridge_id),
        };
        let policy = self.config.retry;
        let attempts = policy.max_attempts.max(1);
        let authority = &self.authority;

        let mut attempt = 0;
        loop {
            let nonce = with_retry(&policy, "authority.nonce", move || authority.nonce(address))
                .await?
                .next();
            let envelope = wallet.sign_authority(&payload, unix_now(), nonce);
            let err = match self.authority.initiate_lock(envelope).await {
                Ok(receipt) => {
                    info!(
                        bridge_id = %receipt.bridge_id,
                        lock_id = %receipt.lock_id,
                        address = %address,
                        amount = %amount,
                        "auto-bridge lock initiated"
                    );
                    return Ok(TrackedBridge::from(&receipt));
                }
                Err(e) if e.is_retryable() => e,
                Err(e) => return Err(e),
            };

            if let Ok(Some(lock)) = self.authority.bridge_status(bridge_id).await {
                info!(bridge_id = %bridge_id, lock_id = %lock.lock_id, "lock found after lost response");
                return Ok(TrackedBridge::from(&lock));
            }

            attempt += 1;
            if attempt >= attempts {
                return Err(err);
            }
            let delay = policy.delay_for(attempt - 1);
            warn!(bridge_id = %bridge_id, attempt, error = %err, "retrying bridge initiation");
            tokio::time::sleep(delay).await;
        }
    }

    /// Poll `sync` until `available ≥ required` and the new lock, if any, is
    /// credited.
    async fn await_credit(
        &self,
        address: &Address,
        required: Decimal,
        bridged: Option<TrackedBridge>,
    ) -> Result<Funding> {
        let poll = self.config.poll;
        for attempt in 0..poll.attempts.max(1) {
            if attempt > 0 {
                tokio::time::sleep(poll.interval()).await;
            }
            let balance = self.sync(address).await?;
            self.prune(&balance);
            let credited = bridged
                .as_ref()
                .is_none_or(|b| balance.credited_locks.contains(&b.lock_id));
            if credited && balance.available >= required {
                return Ok(Funding { balance, bridged });
            }
        }

        let waiting = bridged.or_else(|| self.pending.lock().oldest(address).cloned());
        match waiting {
            Some(b) => {
                warn!(bridge_id = %b.bridge_id, lock_id = %b.lock_id, "bridge credit still pending");
                Err(LedgerError::BridgePending {
                    bridge_id: b.bridge_id,
                    lock_id: b.lock_id,
                })
            }
            // Nothing in transit: the balance dropped while we waited.
            None => {
                let balance = self.sync(address).await?;
                Err(LedgerError::InsufficientBalance {
                    address: address.clone(),
                    needed: required,
                    available: balance.available,
                })
            }
        }
    }

    /// Fund and apply `payload` for `wallet` on the Executor.
    pub async fn execute(
        &self,
        wallet: &Wallet,
        payload: &ExecutorPayload,
    ) -> Result<ActionReceipt> {
        let funding = self.ensure_funds(wallet, payload.amount()).await?;
        let nonce = funding.balance.nonce.saturating_add(1);
        let envelope = wallet.sign_executor(payload, unix_now(), nonce);
        let receipt = self.executor.apply_action(envelope).await?;
        info!(
            address = %receipt.address,
            action = %receipt.action,
            amount = %receipt.amount,
            bridged = funding.bridged.is_some(),
            "action applied"
        );
        Ok(receipt)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;
    use twinledger_types::{
        LockId, LockReceipt, NonceResponse, PollPolicy, RetryPolicy, SettlementReport,
        SettlementStatus, SignedEnvelope,
    };

    use super::*;

    /// An Executor that never sees any funds arrive.
    struct DryExecutor {
        syncs: AtomicU32,
    }

    #[async_trait]
    impl ExecutorApi for DryExecutor {
        async fn apply_action(&self, _envelope: SignedEnvelope) -> Result<ActionReceipt> {
            Err(LedgerError::Internal("not expected".into()))
        }
        async fn balance(&self, address: &Address) -> Result<ExecutorBalance> {
            Ok(empty(address))
        }
        async fn nonce(&self, address: &Address) -> Result<NonceResponse> {
            Ok(NonceResponse {
                address: address.clone(),
                nonce: 0,
            })
        }
        async fn sync(&self, address: &Address) -> Result<ExecutorBalance> {
            self.syncs.fetch_add(1, Ordering::SeqCst);
            Ok(empty(address))
        }
        async fn settle(&self) -> Result<SettlementReport> {
            Err(LedgerError::Internal("not expected".into()))
        }
        async fn settlement_status(&self) -> Result<SettlementStatus> {
            Err(LedgerError::Internal("not expected".into()))
        }
    }

    fn empty(address: &Address) -> ExecutorBalance {
        ExecutorBalance {
            address: address.clone(),
            confirmed_balance: Decimal::ZERO,
            pending_delta: Decimal::ZERO,
            pending_withdrawal: Decimal::ZERO,
            available: Decimal::ZERO,
            nonce: 0,
            credited_locks: Vec::<LockId>::new(),
            last_synced_at: None,
        }
    }

    /// An Authority no test should reach.
    struct Unreachable;

    #[async_trait]
    impl AuthorityApi for Unreachable {
        async fn balance(&self, _: &Address) -> Result<twinledger_types::AuthorityBalance> {
            Err(down())
        }
        async fn nonce(&self, _: &Address) -> Result<NonceResponse> {
            Err(down())
        }
        async fn register_account(&self, _: &str) -> Result<twinledger_types::RegisterResponse> {
            Err(down())
        }
        async fn transfer(&self, _: SignedEnvelope) -> Result<twinledger_types::TransferReceipt> {
            Err(down())
        }
        async fn initiate_lock(&self, _: SignedEnvelope) -> Result<LockReceipt> {
            Err(down())
        }
        async fn verify_settlement(
            &self,
            _: twinledger_types::SettlementProof,
        ) -> Result<twinledger_types::VerifySettlementResponse> {
            Err(down())
        }
        async fn release(&self, _: LockId) -> Result<twinledger_types::ReleaseReceipt> {
            Err(down())
        }
        async fn verify_signature(
            &self,
            _: SignedEnvelope,
        ) -> Result<twinledger_types::SignatureCheck> {
            Err(down())
        }
        async fn bridge_stats(&self) -> Result<twinledger_types::BridgeStats> {
            Err(down())
        }
        async fn pending_locks(&self) -> Result<Vec<twinledger_types::BridgeLock>> {
            Err(down())
        }
        async fn bridge_status(
            &self,
            _: BridgeId,
        ) -> Result<Option<twinledger_types::BridgeLock>> {
            Err(down())
        }
        async fn submit_batch(
            &self,
            _: twinledger_types::SettlementBatch,
        ) -> Result<twinledger_types::BatchAck> {
            Err(down())
        }
    }

    fn down() -> LedgerError {
        LedgerError::Unreachable {
            endpoint: "http://authority".into(),
            reason: "connection refused".into(),
        }
    }

    fn bridge(executor: Arc<DryExecutor>) -> AutoBridge {
        AutoBridge::new(
            Arc::new(Unreachable),
            executor,
            BridgeConfig {
                retry: RetryPolicy::immediate(2),
                poll: PollPolicy {
                    attempts: 3,
                    interval_ms: 0,
                },
            },
        )
    }

    #[tokio::test]
    async fn non_positive_requirement_is_rejected() {
        let executor = Arc::new(DryExecutor {
            syncs: AtomicU32::new(0),
        });
        let auto = bridge(Arc::clone(&executor));
        let wallet = Wallet::from_seed(1);
        let err = auto.ensure_funds(&wallet, Decimal::ZERO).await.unwrap_err();
        assert_eq!(err, LedgerError::NonPositiveAmount(Decimal::ZERO));
        assert_eq!(executor.syncs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn in_transit_bridge_is_not_repeated() {
        let executor = Arc::new(DryExecutor {
            syncs: AtomicU32::new(0),
        });
        let auto = bridge(Arc::clone(&executor));
        let wallet = Wallet::from_seed(1);
        let tracked = TrackedBridge {
            bridge_id: BridgeId::new(),
            lock_id: LockId::new(),
            amount: Decimal::new(50, 0),
            expires_at: unix_now() + 3_600,
        };
        auto.pending.lock().track(wallet.address(), tracked.clone());

        // The Authority is down: any attempt to bridge again would fail
        // with Unreachable instead of BridgePending.
        let err = auto
            .ensure_funds(&wallet, Decimal::new(50, 0))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            LedgerError::BridgePending {
                bridge_id: tracked.bridge_id,
                lock_id: tracked.lock_id,
            }
        );
        assert_eq!(auto.pending_for(wallet.address()), vec![tracked]);
        // Initial sync plus three polls.
        assert_eq!(executor.syncs.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn expired_bridges_no_longer_count() {
        let executor = Arc::new(DryExecutor {
            syncs: AtomicU32::new(0),
        });
        let auto = bridge(executor);
        let wallet = Wallet::from_seed(1);
        auto.pending.lock().track(
            wallet.address(),
            TrackedBridge {
                bridge_id: BridgeId::new(),
                lock_id: LockId::new(),
                amount: Decimal::new(50, 0),
                expires_at: 1,
            },
        );

        // With the expired bridge dropped the full deficit needs the
        // Authority, which is down.
        let err = auto
            .ensure_funds(&wallet, Decimal::new(50, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Unreachable { .. }));
        assert!(auto.pending_for(wallet.address()).is_empty());
    }
}
