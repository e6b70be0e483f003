//! The Authority ledger state machine.
//!
//! `AuthorityLedger` is a plain `&mut self` struct: it takes the current time
//! explicitly and never blocks, so every operation is deterministic under
//! test. [`crate::AuthorityService`] wraps it in a mutex and reads the clock.
//!
//! ## Signed operations
//!
//! For every envelope the ledger runs, in one call:
//!
//! ```text
//! authenticate → parse payload → check amounts and balances → mutate → commit nonce
//! ```
//!
//! Every check precedes the first mutation, so a rejected operation leaves
//! balances, locks and the nonce book untouched.

use rust_decimal::Decimal;
use tracing::{debug, error, info, warn};
use twinledger_auth::{
    Authenticator, NonceBook, VerifiedEnvelope, VerifyingKey, verify_batch_signature,
    verify_settlement_proof, verifying_key_from_hex,
};
use twinledger_types::{
    Address, AuthorityBalance, AuthorityConfig, AuthorityPayload, BatchAck, BridgeId, BridgeLock,
    BridgeStats, GenesisAllocation, Layer, LedgerError, LockId, LockReceipt, LockStatus,
    NonceResponse, RegisterResponse, ReleaseReceipt, Result, SettlementBatch, SettlementProof,
    SignatureCheck, SignedEnvelope, TransferReceipt, VerifySettlementResponse, constants,
};

use crate::accounts::AccountBook;
use crate::batch_registry::{BatchCheck, BatchRegistry};
use crate::locks::LockBook;
use crate::supply::SupplyConservation;

/// Authoritative balances, escrow locks and settlement state.
#[derive(Debug)]
pub struct AuthorityLedger {
    authenticator: Authenticator,
    /// Key the Executor signs proofs and batches with. Without it, every
    /// proof and batch is rejected.
    executor_key: Option<VerifyingKey>,
    lock_ttl_secs: u64,
    accounts: AccountBook,
    nonces: NonceBook,
    locks: LockBook,
    batches: BatchRegistry,
    supply: SupplyConservation,
}

fn ensure_positive(amount: Decimal) -> Result<()> {
    if amount <= Decimal::ZERO {
        return Err(LedgerError::NonPositiveAmount(amount));
    }
    Ok(())
}

impl AuthorityLedger {
    #[must_use]
    pub fn new(
        authenticator: Authenticator,
        executor_key: Option<VerifyingKey>,
        lock_ttl_secs: u64,
    ) -> Self {
        Self {
            authenticator,
            executor_key,
            lock_ttl_secs,
            accounts: AccountBook::new(),
            nonces: NonceBook::new(),
            locks: LockBook::new(),
            batches: BatchRegistry::new(constants::BATCH_IDEMPOTENCY_CACHE_SIZE),
            supply: SupplyConservation::new(),
        }
    }

    /// Build a ledger from configuration, applying the genesis allocations.
    pub fn from_config(config: &AuthorityConfig) -> Result<Self> {
        let executor_key = if config.executor_public_key.is_empty() {
            warn!("no executor public key configured; settlement proofs and batches will be rejected");
            None
        } else {
            Some(
                verifying_key_from_hex(&config.executor_public_key)
                    .map_err(|e| LedgerError::Configuration(format!("executor_public_key: {e}")))?,
            )
        };
        let mut ledger = Self::new(
            Authenticator::new(config.max_skew_secs),
            executor_key,
            config.lock_ttl_secs,
        );
        for allocation in &config.genesis {
            ledger.apply_genesis(allocation)?;
        }
        info!(
            accounts = ledger.accounts.len(),
            supply = %ledger.supply.expected_supply(),
            "authority ledger initialised"
        );
        Ok(ledger)
    }

    fn apply_genesis(&mut self, allocation: &GenesisAllocation) -> Result<()> {
        if allocation.confirmed < Decimal::ZERO || allocation.layer < Decimal::ZERO {
            return Err(LedgerError::Configuration(format!(
                "genesis for {} has a negative amount",
                allocation.address
            )));
        }
        if let Some(public_key) = &allocation.public_key {
            let derived = Address::from_public_key_hex(public_key).ok_or_else(|| {
                LedgerError::Configuration(format!("genesis public key for {} is invalid", allocation.address))
            })?;
            if derived != allocation.address {
                return Err(LedgerError::Configuration(format!(
                    "genesis public key derives {derived}, not {}",
                    allocation.address
                )));
            }
        }
        self.accounts
            .register(&allocation.address, allocation.public_key.as_deref())?;
        if allocation.confirmed > Decimal::ZERO {
            self.deposit(&allocation.address, allocation.confirmed)?;
        }
        if allocation.layer > Decimal::ZERO {
            self.deposit_to_layer(&allocation.address, allocation.layer)?;
        }
        Ok(())
    }

    // -----------------------------------------------------------------
    // Accounts
    // -----------------------------------------------------------------

    /// Ensure an account exists for `public_key_hex`. Idempotent.
    pub fn register_account(&mut self, public_key_hex: &str) -> Result<RegisterResponse> {
        let key = verifying_key_from_hex(public_key_hex)?;
        let address = Address::from_public_key(&key.to_bytes());
        let public_key = public_key_hex.to_ascii_lowercase();
        let created = self.accounts.register(&address, Some(&public_key))?;
        if created {
            info!(address = %address, "account registered");
        }
        Ok(RegisterResponse {
            address,
            public_key,
            created,
        })
    }

    /// Issue `amount` into the confirmed balance of `address`.
    pub fn deposit(&mut self, address: &Address, amount: Decimal) -> Result<()> {
        ensure_positive(amount)?;
        self.accounts.credit_confirmed(address, amount);
        self.supply.record_issuance(amount);
        debug!(address = %address, amount = %amount, "deposit");
        Ok(())
    }

    /// Issue `amount` directly onto the Executor layer for `address`.
    pub fn deposit_to_layer(&mut self, address: &Address, amount: Decimal) -> Result<()> {
        ensure_positive(amount)?;
        self.accounts.credit_layer(address, amount);
        self.supply.record_layer_issuance(amount);
        debug!(address = %address, amount = %amount, "layer deposit");
        Ok(())
    }

    #[must_use]
    pub fn balance(&self, address: &Address) -> AuthorityBalance {
        let inbound: Vec<BridgeLock> = self
            .locks
            .open_inbound(address, Layer::Executor)
            .into_iter()
            .cloned()
            .collect();
        let verified: Decimal = inbound
            .iter()
            .filter(|l| l.status == LockStatus::SettlementVerified)
            .map(|l| l.amount)
            .sum();
        let layer_balance = self.accounts.layer(address);
        AuthorityBalance {
            address: address.clone(),
            confirmed_balance: self.accounts.confirmed(address),
            locked_outgoing: self.locks.locked_outgoing(address),
            layer_balance,
            executor_view: layer_balance + verified,
            inbound_locks: inbound,
            nonce: self.nonces.last_accepted(address),
            public_key: self.accounts.public_key(address).map(str::to_string),
            executor_batch_sequence: self.batches.last_sequence(),
        }
    }

    #[must_use]
    pub fn nonce(&self, address: &Address) -> NonceResponse {
        NonceResponse {
            address: address.clone(),
            nonce: self.nonces.last_accepted(address),
        }
    }

    fn authenticate(&self, envelope: &SignedEnvelope, now: u64) -> Result<VerifiedEnvelope> {
        let address = &envelope.wallet_address;
        self.authenticator
            .verify(
                envelope,
                self.accounts.public_key(address),
                self.nonces.last_accepted(address),
                now,
            )
            .inspect_err(|e| warn!(address = %address, error = %e, "envelope rejected"))
    }

    /// Bind the signer's key and consume its nonce. Last step of every
    /// signed operation.
    fn accept(&mut self, verified: &VerifiedEnvelope) -> Result<()> {
        self.accounts
            .register(verified.address(), Some(verified.public_key()))?;
        self.nonces.commit(verified)
    }

    /// Check an envelope without consuming its nonce.
    #[must_use]
    pub fn verify_signature(&self, envelope: &SignedEnvelope, now: u64) -> SignatureCheck {
        match self.authenticate(envelope, now) {
            Ok(verified) => SignatureCheck {
                valid: true,
                address: verified.address().clone(),
                reason: None,
            },
            Err(e) => SignatureCheck {
                valid: false,
                address: envelope.wallet_address.clone(),
                reason: Some(e.to_string()),
            },
        }
    }

    // -----------------------------------------------------------------
    // Transfers
    // -----------------------------------------------------------------

    /// Signed confirmed-balance transfer.
    pub fn transfer(&mut self, envelope: &SignedEnvelope, now: u64) -> Result<TransferReceipt> {
        let verified = self.authenticate(envelope, now)?;
        let AuthorityPayload::Transfer { to, amount } = verified.parse_payload::<AuthorityPayload>()? else {
            return Err(LedgerError::MalformedEnvelope {
                reason: "expected a transfer payload".into(),
            });
        };
        ensure_positive(amount)?;
        let from = verified.address().clone();

        self.accounts.debit_confirmed(&from, amount)?;
        self.accounts.credit_confirmed(&to, amount);
        self.accept(&verified)?;
        self.debug_check_supply();

        info!(from = %from, to = %to, amount = %amount, "transfer");
        Ok(TransferReceipt {
            from_balance: self.accounts.confirmed(&from),
            from,
            to,
            amount,
            nonce: verified.nonce(),
        })
    }

    // -----------------------------------------------------------------
    // Bridge escrow
    // -----------------------------------------------------------------

    /// Debit the signer and hold the amount in a new `Locked` lock.
    ///
    /// A `bridge_id` already used by the same source returns the existing
    /// lock (consuming the nonce, debiting nothing).
    pub fn initiate_lock(&mut self, envelope: &SignedEnvelope, now: u64) -> Result<LockReceipt> {
        let verified = self.authenticate(envelope, now)?;
        let AuthorityPayload::BridgeInitiate {
            target_address,
            amount,
            target_layer,
            bridge_id,
        } = verified.parse_payload::<AuthorityPayload>()?
        else {
            return Err(LedgerError::MalformedEnvelope {
                reason: "expected a bridge_initiate payload".into(),
            });
        };
        ensure_positive(amount)?;
        let source = verified.address().clone();

        if let Some(existing) = bridge_id.and_then(|id| self.locks.by_bridge(&id)) {
            if existing.source != source {
                return Err(LedgerError::SettlementMismatch {
                    lock_id: existing.lock_id,
                    reason: format!("{} belongs to another source", existing.bridge_id),
                });
            }
            let receipt = self.lock_receipt(existing, true);
            self.accept(&verified)?;
            info!(lock_id = %receipt.lock_id, bridge_id = %receipt.bridge_id, "bridge retry, returning existing lock");
            return Ok(receipt);
        }

        self.accounts.debit_confirmed(&source, amount)?;
        let lock = BridgeLock::new(
            bridge_id.unwrap_or_default(),
            source,
            target_address,
            target_layer,
            amount,
            now,
            self.lock_ttl_secs,
        );
        let receipt = self.lock_receipt(&lock, false);
        self.locks.insert(lock);
        self.accept(&verified)?;
        self.debug_check_supply();

        info!(
            lock_id = %receipt.lock_id,
            bridge_id = %receipt.bridge_id,
            source = %receipt.source,
            target = %receipt.target_address,
            layer = %receipt.target_layer,
            amount = %receipt.amount,
            "bridge lock created"
        );
        Ok(receipt)
    }

    fn lock_receipt(&self, lock: &BridgeLock, existing: bool) -> LockReceipt {
        LockReceipt {
            lock_id: lock.lock_id,
            bridge_id: lock.bridge_id,
            source: lock.source.clone(),
            target_address: lock.target_address.clone(),
            target_layer: lock.target_layer,
            amount: lock.amount,
            status: lock.status,
            source_balance: self.accounts.confirmed(&lock.source),
            expires_at: lock.expires_at,
            existing,
        }
    }

    /// Check an Executor-signed settlement proof and authorise release.
    pub fn verify_settlement(
        &mut self,
        proof: &SettlementProof,
        now: u64,
    ) -> Result<VerifySettlementResponse> {
        let lock_id = proof.lock_id;
        let lock = self
            .locks
            .get(&lock_id)
            .ok_or(LedgerError::UnknownLock(lock_id))?;
        let key = self
            .executor_key
            .as_ref()
            .ok_or_else(|| LedgerError::InvalidSignature {
                reason: "no executor key configured".into(),
            })?;
        verify_settlement_proof(proof, key)?;

        match lock.status {
            LockStatus::Released => return Err(LedgerError::AlreadyReleased(lock_id)),
            LockStatus::Expired => return Err(LedgerError::LockExpired(lock_id)),
            LockStatus::Locked | LockStatus::SettlementVerified => {}
        }
        if proof.amount != lock.amount {
            warn!(lock_id = %lock_id, proof = %proof.amount, locked = %lock.amount, "settlement amount mismatch");
            return Err(LedgerError::SettlementMismatch {
                lock_id,
                reason: format!("proof amount {} != locked amount {}", proof.amount, lock.amount),
            });
        }
        if proof.beneficiary != lock.target_address {
            warn!(lock_id = %lock_id, "settlement beneficiary mismatch");
            return Err(LedgerError::SettlementMismatch {
                lock_id,
                reason: format!(
                    "proof beneficiary {} != lock target {}",
                    proof.beneficiary, lock.target_address
                ),
            });
        }
        if lock.status == LockStatus::SettlementVerified {
            return Ok(VerifySettlementResponse {
                lock_id,
                release_authorized: true,
                status: LockStatus::SettlementVerified,
            });
        }
        if lock.is_past_ttl(now) {
            self.expire_lock(lock_id)?;
            return Err(LedgerError::LockExpired(lock_id));
        }

        let lock = self
            .locks
            .get_mut(&lock_id)
            .ok_or(LedgerError::UnknownLock(lock_id))?;
        lock.mark_verified(now)?;
        info!(lock_id = %lock_id, market = %proof.market_id, "settlement verified");
        Ok(VerifySettlementResponse {
            lock_id,
            release_authorized: true,
            status: lock.status,
        })
    }

    /// Credit the beneficiary of a verified lock. Exactly once.
    pub fn release(&mut self, lock_id: LockId, now: u64) -> Result<ReleaseReceipt> {
        let lock = self
            .locks
            .get(&lock_id)
            .ok_or(LedgerError::UnknownLock(lock_id))?;
        if lock.is_past_ttl(now) {
            self.expire_lock(lock_id)?;
            return Err(LedgerError::LockExpired(lock_id));
        }

        let lock = self
            .locks
            .get_mut(&lock_id)
            .ok_or(LedgerError::UnknownLock(lock_id))?;
        lock.mark_released(now)?;
        let beneficiary = lock.target_address.clone();
        let (amount, layer) = (lock.amount, lock.target_layer);
        match layer {
            Layer::Authority => self.accounts.credit_confirmed(&beneficiary, amount),
            Layer::Executor => self.accounts.credit_layer(&beneficiary, amount),
        }
        self.debug_check_supply();

        info!(lock_id = %lock_id, beneficiary = %beneficiary, amount = %amount, layer = %layer, "bridge lock released");
        Ok(ReleaseReceipt {
            lock_id,
            beneficiary,
            amount,
            layer,
            released_at: now,
        })
    }

    fn expire_lock(&mut self, lock_id: LockId) -> Result<()> {
        let lock = self
            .locks
            .get_mut(&lock_id)
            .ok_or(LedgerError::UnknownLock(lock_id))?;
        lock.mark_expired()?;
        let (source, amount) = (lock.source.clone(), lock.amount);
        self.accounts.credit_confirmed(&source, amount);
        self.debug_check_supply();
        warn!(lock_id = %lock_id, source = %source, amount = %amount, "bridge lock expired, source refunded");
        Ok(())
    }

    /// Expire every unverified lock past its TTL, refunding the sources.
    pub fn expire_stale_locks(&mut self, now: u64) -> Vec<LockId> {
        self.locks
            .stale(now)
            .into_iter()
            .filter(|id| self.expire_lock(*id).is_ok())
            .collect()
    }

    #[must_use]
    pub fn bridge_stats(&self) -> BridgeStats {
        self.locks.stats()
    }

    #[must_use]
    pub fn pending_locks(&self) -> Vec<BridgeLock> {
        self.locks.open()
    }

    #[must_use]
    pub fn bridge_status(&self, bridge_id: &BridgeId) -> Option<BridgeLock> {
        self.locks.by_bridge(bridge_id).cloned()
    }

    #[must_use]
    pub fn lock(&self, lock_id: &LockId) -> Option<&BridgeLock> {
        self.locks.get(lock_id)
    }

    // -----------------------------------------------------------------
    // Settlement
    // -----------------------------------------------------------------

    /// Apply an Executor settlement batch, all entries or none.
    pub fn apply_batch(&mut self, batch: &SettlementBatch) -> Result<BatchAck> {
        let key = self
            .executor_key
            .as_ref()
            .ok_or_else(|| LedgerError::InvalidSignature {
                reason: "no executor key configured".into(),
            })?;
        verify_batch_signature(batch, key)?;

        if self.batches.check(batch)? == BatchCheck::Duplicate {
            info!(batch_id = %batch.batch_id, sequence = batch.sequence, "duplicate batch acknowledged");
            return Ok(BatchAck {
                batch_id: batch.batch_id,
                sequence: batch.sequence,
                duplicate: true,
                applied_entries: 0,
            });
        }
        if !batch.is_balanced() {
            return Err(LedgerError::UnbalancedBatch {
                batch_id: batch.batch_id,
                net: batch.net(),
            });
        }

        let failed: Vec<Address> = batch
            .entries
            .iter()
            .filter(|e| {
                e.withdrawal < Decimal::ZERO
                    || !self.accounts.can_apply_layer_delta(&e.address, e.delta)
            })
            .map(|e| e.address.clone())
            .collect();
        if !failed.is_empty() {
            warn!(batch_id = %batch.batch_id, failed = failed.len(), "batch rejected");
            return Err(LedgerError::PartialBatchFailure {
                batch_id: batch.batch_id,
                failed,
            });
        }

        for entry in &batch.entries {
            self.accounts.apply_layer_delta(&entry.address, entry.delta)?;
            if entry.withdrawal > Decimal::ZERO {
                self.accounts.credit_confirmed(&entry.address, entry.withdrawal);
            }
        }
        self.batches.record(batch);
        self.verify_supply()?;

        info!(
            batch_id = %batch.batch_id,
            sequence = batch.sequence,
            entries = batch.entries.len(),
            withdrawn = %batch.total_withdrawal(),
            "settlement batch applied"
        );
        Ok(BatchAck {
            batch_id: batch.batch_id,
            sequence: batch.sequence,
            duplicate: false,
            applied_entries: batch.entries.len(),
        })
    }

    #[must_use]
    pub fn last_batch_sequence(&self) -> u64 {
        self.batches.last_sequence()
    }

    /// `Σ confirmed + Σ layer + Σ open locks == Σ issued`.
    pub fn verify_supply(&self) -> Result<()> {
        let actual =
            self.accounts.total_confirmed() + self.accounts.total_layer() + self.locks.open_total();
        self.supply
            .verify(actual)
            .inspect_err(|e| error!(error = %e, "SUPPLY INVARIANT VIOLATED"))
    }

    /// Conservation check after every balance mutation in debug builds.
    fn debug_check_supply(&self) {
        debug_assert!(self.verify_supply().is_ok(), "supply conservation broken");
    }
}
