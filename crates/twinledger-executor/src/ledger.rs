//! The Optimistic Executor state machine.
//!
//! Like the Authority ledger it is a plain `&mut self` struct with explicit
//! time, wrapped by [`crate::ExecutorService`] for concurrency and I/O.
//!
//! ## Action semantics
//!
//! Every action is zero-sum across accounts, so a snapshot of pending values
//! always forms a balanced batch:
//!
//! | Action          | Debit               | Credit                   |
//! |-----------------|---------------------|--------------------------|
//! | bet             | bettor `pending`    | house `pending`          |
//! | transfer        | sender `pending`    | recipient `pending`      |
//! | withdraw        | owner `pending`     | owner `pending_withdrawal` |
//! | payout          | house `pending`     | winner `pending`         |

use rust_decimal::Decimal;
use tracing::{debug, info, warn};
use twinledger_auth::{Authenticator, NonceBook, SigningKey, VerifiedEnvelope};
use twinledger_types::{
    ActionReceipt, Address, AuthorityBalance, BatchAck, ExecutorBalance, ExecutorPayload,
    LedgerError, LockId, NonceResponse, Result, SettlementBatch, SettlementStatus,
    SignedEnvelope,
};

use crate::batcher::Batcher;
use crate::book::HybridBook;

/// Outcome of applying a sync response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Confirmed balance overwritten.
    Applied,
    /// The response predates a batch already retired; nothing changed.
    Stale,
}

#[derive(Debug)]
pub struct ExecutorLedger {
    authenticator: Authenticator,
    nonces: NonceBook,
    book: HybridBook,
    batcher: Batcher,
    house: Address,
}

fn ensure_positive(amount: Decimal) -> Result<()> {
    if amount <= Decimal::ZERO {
        return Err(LedgerError::NonPositiveAmount(amount));
    }
    Ok(())
}

impl ExecutorLedger {
    /// New ledger with the house account registered.
    #[must_use]
    pub fn new(authenticator: Authenticator, house: Address) -> Self {
        let mut book = HybridBook::new();
        book.set_confirmed(&house, Decimal::ZERO, 0);
        Self {
            authenticator,
            nonces: NonceBook::new(),
            book,
            batcher: Batcher::new(),
            house,
        }
    }

    #[must_use]
    pub fn house(&self) -> &Address {
        &self.house
    }

    #[must_use]
    pub fn book(&self) -> &HybridBook {
        &self.book
    }

    #[must_use]
    pub fn is_registered(&self, address: &Address) -> bool {
        self.book.contains(address)
    }

    #[must_use]
    pub fn balance(&self, address: &Address) -> ExecutorBalance {
        self.book.balance(address, self.nonces.last_accepted(address))
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
        let verified = self.authenticator.verify(
            envelope,
            self.book.public_key(address),
            self.nonces.last_accepted(address),
            now,
        )?;
        if !self.book.contains(verified.address()) {
            return Err(LedgerError::UnknownAccount(verified.address().clone()));
        }
        Ok(verified)
    }

    /// Apply a signed bet, transfer or withdrawal to the pending balances.
    pub fn apply_action(&mut self, envelope: &SignedEnvelope, now: u64) -> Result<ActionReceipt> {
        let verified = self
            .authenticate(envelope, now)
            .inspect_err(|e| warn!(address = %envelope.wallet_address, error = %e, "action rejected"))?;
        let payload = verified.parse_payload::<ExecutorPayload>()?;
        let amount = payload.amount();
        ensure_positive(amount)?;
        let address = verified.address().clone();

        match &payload {
            ExecutorPayload::Bet {
                market_id, outcome, ..
            } => {
                self.book.debit(&address, amount)?;
                self.book.credit(&self.house, amount);
                debug!(address = %address, market = %market_id, outcome = %outcome, amount = %amount, "bet");
            }
            ExecutorPayload::ExecutorTransfer { to, .. } => {
                self.book.debit(&address, amount)?;
                self.book.credit(to, amount);
                debug!(from = %address, to = %to, amount = %amount, "executor transfer");
            }
            ExecutorPayload::Withdraw { .. } => {
                self.book.withdraw(&address, amount)?;
                info!(address = %address, amount = %amount, "withdrawal queued");
            }
        }
        self.book
            .register(&address, Some(verified.public_key()))?;
        self.nonces.commit(&verified)?;

        let balance = self.balance(&address);
        Ok(ActionReceipt {
            address,
            action: payload.kind().to_string(),
            amount,
            available: balance.available,
            pending_delta: balance.pending_delta,
            nonce: verified.nonce(),
        })
    }

    /// Credit a market-resolution payout, funded by the house.
    pub fn credit_payout(
        &mut self,
        address: &Address,
        market_id: &str,
        amount: Decimal,
    ) -> Result<ExecutorBalance> {
        ensure_positive(amount)?;
        let house = self.house.clone();
        self.book.debit(&house, amount)?;
        self.book.credit(address, amount);
        info!(address = %address, market = market_id, amount = %amount, "payout credited");
        Ok(self.balance(address))
    }

    /// Apply the Authority's view of `balance.address`.
    ///
    /// `credited` lists locks already counted in `executor_view`. They are
    /// recorded even when the view itself is stale.
    pub fn apply_sync(
        &mut self,
        balance: &AuthorityBalance,
        credited: &[LockId],
        now: u64,
    ) -> Result<SyncOutcome> {
        let address = &balance.address;
        let remote_sequence = balance.executor_batch_sequence;
        self.batcher.observe_remote_sequence(remote_sequence);
        for lock_id in credited {
            self.book.record_credit(address, *lock_id);
        }

        if remote_sequence < self.batcher.last_confirmed_sequence() {
            debug!(
                address = %address,
                remote_sequence,
                confirmed = self.batcher.last_confirmed_sequence(),
                "stale sync ignored"
            );
            return Ok(SyncOutcome::Stale);
        }
        // The view already includes the in-flight batch.
        self.batcher.confirm_through(&mut self.book, remote_sequence)?;

        self.book
            .register(address, balance.public_key.as_deref())?;
        self.book
            .set_confirmed(address, balance.executor_view, now);
        debug!(address = %address, confirmed = %balance.executor_view, "synced");
        Ok(SyncOutcome::Applied)
    }

    /// Remember that `lock_id` has been released to `address` on the layer.
    pub fn record_credit(&mut self, address: &Address, lock_id: LockId) {
        self.book.record_credit(address, lock_id);
    }

    // -----------------------------------------------------------------
    // Settlement
    // -----------------------------------------------------------------

    #[must_use]
    pub fn sequence_observed(&self) -> bool {
        self.batcher.sequence_observed()
    }

    pub fn observe_remote_sequence(&mut self, remote: u64) {
        self.batcher.observe_remote_sequence(remote);
    }

    /// Next batch to submit, signed with `key`.
    pub fn stage_batch(&mut self, key: &SigningKey, now: u64) -> Result<Option<SettlementBatch>> {
        self.batcher.stage(&self.book, key, now)
    }

    /// Retire the batch `ack` acknowledges. Idempotent.
    pub fn confirm_batch(&mut self, ack: &BatchAck) -> Result<bool> {
        self.batcher.confirm(&mut self.book, &ack.batch_id)
    }

    /// Drop a rejected in-flight batch; its deltas stay pending.
    pub fn abandon_batch(&mut self, batch: &SettlementBatch) -> bool {
        self.batcher.abandon(&batch.batch_id)
    }

    #[must_use]
    pub fn last_confirmed_sequence(&self) -> u64 {
        self.batcher.last_confirmed_sequence()
    }

    #[must_use]
    pub fn settlement_status(&self) -> SettlementStatus {
        self.batcher.status(&self.book)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use twinledger_auth::Wallet;
    use twinledger_auth::keys::test_signing_key;
    use twinledger_types::{BridgeLock, Layer, LockStatus};

    const NOW: u64 = 1_700_000_000;

    fn dec(n: i64) -> Decimal {
        Decimal::new(n, 0)
    }

    fn house() -> Address {
        Address::from("TL_HOUSE")
    }

    fn view(address: &Address, executor_view: i64, sequence: u64) -> AuthorityBalance {
        AuthorityBalance {
            executor_view: dec(executor_view),
            layer_balance: dec(executor_view),
            ..AuthorityBalance::empty(address.clone(), sequence)
        }
    }

    /// Ledger where wallet 1 has 100 confirmed.
    fn setup() -> (ExecutorLedger, Wallet) {
        let mut ledger = ExecutorLedger::new(Authenticator::default(), house());
        let wallet = Wallet::from_seed(1);
        ledger
            .apply_sync(&view(wallet.address(), 100, 0), &[], NOW)
            .unwrap();
        (ledger, wallet)
    }

    fn bet(wallet: &Wallet, amount: i64, nonce: u64) -> SignedEnvelope {
        wallet.sign_executor(
            &ExecutorPayload::Bet {
                market_id: "m-1".into(),
                outcome: "yes".into(),
                amount: dec(amount),
            },
            NOW,
            nonce,
        )
    }

    #[test]
    fn bet_moves_stake_to_house() {
        let (mut ledger, wallet) = setup();
        let receipt = ledger.apply_action(&bet(&wallet, 30, 1), NOW).unwrap();
        assert_eq!(receipt.action, "bet");
        assert_eq!(receipt.available, dec(70));
        assert_eq!(receipt.pending_delta, dec(-30));
        assert_eq!(ledger.balance(&house()).pending_delta, dec(30));
        assert_eq!(ledger.book().net_pending(), Decimal::ZERO);
    }

    #[test]
    fn overdraft_rejected_without_consuming_nonce() {
        let (mut ledger, wallet) = setup();
        let err = ledger.apply_action(&bet(&wallet, 101, 1), NOW).unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientBalance { .. }));
        assert_eq!(ledger.nonce(wallet.address()).nonce, 0);
        ledger.apply_action(&bet(&wallet, 100, 1), NOW).unwrap();
        assert_eq!(ledger.balance(wallet.address()).available, Decimal::ZERO);
    }

    #[test]
    fn unknown_account_rejected() {
        let mut ledger = ExecutorLedger::new(Authenticator::default(), house());
        let stranger = Wallet::from_seed(9);
        assert_eq!(
            ledger.apply_action(&bet(&stranger, 1, 1), NOW).unwrap_err(),
            LedgerError::UnknownAccount(stranger.address().clone())
        );
    }

    #[test]
    fn replay_rejected() {
        let (mut ledger, wallet) = setup();
        let env = bet(&wallet, 5, 1);
        ledger.apply_action(&env, NOW).unwrap();
        assert!(matches!(
            ledger.apply_action(&env, NOW),
            Err(LedgerError::NonceReplay { .. })
        ));
        assert_eq!(ledger.balance(wallet.address()).available, dec(95));
    }

    #[test]
    fn authority_payload_is_malformed_here() {
        let (mut ledger, wallet) = setup();
        let env = wallet.sign_authority(
            &twinledger_types::AuthorityPayload::Transfer {
                to: house(),
                amount: dec(1),
            },
            NOW,
            1,
        );
        assert!(matches!(
            ledger.apply_action(&env, NOW),
            Err(LedgerError::MalformedEnvelope { .. })
        ));
    }

    #[test]
    fn transfer_and_withdraw() {
        let (mut ledger, wallet) = setup();
        let friend = Address::from("TL_FRIEND");
        ledger
            .apply_action(
                &wallet.sign_executor(
                    &ExecutorPayload::ExecutorTransfer {
                        to: friend.clone(),
                        amount: dec(10),
                    },
                    NOW,
                    1,
                ),
                NOW,
            )
            .unwrap();
        let receipt = ledger
            .apply_action(
                &wallet.sign_executor(&ExecutorPayload::Withdraw { amount: dec(20) }, NOW, 2),
                NOW,
            )
            .unwrap();
        assert_eq!(receipt.action, "withdraw");
        assert_eq!(receipt.available, dec(70));
        let bal = ledger.balance(wallet.address());
        assert_eq!(bal.pending_withdrawal, dec(20));
        assert_eq!(ledger.balance(&friend).available, dec(10));
        assert_eq!(ledger.book().net_pending(), Decimal::ZERO);
    }

    #[test]
    fn payout_is_funded_by_house() {
        let (mut ledger, wallet) = setup();
        ledger.apply_action(&bet(&wallet, 40, 1), NOW).unwrap();
        let bal = ledger.credit_payout(wallet.address(), "m-1", dec(40)).unwrap();
        assert_eq!(bal.available, dec(100));
        assert_eq!(ledger.balance(&house()).available, Decimal::ZERO);
        assert!(ledger.credit_payout(wallet.address(), "m-1", dec(1)).is_err());
    }

    #[test]
    fn sync_preserves_pending() {
        let (mut ledger, wallet) = setup();
        ledger.apply_action(&bet(&wallet, 30, 1), NOW).unwrap();
        ledger
            .apply_sync(&view(wallet.address(), 150, 0), &[], NOW + 1)
            .unwrap();
        let bal = ledger.balance(wallet.address());
        assert_eq!(bal.confirmed_balance, dec(150));
        assert_eq!(bal.pending_delta, dec(-30));
        assert_eq!(bal.available, dec(120));
        assert_eq!(bal.last_synced_at, Some(NOW + 1));
    }

    #[test]
    fn batch_cycle_retires_snapshot() {
        let (mut ledger, wallet) = setup();
        let key = test_signing_key(200);
        ledger.apply_action(&bet(&wallet, 30, 1), NOW).unwrap();
        let batch = ledger.stage_batch(&key, NOW).unwrap().unwrap();
        ledger.apply_action(&bet(&wallet, 5, 2), NOW).unwrap();

        let ack = BatchAck {
            batch_id: batch.batch_id,
            sequence: batch.sequence,
            duplicate: false,
            applied_entries: batch.entries.len(),
        };
        assert!(ledger.confirm_batch(&ack).unwrap());
        assert!(!ledger.confirm_batch(&ack).unwrap());

        let bal = ledger.balance(wallet.address());
        assert_eq!(bal.confirmed_balance, dec(70));
        assert_eq!(bal.pending_delta, dec(-5));
        assert_eq!(bal.available, dec(65));
        assert_eq!(ledger.settlement_status().confirmed_batches, 1);
    }

    #[test]
    fn sync_after_remote_apply_retires_in_flight_once() {
        let (mut ledger, wallet) = setup();
        let key = test_signing_key(200);
        ledger.apply_action(&bet(&wallet, 30, 1), NOW).unwrap();
        let batch = ledger.stage_batch(&key, NOW).unwrap().unwrap();

        // Authority applied the batch; the ack was lost.
        ledger
            .apply_sync(&view(wallet.address(), 70, batch.sequence), &[], NOW)
            .unwrap();
        let bal = ledger.balance(wallet.address());
        assert_eq!(bal.confirmed_balance, dec(70));
        assert_eq!(bal.pending_delta, Decimal::ZERO);
        assert_eq!(bal.available, dec(70));

        // The late ack changes nothing.
        let ack = BatchAck {
            batch_id: batch.batch_id,
            sequence: batch.sequence,
            duplicate: true,
            applied_entries: 0,
        };
        assert!(!ledger.confirm_batch(&ack).unwrap());
        assert_eq!(ledger.balance(wallet.address()).available, dec(70));
    }

    #[test]
    fn stale_sync_ignored() {
        let (mut ledger, wallet) = setup();
        let key = test_signing_key(200);
        ledger.apply_action(&bet(&wallet, 30, 1), NOW).unwrap();
        let batch = ledger.stage_batch(&key, NOW).unwrap().unwrap();
        let ack = BatchAck {
            batch_id: batch.batch_id,
            sequence: batch.sequence,
            duplicate: false,
            applied_entries: 2,
        };
        ledger.confirm_batch(&ack).unwrap();

        // A read taken before the batch landed still shows 100.
        let outcome = ledger
            .apply_sync(&view(wallet.address(), 100, 0), &[], NOW)
            .unwrap();
        assert_eq!(outcome, SyncOutcome::Stale);
        assert_eq!(ledger.balance(wallet.address()).available, dec(70));
    }

    #[test]
    fn stale_sync_still_records_credits() {
        let (mut ledger, wallet) = setup();
        let key = test_signing_key(200);
        ledger.apply_action(&bet(&wallet, 30, 1), NOW).unwrap();
        let batch = ledger.stage_batch(&key, NOW).unwrap().unwrap();
        ledger
            .apply_sync(&view(wallet.address(), 70, batch.sequence), &[], NOW)
            .unwrap();

        let lock_id = LockId::new();
        let outcome = ledger
            .apply_sync(&view(wallet.address(), 95, 0), &[lock_id], NOW)
            .unwrap();
        assert_eq!(outcome, SyncOutcome::Stale);
        let bal = ledger.balance(wallet.address());
        assert_eq!(bal.available, dec(70));
        assert_eq!(bal.credited_locks, vec![lock_id]);
    }

    #[test]
    fn sync_records_credited_locks() {
        let (mut ledger, wallet) = setup();
        let mut lock = BridgeLock::dummy(dec(25), NOW);
        lock.target_address = wallet.address().clone();
        lock.target_layer = Layer::Executor;
        lock.status = LockStatus::SettlementVerified;
        let mut remote = view(wallet.address(), 100, 0);
        remote.executor_view = dec(125);
        remote.inbound_locks = vec![lock.clone()];
        ledger.apply_sync(&remote, &[lock.lock_id], NOW).unwrap();
        let bal = ledger.balance(wallet.address());
        assert_eq!(bal.available, dec(125));
        assert_eq!(bal.credited_locks, vec![lock.lock_id]);
    }
}
