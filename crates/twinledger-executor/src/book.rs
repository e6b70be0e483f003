//! Hybrid confirmed + pending balances.
//!
//! The [`HybridBook`] tracks, per address:
//! - **Confirmed**: mirror of the Authority's executor view as of the last sync
//! - **Pending delta**: net of applied but not yet settled actions
//! - **Pending withdrawal**: value leaving the layer in the next batch
//!
//! The lifecycle of a bet:
//! 1. `debit` → bettor's pending delta decreases, house's increases
//! 2. `snapshot` → non-zero deltas are copied into a settlement batch
//! 3. `retire` → once the Authority acknowledges, the snapshotted part moves
//!    from pending into confirmed
//! 4. `set_confirmed` → a later sync overwrites confirmed with the Authority's view
//!
//! `available = confirmed + pending_delta` never goes negative.

use std::collections::{HashMap, VecDeque};

use rust_decimal::Decimal;
use twinledger_types::{
    Address, BatchEntry, ExecutorBalance, LedgerError, LockId, Result, constants,
};

/// One Executor account.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HybridAccount {
    pub public_key: Option<String>,
    pub confirmed: Decimal,
    pub pending_delta: Decimal,
    pub pending_withdrawal: Decimal,
    /// Most recent bridge locks counted into `confirmed`, oldest first.
    pub credited_locks: VecDeque<LockId>,
    pub last_synced_at: Option<u64>,
}

impl HybridAccount {
    #[must_use]
    pub fn available(&self) -> Decimal {
        self.confirmed + self.pending_delta
    }

    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.pending_delta.is_zero() && self.pending_withdrawal.is_zero()
    }
}

/// All Executor balances.
#[derive(Debug, Default)]
pub struct HybridBook {
    accounts: HashMap<Address, HybridAccount>,
}

impl HybridBook {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, address: &Address) -> Option<&HybridAccount> {
        self.accounts.get(address)
    }

    #[must_use]
    pub fn contains(&self, address: &Address) -> bool {
        self.accounts.contains_key(address)
    }

    #[must_use]
    pub fn public_key(&self, address: &Address) -> Option<&str> {
        self.accounts
            .get(address)
            .and_then(|a| a.public_key.as_deref())
    }

    /// Ensure an account exists, binding `public_key` if none is bound.
    /// Returns `true` if the account was created.
    ///
    /// # Errors
    /// `InvalidSignature` if a different key is already bound.
    pub fn register(&mut self, address: &Address, public_key: Option<&str>) -> Result<bool> {
        let created = !self.accounts.contains_key(address);
        let account = self.accounts.entry(address.clone()).or_default();
        match (&account.public_key, public_key) {
            (Some(bound), Some(key)) if !bound.eq_ignore_ascii_case(key) => {
                return Err(LedgerError::InvalidSignature {
                    reason: format!("{address} is bound to a different public key"),
                });
            }
            (None, Some(key)) => account.public_key = Some(key.to_ascii_lowercase()),
            _ => {}
        }
        Ok(created)
    }

    #[must_use]
    pub fn available(&self, address: &Address) -> Decimal {
        self.accounts
            .get(address)
            .map_or(Decimal::ZERO, HybridAccount::available)
    }

    // =================================================================
    // Optimistic mutations
    // =================================================================

    /// Decrease `pending_delta` by `amount`.
    ///
    /// # Errors
    /// `InsufficientBalance` if `available < amount`.
    pub fn debit(&mut self, address: &Address, amount: Decimal) -> Result<()> {
        let available = self.available(address);
        if available < amount {
            return Err(LedgerError::InsufficientBalance {
                address: address.clone(),
                needed: amount,
                available,
            });
        }
        self.accounts.entry(address.clone()).or_default().pending_delta -= amount;
        Ok(())
    }

    /// Increase `pending_delta` by `amount` (creates the account if needed).
    pub fn credit(&mut self, address: &Address, amount: Decimal) {
        self.accounts.entry(address.clone()).or_default().pending_delta += amount;
    }

    /// Debit `amount` and queue it for withdrawal to the Authority.
    ///
    /// # Errors
    /// `InsufficientBalance` if `available < amount`.
    pub fn withdraw(&mut self, address: &Address, amount: Decimal) -> Result<()> {
        self.debit(address, amount)?;
        self.accounts.entry(address.clone()).or_default().pending_withdrawal += amount;
        Ok(())
    }

    // =================================================================
    // Reconciliation
    // =================================================================

    /// Overwrite the confirmed component. Pending values are untouched.
    pub fn set_confirmed(&mut self, address: &Address, confirmed: Decimal, now: u64) {
        let account = self.accounts.entry(address.clone()).or_default();
        account.confirmed = confirmed;
        account.last_synced_at = Some(now);
    }

    /// Remember that `lock_id` has been counted into `confirmed`.
    pub fn record_credit(&mut self, address: &Address, lock_id: LockId) {
        let account = self.accounts.entry(address.clone()).or_default();
        if account.credited_locks.contains(&lock_id) {
            return;
        }
        if account.credited_locks.len() >= constants::MAX_CREDITED_LOCKS_PER_ACCOUNT {
            account.credited_locks.pop_front();
        }
        account.credited_locks.push_back(lock_id);
    }

    /// Every account with unsettled values, sorted by address.
    #[must_use]
    pub fn snapshot(&self) -> Vec<BatchEntry> {
        let mut entries: Vec<BatchEntry> = self
            .accounts
            .iter()
            .filter(|(_, a)| !a.is_settled())
            .map(|(address, a)| BatchEntry {
                address: address.clone(),
                delta: a.pending_delta,
                withdrawal: a.pending_withdrawal,
            })
            .collect();
        entries.sort_by(|a, b| a.address.cmp(&b.address));
        entries
    }

    /// Move exactly the snapshotted portion from pending into confirmed.
    pub fn retire(&mut self, entries: &[BatchEntry]) {
        for entry in entries {
            let account = self.accounts.entry(entry.address.clone()).or_default();
            account.pending_delta -= entry.delta;
            account.confirmed += entry.delta;
            account.pending_withdrawal -= entry.withdrawal;
        }
    }

    /// Number of accounts with unsettled values.
    #[must_use]
    pub fn unsettled_accounts(&self) -> usize {
        self.accounts.values().filter(|a| !a.is_settled()).count()
    }

    /// Σ |pending_delta|.
    #[must_use]
    pub fn unsettled_volume(&self) -> Decimal {
        self.accounts.values().map(|a| a.pending_delta.abs()).sum()
    }

    #[must_use]
    pub fn unsettled_withdrawal(&self) -> Decimal {
        self.accounts.values().map(|a| a.pending_withdrawal).sum()
    }

    /// Σ pending_delta + Σ pending_withdrawal. Zero whenever every action
    /// applied so far was zero-sum.
    #[must_use]
    pub fn net_pending(&self) -> Decimal {
        self.accounts
            .values()
            .map(|a| a.pending_delta + a.pending_withdrawal)
            .sum()
    }

    /// Wire view of one account. Unknown addresses read as zero.
    #[must_use]
    pub fn balance(&self, address: &Address, nonce: u64) -> ExecutorBalance {
        let account = self.accounts.get(address).cloned().unwrap_or_default();
        ExecutorBalance {
            address: address.clone(),
            available: account.available(),
            confirmed_balance: account.confirmed,
            pending_delta: account.pending_delta,
            pending_withdrawal: account.pending_withdrawal,
            nonce,
            credited_locks: account.credited_locks.into_iter().collect(),
            last_synced_at: account.last_synced_at,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}
