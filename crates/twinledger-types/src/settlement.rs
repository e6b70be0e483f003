//! # Settlement batches
//!
//! The Executor periodically snapshots its unsettled per-account deltas into a
//! [`SettlementBatch`] and submits it to the Authority.
//!
//! ## Batch digest
//!
//! ```text
//! digest = SHA-256("twinledger:batch:v1:" || batch_id || sequence ||
//!                  for each entry (sorted by address):
//!                      len||address || len||delta || len||withdrawal)
//! ```
//!
//! Entries are sorted by address before hashing, so the digest is independent
//! of the order in which accounts were visited. The Executor signs the digest;
//! the Authority uses `batch_id` plus digest for idempotent application.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::bridge::push_field;
use crate::{Address, BatchId, LedgerError, constants};

/// Net movement of one account in a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchEntry {
    pub address: Address,
    /// Change to the account's Executor-layer balance.
    pub delta: Decimal,
    /// Amount leaving the Executor layer back to the Authority.
    pub withdrawal: Decimal,
}

/// Lifecycle of a batch on the Executor side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    /// Snapshotted, not yet sent.
    Pending,
    /// Sent at least once, acknowledgement outstanding.
    Submitted,
    /// Acknowledged by the Authority. Terminal.
    Confirmed,
}

impl BatchStatus {
    #[must_use]
    pub fn can_transition_to(&self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Pending, Self::Submitted | Self::Confirmed) | (Self::Submitted, Self::Confirmed)
        )
    }
}

impl std::fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Submitted => write!(f, "SUBMITTED"),
            Self::Confirmed => write!(f, "CONFIRMED"),
        }
    }
}

/// A signed snapshot of unsettled Executor deltas.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementBatch {
    pub batch_id: BatchId,
    /// Monotonic per Executor, starting at 1.
    pub sequence: u64,
    /// Sorted by address.
    pub entries: Vec<BatchEntry>,
    /// Hex SHA-256 digest.
    pub digest: String,
    /// Hex ed25519 signature over the digest bytes. Empty until signed.
    pub signature: String,
    pub status: BatchStatus,
    pub created_at: u64,
}

impl SettlementBatch {
    /// Build a `Pending`, unsigned batch. Entries are sorted and the digest
    /// computed here.
    #[must_use]
    pub fn new(sequence: u64, mut entries: Vec<BatchEntry>, created_at: u64) -> Self {
        entries.sort_by(|a, b| a.address.cmp(&b.address));
        let batch_id = BatchId::new();
        let digest = hex::encode(Self::compute_digest(batch_id, sequence, &entries));
        Self {
            batch_id,
            sequence,
            entries,
            digest,
            signature: String::new(),
            status: BatchStatus::Pending,
            created_at,
        }
    }

    /// Compute the batch digest over id, sequence and entries.
    #[must_use]
    pub fn compute_digest(batch_id: BatchId, sequence: u64, entries: &[BatchEntry]) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(constants::BATCH_DOMAIN);
        hasher.update(batch_id.0.as_bytes());
        hasher.update(sequence.to_le_bytes());
        let mut buf = Vec::with_capacity(entries.len() * 96);
        for entry in entries {
            push_field(&mut buf, entry.address.as_str().as_bytes());
            push_field(&mut buf, entry.delta.normalize().to_string().as_bytes());
            push_field(&mut buf, entry.withdrawal.normalize().to_string().as_bytes());
        }
        hasher.update(&buf);
        hasher.finalize().into()
    }

    /// Does the stored digest match the content?
    #[must_use]
    pub fn verify_digest(&self) -> bool {
        let sorted = self
            .entries
            .windows(2)
            .all(|w| w[0].address < w[1].address);
        sorted
            && hex::encode(Self::compute_digest(self.batch_id, self.sequence, &self.entries))
                == self.digest
    }

    /// `Σ delta + Σ withdrawal`. Zero for a well-formed batch.
    #[must_use]
    pub fn net(&self) -> Decimal {
        self.entries
            .iter()
            .map(|e| e.delta + e.withdrawal)
            .sum()
    }

    #[must_use]
    pub fn is_balanced(&self) -> bool {
        self.net().is_zero()
    }

    #[must_use]
    pub fn total_withdrawal(&self) -> Decimal {
        self.entries.iter().map(|e| e.withdrawal).sum()
    }

    /// Advance the status.
    pub fn set_status(&mut self, target: BatchStatus) -> crate::Result<()> {
        if !self.status.can_transition_to(target) {
            return Err(LedgerError::Internal(format!(
                "cannot move {} from {} to {}",
                self.batch_id, self.status, target
            )));
        }
        self.status = target;
        Ok(())
    }
}

/// Authority acknowledgement of a submitted batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchAck {
    pub batch_id: BatchId,
    pub sequence: u64,
    /// `true` if the batch had already been applied; nothing changed.
    pub duplicate: bool,
    pub applied_entries: usize,
}

/// Result of one `settle_to_l1` cycle on the Executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementReport {
    /// `None` when there was nothing to settle.
    pub batch_id: Option<BatchId>,
    pub sequence: Option<u64>,
    pub entries: usize,
    pub duplicate: bool,
    /// Sum of positive deltas settled (gross volume).
    pub settled_volume: Decimal,
    pub withdrawn: Decimal,
    /// Bridge locks finalised before building the batch.
    pub bridges_finalized: usize,
}

/// Executor settlement counters reported by `GET /settle/status`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementStatus {
    pub pending_batches: usize,
    pub submitted_batches: usize,
    pub confirmed_batches: usize,
    /// Accounts with a non-zero pending delta or withdrawal.
    pub unsettled_accounts: usize,
    /// Sum of absolute pending deltas.
    pub unsettled_volume: Decimal,
    pub unsettled_withdrawal: Decimal,
    pub last_confirmed_sequence: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(addr: &str, delta: i64, withdrawal: i64) -> BatchEntry {
        BatchEntry {
            address: Address::from(addr),
            delta: Decimal::new(delta, 0),
            withdrawal: Decimal::new(withdrawal, 0),
        }
    }

    #[test]
    fn new_sorts_entries_and_digest_verifies() {
        let batch = SettlementBatch::new(
            1,
            vec![entry("TL_C", 5, 0), entry("TL_A", -10, 0), entry("TL_B", 5, 0)],
            0,
        );
        let addrs: Vec<_> = batch.entries.iter().map(|e| e.address.as_str()).collect();
        assert_eq!(addrs, vec!["TL_A", "TL_B", "TL_C"]);
        assert!(batch.verify_digest());
        assert!(batch.is_balanced());
        assert_eq!(batch.status, BatchStatus::Pending);
    }

    #[test]
    fn tampered_entry_fails_digest() {
        let mut batch = SettlementBatch::new(1, vec![entry("TL_A", -3, 0), entry("TL_B", 3, 0)], 0);
        batch.entries[1].delta = Decimal::new(4, 0);
        assert!(!batch.verify_digest());
    }

    #[test]
    fn tampered_sequence_fails_digest() {
        let mut batch = SettlementBatch::new(1, vec![entry("TL_A", 0, 0)], 0);
        batch.sequence = 2;
        assert!(!batch.verify_digest());
    }

    #[test]
    fn withdrawal_balances_negative_delta() {
        let batch = SettlementBatch::new(1, vec![entry("TL_A", -7, 7)], 0);
        assert!(batch.is_balanced());
        assert_eq!(batch.total_withdrawal(), Decimal::new(7, 0));
    }

    #[test]
    fn unbalanced_net() {
        let batch = SettlementBatch::new(1, vec![entry("TL_A", 5, 0)], 0);
        assert!(!batch.is_balanced());
        assert_eq!(batch.net(), Decimal::new(5, 0));
    }

    #[test]
    fn status_transitions() {
        let mut batch = SettlementBatch::new(1, vec![], 0);
        batch.set_status(BatchStatus::Submitted).unwrap();
        assert!(batch.set_status(BatchStatus::Pending).is_err());
        batch.set_status(BatchStatus::Confirmed).unwrap();
        assert!(batch.set_status(BatchStatus::Confirmed).is_err());
    }

    #[test]
    fn digest_is_order_independent_of_input() {
        let a = SettlementBatch::new(1, vec![entry("TL_B", 1, 0), entry("TL_A", -1, 0)], 0);
        let mut entries = a.entries.clone();
        entries.reverse();
        let digest = SettlementBatch::compute_digest(a.batch_id, 1, &{
            let mut e = entries;
            e.sort_by(|x, y| x.address.cmp(&y.address));
            e
        });
        assert_eq!(hex::encode(digest), a.digest);
    }
}
