//! Settlement batch idempotency.
//!
//! Each batch is applied at most once. Sequences are applied in increasing
//! order, and the registry remembers the digest of every applied `BatchId`
//! above a watermark. When the cache is full the oldest entry is evicted and
//! the watermark rises to its sequence.
//!
//! - known id, same digest: duplicate, acknowledge without applying
//! - known id, different digest: [`LedgerError::BatchAlreadySubmitted`]
//! - unknown id, sequence at or below the last applied:
//!   [`LedgerError::StaleBatchSequence`]. Above the watermark the batch was
//!   never applied; at or below it the registry can no longer tell.

use std::collections::{HashMap, VecDeque};

use twinledger_types::{BatchId, LedgerError, Result, SettlementBatch};

/// Outcome of checking a batch against the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchCheck {
    /// Never applied: apply it.
    Fresh,
    /// Already applied: acknowledge only.
    Duplicate,
}

/// Remembers applied batches.
#[derive(Debug)]
pub struct BatchRegistry {
    /// Applied batch id → digest.
    applied: HashMap<BatchId, String>,
    /// Applied ids with their sequence, oldest first.
    order: VecDeque<(u64, BatchId)>,
    max_size: usize,
    /// Highest evicted sequence.
    watermark: u64,
    last_sequence: u64,
}

impl BatchRegistry {
    /// # Panics
    /// Panics if `max_size` is zero.
    #[must_use]
    pub fn new(max_size: usize) -> Self {
        assert!(max_size > 0, "BatchRegistry max_size must be > 0");
        Self {
            applied: HashMap::new(),
            order: VecDeque::new(),
            max_size,
            watermark: 0,
            last_sequence: 0,
        }
    }

    /// Classify `batch`.
    ///
    /// # Errors
    /// `BatchAlreadySubmitted` if the id is known with a different digest,
    /// `StaleBatchSequence` if the id is unknown and its sequence is not new.
    pub fn check(&self, batch: &SettlementBatch) -> Result<BatchCheck> {
        if let Some(digest) = self.applied.get(&batch.batch_id) {
            if digest == &batch.digest {
                return Ok(BatchCheck::Duplicate);
            }
            return Err(LedgerError::BatchAlreadySubmitted(batch.batch_id));
        }
        if batch.sequence <= self.last_sequence {
            return Err(LedgerError::StaleBatchSequence {
                batch_id: batch.batch_id,
                sequence: batch.sequence,
                last_applied: self.last_sequence,
            });
        }
        Ok(BatchCheck::Fresh)
    }

    /// Record an applied batch.
    pub fn record(&mut self, batch: &SettlementBatch) {
        if self.applied.len() >= self.max_size {
            if let Some((sequence, oldest)) = self.order.pop_front() {
                self.applied.remove(&oldest);
                self.watermark = self.watermark.max(sequence);
            }
        }
        self.applied.insert(batch.batch_id, batch.digest.clone());
        self.order.push_back((batch.sequence, batch.batch_id));
        self.last_sequence = self.last_sequence.max(batch.sequence);
    }

    #[must_use]
    pub fn is_applied(&self, batch_id: &BatchId) -> bool {
        self.applied.contains_key(batch_id)
    }

    /// Highest applied sequence (0 before the first batch).
    #[must_use]
    pub fn last_sequence(&self) -> u64 {
        self.last_sequence
    }

    /// Every applied id above this sequence is still remembered.
    #[must_use]
    pub fn watermark(&self) -> u64 {
        self.watermark
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.applied.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.applied.is_empty()
    }
}
