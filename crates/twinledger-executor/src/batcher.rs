//! Settlement Batcher.
//!
//! Snapshots unsettled deltas into signed [`SettlementBatch`]es and retires
//! them once the Authority acknowledges.
//!
//! ## Lifecycle
//!
//! ```text
//!   stage ──▶ PENDING ──sign──▶ SUBMITTED ──ack (or sync seq ≥ batch seq)──▶ CONFIRMED
//!                                   │                                       (retired)
//!                                   └── rejected ──▶ dropped, deltas re-snapshotted
//! ```
//!
//! At most one batch is in flight. While it is, [`Batcher::stage`] returns
//! the same batch again so a lost acknowledgement is recovered by
//! resubmission, which the Authority treats as a duplicate.

use rust_decimal::Decimal;
use tracing::{info, warn};
use twinledger_auth::{SigningKey, sign_batch};
use twinledger_types::{BatchId, BatchStatus, Result, SettlementBatch, SettlementStatus};

use crate::book::HybridBook;

#[derive(Debug)]
pub struct Batcher {
    next_sequence: u64,
    in_flight: Option<SettlementBatch>,
    confirmed_batches: usize,
    last_confirmed_sequence: u64,
    /// Whether `next_sequence` has been aligned with the Authority.
    sequence_observed: bool,
}

impl Default for Batcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Batcher {
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_sequence: 1,
            in_flight: None,
            confirmed_batches: 0,
            last_confirmed_sequence: 0,
            sequence_observed: false,
        }
    }

    #[must_use]
    pub fn in_flight(&self) -> Option<&SettlementBatch> {
        self.in_flight.as_ref()
    }

    #[must_use]
    pub fn last_confirmed_sequence(&self) -> u64 {
        self.last_confirmed_sequence
    }

    #[must_use]
    pub fn next_sequence(&self) -> u64 {
        self.next_sequence
    }

    #[must_use]
    pub fn sequence_observed(&self) -> bool {
        self.sequence_observed
    }

    /// Align numbering with the last sequence the Authority has applied, so a
    /// restarted Executor never reuses a sequence.
    pub fn observe_remote_sequence(&mut self, remote: u64) {
        self.next_sequence = self.next_sequence.max(remote + 1);
        self.sequence_observed = true;
    }

    /// The batch to submit this cycle: the in-flight one, or a new signed
    /// snapshot of `book`. `None` if there is nothing to settle.
    pub fn stage(
        &mut self,
        book: &HybridBook,
        key: &SigningKey,
        now: u64,
    ) -> Result<Option<SettlementBatch>> {
        if let Some(batch) = &self.in_flight {
            return Ok(Some(batch.clone()));
        }
        let entries = book.snapshot();
        if entries.is_empty() {
            return Ok(None);
        }

        let mut batch = SettlementBatch::new(self.next_sequence, entries, now);
        sign_batch(&mut batch, key)?;
        batch.set_status(BatchStatus::Submitted)?;
        self.next_sequence += 1;

        info!(
            batch_id = %batch.batch_id,
            sequence = batch.sequence,
            entries = batch.entries.len(),
            "settlement batch staged"
        );
        self.in_flight = Some(batch.clone());
        Ok(Some(batch))
    }

    /// Retire the in-flight batch if its id is `batch_id`.
    ///
    /// Returns `false` when there is nothing to retire (already retired or a
    /// different batch), which makes acknowledgements idempotent.
    pub fn confirm(&mut self, book: &mut HybridBook, batch_id: &BatchId) -> Result<bool> {
        match &self.in_flight {
            Some(batch) if &batch.batch_id == batch_id => self.retire_in_flight(book),
            _ => Ok(false),
        }
    }

    /// Retire the in-flight batch if the Authority has applied `remote_sequence`
    /// at or beyond it.
    pub fn confirm_through(&mut self, book: &mut HybridBook, remote_sequence: u64) -> Result<bool> {
        match &self.in_flight {
            Some(batch) if batch.sequence <= remote_sequence => self.retire_in_flight(book),
            _ => Ok(false),
        }
    }

    fn retire_in_flight(&mut self, book: &mut HybridBook) -> Result<bool> {
        let Some(mut batch) = self.in_flight.take() else {
            return Ok(false);
        };
        book.retire(&batch.entries);
        batch.set_status(BatchStatus::Confirmed)?;
        self.confirmed_batches += 1;
        self.last_confirmed_sequence = self.last_confirmed_sequence.max(batch.sequence);
        info!(batch_id = %batch.batch_id, sequence = batch.sequence, "settlement batch confirmed");
        Ok(true)
    }

    /// Drop a batch the Authority rejected. Its deltas are still pending and
    /// go into the next snapshot under a new id and sequence.
    pub fn abandon(&mut self, batch_id: &BatchId) -> bool {
        if self.in_flight.as_ref().is_some_and(|b| &b.batch_id == batch_id) {
            self.in_flight = None;
            warn!(batch_id = %batch_id, "settlement batch abandoned");
            return true;
        }
        false
    }

    #[must_use]
    pub fn status(&self, book: &HybridBook) -> SettlementStatus {
        let in_flight_status = self.in_flight.as_ref().map(|b| b.status);
        SettlementStatus {
            pending_batches: usize::from(in_flight_status == Some(BatchStatus::Pending)),
            submitted_batches: usize::from(in_flight_status == Some(BatchStatus::Submitted)),
            confirmed_batches: self.confirmed_batches,
            unsettled_accounts: book.unsettled_accounts(),
            unsettled_volume: book.unsettled_volume(),
            unsettled_withdrawal: book.unsettled_withdrawal(),
            last_confirmed_sequence: self.last_confirmed_sequence,
        }
    }
}

/// Sum of positive deltas in `batch`.
#[must_use]
pub fn gross_volume(batch: &SettlementBatch) -> Decimal {
    batch
        .entries
        .iter()
        .map(|e| e.delta)
        .filter(|d| *d > Decimal::ZERO)
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use twinledger_auth::keys::test_signing_key;
    use twinledger_auth::verify_batch_signature;
    use twinledger_types::Address;

    fn dec(n: i64) -> Decimal {
        Decimal::new(n, 0)
    }

    fn book_with_bet() -> HybridBook {
        let mut book = HybridBook::new();
        let a = Address::from("TL_A");
        book.set_confirmed(&a, dec(100), 0);
        book.debit(&a, dec(10)).unwrap();
        book.credit(&Address::from("TL_HOUSE"), dec(10));
        book
    }

    #[test]
    fn nothing_to_settle() {
        let mut batcher = Batcher::new();
        let key = test_signing_key(7);
        assert!(batcher.stage(&HybridBook::new(), &key, 0).unwrap().is_none());
        assert_eq!(batcher.next_sequence(), 1);
    }

    #[test]
    fn staged_batch_is_signed_and_balanced() {
        let mut batcher = Batcher::new();
        let key = test_signing_key(7);
        let batch = batcher.stage(&book_with_bet(), &key, 5).unwrap().unwrap();
        assert_eq!(batch.sequence, 1);
        assert_eq!(batch.status, BatchStatus::Submitted);
        assert!(batch.is_balanced());
        verify_batch_signature(&batch, &key.verifying_key()).unwrap();
        assert_eq!(gross_volume(&batch), dec(10));
    }

    #[test]
    fn in_flight_batch_is_resubmitted() {
        let mut batcher = Batcher::new();
        let key = test_signing_key(7);
        let book = book_with_bet();
        let first = batcher.stage(&book, &key, 5).unwrap().unwrap();
        let again = batcher.stage(&book, &key, 6).unwrap().unwrap();
        assert_eq!(first.batch_id, again.batch_id);
        assert_eq!(batcher.status(&book).submitted_batches, 1);
    }

    #[test]
    fn confirm_retires_exactly_once() {
        let mut batcher = Batcher::new();
        let key = test_signing_key(7);
        let mut book = book_with_bet();
        let batch = batcher.stage(&book, &key, 5).unwrap().unwrap();

        assert!(batcher.confirm(&mut book, &batch.batch_id).unwrap());
        assert!(!batcher.confirm(&mut book, &batch.batch_id).unwrap());
        assert!(!batcher.confirm_through(&mut book, 1).unwrap());

        let a = book.get(&Address::from("TL_A")).unwrap();
        assert_eq!(a.confirmed, dec(90));
        assert_eq!(a.pending_delta, Decimal::ZERO);
        let status = batcher.status(&book);
        assert_eq!(status.confirmed_batches, 1);
        assert_eq!(status.last_confirmed_sequence, 1);
        assert_eq!(status.unsettled_accounts, 0);
    }

    #[test]
    fn remote_sequence_retires_in_flight() {
        let mut batcher = Batcher::new();
        let key = test_signing_key(7);
        let mut book = book_with_bet();
        batcher.stage(&book, &key, 5).unwrap();
        assert!(!batcher.confirm_through(&mut book, 0).unwrap());
        assert!(batcher.confirm_through(&mut book, 1).unwrap());
        assert!(batcher.in_flight().is_none());
    }

    #[test]
    fn abandoned_deltas_are_restaged() {
        let mut batcher = Batcher::new();
        let key = test_signing_key(7);
        let book = book_with_bet();
        let first = batcher.stage(&book, &key, 5).unwrap().unwrap();
        assert!(batcher.abandon(&first.batch_id));
        let second = batcher.stage(&book, &key, 6).unwrap().unwrap();
        assert_ne!(first.batch_id, second.batch_id);
        assert_eq!(second.sequence, 2);
        assert_eq!(second.entries, first.entries);
    }

    #[test]
    fn observed_sequence_moves_numbering_forward() {
        let mut batcher = Batcher::new();
        batcher.observe_remote_sequence(41);
        assert!(batcher.sequence_observed());
        assert_eq!(batcher.next_sequence(), 42);
        batcher.observe_remote_sequence(3);
        assert_eq!(batcher.next_sequence(), 42);
    }
}
