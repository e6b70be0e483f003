//! Per-account nonce ordering.
//!
//! Each ledger keeps its own `NonceBook`, so nonces advance independently on
//! the Authority and on the Executor. Only the last accepted nonce is kept per
//! address: ordering is strict, so any nonce at or below it is a replay and no
//! set of used nonces has to be remembered.

use std::collections::HashMap;

use twinledger_types::{Address, LedgerError, Result};

use crate::VerifiedEnvelope;

/// `Address → last accepted nonce`. Addresses never seen report 0.
#[derive(Debug, Default, Clone)]
pub struct NonceBook {
    last_accepted: HashMap<Address, u64>,
}

impl NonceBook {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Last accepted nonce for `address` (0 if none).
    #[must_use]
    pub fn last_accepted(&self, address: &Address) -> u64 {
        self.last_accepted.get(address).copied().unwrap_or(0)
    }

    /// Would `nonce` be accepted for `address` right now?
    pub fn check(&self, address: &Address, nonce: u64) -> Result<()> {
        let last = self.last_accepted(address);
        if nonce <= last {
            return Err(LedgerError::NonceReplay {
                address: address.clone(),
                nonce,
                last_accepted: last,
            });
        }
        Ok(())
    }

    /// Record a verified envelope's nonce.
    ///
    /// Re-checks ordering, so a `VerifiedEnvelope` produced against an older
    /// view of this book cannot be committed twice.
    pub fn commit(&mut self, verified: &VerifiedEnvelope) -> Result<()> {
        self.check(verified.address(), verified.nonce())?;
        self.last_accepted
            .insert(verified.address().clone(), verified.nonce());
        Ok(())
    }

    /// Number of addresses with at least one accepted nonce.
    #[must_use]
    pub fn len(&self) -> usize {
        self.last_accepted.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.last_accepted.is_empty()
    }
}
