//! Supply conservation invariant checker.
//!
//! Value is only ever created by issuance (genesis or admin deposit). Every
//! other operation moves it between confirmed balances, layer balances and
//! escrow:
//! ```text
//! Σ confirmed + Σ layer + Σ open locks == Σ issued
//! ```
//!
//! If this invariant ever breaks, something has gone badly wrong and the
//! ledger reports a critical safety error.

use rust_decimal::Decimal;
use twinledger_types::{LedgerError, Result};

/// Tracks total issuance and validates conservation.
#[derive(Debug, Default)]
pub struct SupplyConservation {
    issued_confirmed: Decimal,
    issued_layer: Decimal,
}

impl SupplyConservation {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record issuance into a confirmed balance.
    pub fn record_issuance(&mut self, amount: Decimal) {
        self.issued_confirmed += amount;
    }

    /// Record issuance directly onto the Executor layer.
    pub fn record_layer_issuance(&mut self, amount: Decimal) {
        self.issued_layer += amount;
    }

    /// Expected total supply.
    #[must_use]
    pub fn expected_supply(&self) -> Decimal {
        self.issued_confirmed + self.issued_layer
    }

    /// Compare the actual supply against issuance.
    ///
    /// # Errors
    /// [`LedgerError::SupplyInvariantViolation`] if actual ≠ expected.
    pub fn verify(&self, actual_supply: Decimal) -> Result<()> {
        let expected = self.expected_supply();
        if actual_supply != expected {
            return Err(LedgerError::SupplyInvariantViolation {
                reason: format!(
                    "actual supply {actual_supply} != expected {expected} \
                     (issued confirmed={}, issued layer={})",
                    self.issued_confirmed, self.issued_layer
                ),
            });
        }
        Ok(())
    }
}
