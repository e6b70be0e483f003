//! Account balances on the Authority.
//!
//! Each address carries two balances:
//! - `confirmed`: spendable on the Authority itself
//! - `layer`: value the Authority has confirmed as held on the Executor layer
//!
//! All mutations are atomic: either the full operation succeeds or the
//! balance is unchanged.

use std::collections::HashMap;

use rust_decimal::Decimal;
use twinledger_types::{Address, LedgerError, Result};

/// One Authority account.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthorityAccount {
    /// Hex public key, bound on registration or first signed request.
    pub public_key: Option<String>,
    pub confirmed: Decimal,
    pub layer: Decimal,
}

/// Source of truth for Authority balances.
#[derive(Debug, Default)]
pub struct AccountBook {
    accounts: HashMap<Address, AuthorityAccount>,
}

impl AccountBook {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, address: &Address) -> Option<&AuthorityAccount> {
        self.accounts.get(address)
    }

    #[must_use]
    pub fn contains(&self, address: &Address) -> bool {
        self.accounts.contains_key(address)
    }

    /// Key bound to `address`, if any.
    #[must_use]
    pub fn public_key(&self, address: &Address) -> Option<&str> {
        self.accounts
            .get(address)
            .and_then(|a| a.public_key.as_deref())
    }

    /// Ensure an account exists and bind `public_key` if none is bound yet.
    ///
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
    pub fn confirmed(&self, address: &Address) -> Decimal {
        self.accounts
            .get(address)
            .map_or(Decimal::ZERO, |a| a.confirmed)
    }

    #[must_use]
    pub fn layer(&self, address: &Address) -> Decimal {
        self.accounts.get(address).map_or(Decimal::ZERO, |a| a.layer)
    }

    /// Credit confirmed balance (creates the account if needed).
    pub fn credit_confirmed(&mut self, address: &Address, amount: Decimal) {
        self.accounts.entry(address.clone()).or_default().confirmed += amount;
    }

    /// Debit confirmed balance.
    ///
    /// # Errors
    /// `InsufficientBalance` if confirmed < amount.
    pub fn debit_confirmed(&mut self, address: &Address, amount: Decimal) -> Result<Decimal> {
        let available = self.confirmed(address);
        if available < amount {
            return Err(LedgerError::InsufficientBalance {
                address: address.clone(),
                needed: amount,
                available,
            });
        }
        let account = self.accounts.entry(address.clone()).or_default();
        account.confirmed -= amount;
        Ok(account.confirmed)
    }

    /// Credit layer balance (creates the account if needed).
    pub fn credit_layer(&mut self, address: &Address, amount: Decimal) {
        self.accounts.entry(address.clone()).or_default().layer += amount;
    }

    /// Would applying `delta` keep the layer balance non-negative?
    #[must_use]
    pub fn can_apply_layer_delta(&self, address: &Address, delta: Decimal) -> bool {
        self.layer(address) + delta >= Decimal::ZERO
    }

    /// Apply a signed delta to the layer balance.
    ///
    /// # Errors
    /// `InsufficientBalance` if the result would be negative.
    pub fn apply_layer_delta(&mut self, address: &Address, delta: Decimal) -> Result<()> {
        if !self.can_apply_layer_delta(address, delta) {
            return Err(LedgerError::InsufficientBalance {
                address: address.clone(),
                needed: -delta,
                available: self.layer(address),
            });
        }
        self.accounts.entry(address.clone()).or_default().layer += delta;
        Ok(())
    }

    /// Σ confirmed over all accounts.
    #[must_use]
    pub fn total_confirmed(&self) -> Decimal {
        self.accounts.values().map(|a| a.confirmed).sum()
    }

    /// Σ layer over all accounts.
    #[must_use]
    pub fn total_layer(&self) -> Decimal {
        self.accounts.values().map(|a| a.layer).sum()
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

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(n: i64) -> Decimal {
        Decimal::new(n, 0)
    }

    #[test]
    fn credit_then_debit() {
        let mut book = AccountBook::new();
        let a = Address::from("TL_A");
        book.credit_confirmed(&a, dec(100));
        assert_eq!(book.debit_confirmed(&a, dec(25)).unwrap(), dec(75));
        assert_eq!(book.confirmed(&a), dec(75));
    }

    #[test]
    fn overdraft_leaves_balance_untouched() {
        let mut book = AccountBook::new();
        let a = Address::from("TL_A");
        book.credit_confirmed(&a, dec(10));
        let err = book.debit_confirmed(&a, dec(11)).unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientBalance { .. }));
        assert_eq!(book.confirmed(&a), dec(10));
    }

    #[test]
    fn debit_of_unknown_account_fails() {
        let mut book = AccountBook::new();
        assert!(book.debit_confirmed(&Address::from("TL_X"), dec(1)).is_err());
        assert!(book.is_empty());
    }

    #[test]
    fn layer_delta_cannot_go_negative() {
        let mut book = AccountBook::new();
        let a = Address::from("TL_A");
        book.credit_layer(&a, dec(20));
        book.apply_layer_delta(&a, dec(-20)).unwrap();
        assert!(book.apply_layer_delta(&a, dec(-1)).is_err());
        assert_eq!(book.layer(&a), Decimal::ZERO);
    }

    #[test]
    fn register_binds_key_once() {
        let mut book = AccountBook::new();
        let a = Address::from("TL_A");
        assert!(book.register(&a, None).unwrap());
        assert!(!book.register(&a, Some("AB")).unwrap());
        assert_eq!(book.public_key(&a), Some("ab"));
        assert!(book.register(&a, Some("ab")).is_ok());
        assert!(book.register(&a, Some("cd")).is_err());
    }

    #[test]
    fn totals() {
        let mut book = AccountBook::new();
        book.credit_confirmed(&Address::from("TL_A"), dec(5));
        book.credit_confirmed(&Address::from("TL_B"), dec(7));
        book.credit_layer(&Address::from("TL_B"), dec(3));
        assert_eq!(book.total_confirmed(), dec(12));
        assert_eq!(book.total_layer(), dec(3));
        assert_eq!(book.len(), 2);
    }
}
