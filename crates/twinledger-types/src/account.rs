//! Balance views returned by both ledgers.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{Address, BridgeLock, LockId};

/// An account as seen by the Authority (`GET /balance/{address}`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorityBalance {
    pub address: Address,
    /// Spendable on the Authority.
    pub confirmed_balance: Decimal,
    /// Held in open locks this account initiated.
    pub locked_outgoing: Decimal,
    /// Value confirmed as held on the Executor layer.
    pub layer_balance: Decimal,
    /// `layer_balance` plus settlement-verified Executor-layer locks targeting
    /// this account. This is what the Executor mirrors as its confirmed
    /// balance; a verified lock can no longer expire.
    pub executor_view: Decimal,
    /// Open locks targeting this account on the Executor layer.
    pub inbound_locks: Vec<BridgeLock>,
    /// Last accepted nonce.
    pub nonce: u64,
    pub public_key: Option<String>,
    /// Sequence of the last settlement batch the Authority applied.
    pub executor_batch_sequence: u64,
}

impl AuthorityBalance {
    /// View of an address the Authority has never seen.
    #[must_use]
    pub fn empty(address: Address, executor_batch_sequence: u64) -> Self {
        Self {
            address,
            confirmed_balance: Decimal::ZERO,
            locked_outgoing: Decimal::ZERO,
            layer_balance: Decimal::ZERO,
            executor_view: Decimal::ZERO,
            inbound_locks: Vec::new(),
            nonce: 0,
            public_key: None,
            executor_batch_sequence,
        }
    }
}

/// An account as seen by the Executor (`GET /balance/details/{address}`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutorBalance {
    pub address: Address,
    /// Mirror of the Authority's executor view as of the last sync.
    pub confirmed_balance: Decimal,
    /// Net of applied, not yet settled actions.
    pub pending_delta: Decimal,
    /// Withdrawn, waiting for the next settlement batch.
    pub pending_withdrawal: Decimal,
    /// `confirmed_balance + pending_delta`.
    pub available: Decimal,
    pub nonce: u64,
    /// Bridge locks already reflected in `confirmed_balance`.
    pub credited_locks: Vec<LockId>,
    pub last_synced_at: Option<u64>,
}

/// Simple balance answer (`GET /balance/{address}` on the Executor).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceSummary {
    pub address: Address,
    pub balance: Decimal,
}

impl From<&ExecutorBalance> for BalanceSummary {
    fn from(b: &ExecutorBalance) -> Self {
        Self {
            address: b.address.clone(),
            balance: b.available,
        }
    }
}

/// `GET /nonce/{address}` answer. The next envelope must carry `nonce + 1`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NonceResponse {
    pub address: Address,
    pub nonce: u64,
}

impl NonceResponse {
    #[must_use]
    pub fn next(&self) -> u64 {
        self.nonce.saturating_add(1)
    }
}

/// `POST /verify-signature` answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureCheck {
    pub valid: bool,
    pub address: Address,
    /// Rejection reason when `valid` is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}
