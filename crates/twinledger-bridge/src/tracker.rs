//! Bridges initiated but not yet credited on the Executor.

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use twinledger_types::{Address, BridgeId, BridgeLock, LockId, LockReceipt};

/// A lock the orchestrator created and is waiting on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedBridge {
    pub bridge_id: BridgeId,
    pub lock_id: LockId,
    pub amount: Decimal,
    pub expires_at: u64,
}

impl From<&LockReceipt> for TrackedBridge {
    fn from(receipt: &LockReceipt) -> Self {
        Self {
            bridge_id: receipt.bridge_id,
            lock_id: receipt.lock_id,
            amount: receipt.amount,
            expires_at: receipt.expires_at,
        }
    }
}

impl From<&BridgeLock> for TrackedBridge {
    fn from(lock: &BridgeLock) -> Self {
        Self {
            bridge_id: lock.bridge_id,
            lock_id: lock.lock_id,
            amount: lock.amount,
            expires_at: lock.expires_at,
        }
    }
}

/// Per-address in-transit bridges.
#[derive(Debug, Default)]
pub struct PendingBridges {
    by_address: HashMap<Address, Vec<TrackedBridge>>,
}

impl PendingBridges {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn track(&mut self, address: &Address, bridge: TrackedBridge) {
        let list = self.by_address.entry(address.clone()).or_default();
        if !list.iter().any(|b| b.bridge_id == bridge.bridge_id) {
            list.push(bridge);
        }
    }

    /// Drop bridges the Executor has credited or that have expired at `now`.
    /// Returns how many were dropped.
    pub fn prune(&mut self, address: &Address, credited: &[LockId], now: u64) -> usize {
        let Some(list) = self.by_address.get_mut(address) else {
            return 0;
        };
        let before = list.len();
        list.retain(|b| !credited.contains(&b.lock_id) && b.expires_at > now);
        let dropped = before - list.len();
        if list.is_empty() {
            self.by_address.remove(address);
        }
        dropped
    }

    /// Σ amount still in transit for `address`.
    #[must_use]
    pub fn in_transit(&self, address: &Address) -> Decimal {
        self.by_address
            .get(address)
            .map_or(Decimal::ZERO, |l| l.iter().map(|b| b.amount).sum())
    }

    /// Oldest in-transit bridge for `address`.
    #[must_use]
    pub fn oldest(&self, address: &Address) -> Option<&TrackedBridge> {
        self.by_address.get(address).and_then(|l| l.first())
    }

    #[must_use]
    pub fn get(&self, address: &Address) -> &[TrackedBridge] {
        self.by_address.get(address).map_or(&[], Vec::as_slice)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_address.is_empty()
    }
}
