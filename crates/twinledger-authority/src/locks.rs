//! Lock storage and indexes.

use std::collections::HashMap;

use rust_decimal::Decimal;
use twinledger_types::{Address, BridgeId, BridgeLock, BridgeStats, Layer, LockId, LockStatus};

/// All bridge locks, indexed by `LockId` and by `BridgeId`.
#[derive(Debug, Default)]
pub struct LockBook {
    locks: HashMap<LockId, BridgeLock>,
    by_bridge: HashMap<BridgeId, LockId>,
}

impl LockBook {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, lock: BridgeLock) {
        self.by_bridge.insert(lock.bridge_id, lock.lock_id);
        self.locks.insert(lock.lock_id, lock);
    }

    #[must_use]
    pub fn get(&self, lock_id: &LockId) -> Option<&BridgeLock> {
        self.locks.get(lock_id)
    }

    pub fn get_mut(&mut self, lock_id: &LockId) -> Option<&mut BridgeLock> {
        self.locks.get_mut(lock_id)
    }

    #[must_use]
    pub fn by_bridge(&self, bridge_id: &BridgeId) -> Option<&BridgeLock> {
        self.by_bridge
            .get(bridge_id)
            .and_then(|id| self.locks.get(id))
    }

    /// Open locks crediting `address` on `layer`, oldest first.
    #[must_use]
    pub fn open_inbound(&self, address: &Address, layer: Layer) -> Vec<&BridgeLock> {
        let mut inbound: Vec<_> = self
            .locks
            .values()
            .filter(|l| l.is_open() && l.target_layer == layer && &l.target_address == address)
            .collect();
        inbound.sort_by_key(|l| l.lock_id);
        inbound
    }

    /// Value `address` currently holds in open locks it initiated.
    #[must_use]
    pub fn locked_outgoing(&self, address: &Address) -> Decimal {
        self.locks
            .values()
            .filter(|l| l.is_open() && &l.source == address)
            .map(|l| l.amount)
            .sum()
    }

    /// Unverified locks whose TTL has elapsed at `now`.
    #[must_use]
    pub fn stale(&self, now: u64) -> Vec<LockId> {
        let mut ids: Vec<_> = self
            .locks
            .values()
            .filter(|l| l.is_past_ttl(now))
            .map(|l| l.lock_id)
            .collect();
        ids.sort();
        ids
    }

    /// Every open lock, oldest first.
    #[must_use]
    pub fn open(&self) -> Vec<BridgeLock> {
        let mut open: Vec<_> = self.locks.values().filter(|l| l.is_open()).cloned().collect();
        open.sort_by_key(|l| l.lock_id);
        open
    }

    /// Σ amount of open locks.
    #[must_use]
    pub fn open_total(&self) -> Decimal {
        self.locks
            .values()
            .filter(|l| l.is_open())
            .map(|l| l.amount)
            .sum()
    }

    #[must_use]
    pub fn stats(&self) -> BridgeStats {
        let mut stats = BridgeStats {
            total_locks: self.locks.len(),
            ..BridgeStats::default()
        };
        for lock in self.locks.values() {
            match lock.status {
                LockStatus::Locked => stats.locked += 1,
                LockStatus::SettlementVerified => stats.settlement_verified += 1,
                LockStatus::Released => {
                    stats.released += 1;
                    stats.released_amount += lock.amount;
                }
                LockStatus::Expired => stats.expired += 1,
            }
            if lock.is_open() {
                stats.open_amount += lock.amount;
            }
        }
        stats
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use twinledger_types::constants::DEFAULT_LOCK_TTL_SECS;

    const NOW: u64 = 1_700_000_000;

    fn dec(n: i64) -> Decimal {
        Decimal::new(n, 0)
    }

    #[test]
    fn lookup_by_bridge_id() {
        let mut book = LockBook::new();
        let lock = BridgeLock::dummy(dec(5), NOW);
        let (lock_id, bridge_id) = (lock.lock_id, lock.bridge_id);
        book.insert(lock);
        assert_eq!(book.by_bridge(&bridge_id).unwrap().lock_id, lock_id);
        assert!(book.by_bridge(&BridgeId::new()).is_none());
    }

    #[test]
    fn inbound_and_outgoing() {
        let mut book = LockBook::new();
        let lock = BridgeLock::dummy(dec(5), NOW);
        let (source, target) = (lock.source.clone(), lock.target_address.clone());
        book.insert(lock);
        assert_eq!(book.locked_outgoing(&source), dec(5));
        assert_eq!(book.open_inbound(&target, Layer::Executor).len(), 1);
        assert!(book.open_inbound(&target, Layer::Authority).is_empty());
        assert!(book.open_inbound(&source, Layer::Executor).is_empty());
    }

    #[test]
    fn stale_only_after_ttl() {
        let mut book = LockBook::new();
        book.insert(BridgeLock::dummy(dec(5), NOW));
        assert!(book.stale(NOW).is_empty());
        assert_eq!(book.stale(NOW + DEFAULT_LOCK_TTL_SECS).len(), 1);
    }

    #[test]
    fn stats_count_by_status() {
        let mut book = LockBook::new();
        let mut released = BridgeLock::dummy(dec(3), NOW);
        released.mark_verified(NOW).unwrap();
        released.mark_released(NOW).unwrap();
        book.insert(released);
        book.insert(BridgeLock::dummy(dec(4), NOW));
        let stats = book.stats();
        assert_eq!(stats.total_locks, 2);
        assert_eq!(stats.released, 1);
        assert_eq!(stats.locked, 1);
        assert_eq!(stats.open_amount, dec(4));
        assert_eq!(stats.released_amount, dec(3));
        assert_eq!(book.open_total(), dec(4));
        assert_eq!(book.open().len(), 1);
    }
}
