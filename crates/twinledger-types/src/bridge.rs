//! # BridgeLock: the cross-layer escrow primitive
//!
//! Value crosses from the Authority to a target layer through a lock held in
//! escrow on the Authority:
//!
//! ```text
//!   ┌────────┐ verify_settlement ┌────────────────────┐  release  ┌──────────┐
//!   │ LOCKED ├──────────────────▶│ SETTLEMENT_VERIFIED├──────────▶│ RELEASED │
//!   └───┬────┘                   └────────────────────┘           └──────────┘
//!       │ ttl elapsed
//!       ▼
//!   ┌─────────┐
//!   │ EXPIRED │  (amount refunded to source)
//!   └─────────┘
//! ```
//!
//! ## Properties
//!
//! - **Single release**: `SettlementVerified → Released` happens once; a second
//!   release is `AlreadyReleased`.
//! - **Verified before release**: a `Locked` lock cannot be released.
//! - **Bounded lifetime**: an unverified lock expires and refunds its source.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{Address, BridgeId, LedgerError, LockId, constants};

/// Which ledger a bridged amount is credited on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Layer {
    /// The authoritative settlement ledger (L1).
    Authority,
    /// The optimistic execution ledger (L2).
    Executor,
}

impl std::fmt::Display for Layer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Authority => write!(f, "AUTHORITY"),
            Self::Executor => write!(f, "EXECUTOR"),
        }
    }
}

/// Lifecycle of a [`BridgeLock`]. Transitions never go backwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockStatus {
    /// Source debited, funds held in escrow.
    Locked,
    /// A valid settlement proof was presented; release is authorised.
    SettlementVerified,
    /// Beneficiary credited. Terminal.
    Released,
    /// TTL elapsed without verification; source refunded. Terminal.
    Expired,
}

impl LockStatus {
    /// Can a lock in this status move to `target`?
    #[must_use]
    pub fn can_transition_to(&self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Locked, Self::SettlementVerified | Self::Expired)
                | (Self::SettlementVerified, Self::Released)
        )
    }

    /// Open locks still hold escrowed value.
    #[must_use]
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Locked | Self::SettlementVerified)
    }
}

impl std::fmt::Display for LockStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Locked => write!(f, "LOCKED"),
            Self::SettlementVerified => write!(f, "SETTLEMENT_VERIFIED"),
            Self::Released => write!(f, "RELEASED"),
            Self::Expired => write!(f, "EXPIRED"),
        }
    }
}

/// An escrow record on the Authority ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeLock {
    pub lock_id: LockId,
    /// Idempotency key chosen by the client (or generated).
    pub bridge_id: BridgeId,
    /// Account whose confirmed balance was debited.
    pub source: Address,
    /// Beneficiary on the target layer.
    pub target_address: Address,
    pub target_layer: Layer,
    pub amount: Decimal,
    pub status: LockStatus,
    /// Unix seconds.
    pub created_at: u64,
    pub expires_at: u64,
    pub verified_at: Option<u64>,
    pub released_at: Option<u64>,
}

impl BridgeLock {
    /// Create a fresh `Locked` lock expiring `ttl_secs` after `now`.
    #[must_use]
    pub fn new(
        bridge_id: BridgeId,
        source: Address,
        target_address: Address,
        target_layer: Layer,
        amount: Decimal,
        now: u64,
        ttl_secs: u64,
    ) -> Self {
        Self {
            lock_id: LockId::new(),
            bridge_id,
            source,
            target_address,
            target_layer,
            amount,
            status: LockStatus::Locked,
            created_at: now,
            expires_at: now.saturating_add(ttl_secs),
            verified_at: None,
            released_at: None,
        }
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.status.is_open()
    }

    /// An unverified lock whose TTL has elapsed at `now`.
    #[must_use]
    pub fn is_past_ttl(&self, now: u64) -> bool {
        self.status == LockStatus::Locked && now >= self.expires_at
    }

    /// `Locked → SettlementVerified`.
    pub fn mark_verified(&mut self, now: u64) -> crate::Result<()> {
        self.transition(LockStatus::SettlementVerified)?;
        self.verified_at = Some(now);
        Ok(())
    }

    /// `SettlementVerified → Released`.
    pub fn mark_released(&mut self, now: u64) -> crate::Result<()> {
        self.transition(LockStatus::Released)?;
        self.released_at = Some(now);
        Ok(())
    }

    /// `Locked → Expired`.
    pub fn mark_expired(&mut self) -> crate::Result<()> {
        self.transition(LockStatus::Expired)
    }

    fn transition(&mut self, target: LockStatus) -> crate::Result<()> {
        if !self.status.can_transition_to(target) {
            return Err(match self.status {
                LockStatus::Released => LedgerError::AlreadyReleased(self.lock_id),
                LockStatus::Expired => LedgerError::LockExpired(self.lock_id),
                status => LedgerError::LockNotVerified {
                    lock_id: self.lock_id,
                    status,
                },
            });
        }
        self.status = target;
        Ok(())
    }
}

/// Attestation that the target layer has accounted for a lock, authorising
/// its release.
///
/// Signed by the Executor's authority key over [`SettlementProof::signing_payload`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementProof {
    pub lock_id: LockId,
    pub market_id: String,
    pub outcome: String,
    /// Must equal the lock's `target_address`.
    pub beneficiary: Address,
    /// Must equal the lock's amount.
    pub amount: Decimal,
    /// Height (batch sequence) of the origin ledger when the proof was built.
    pub origin_height: u64,
    /// Hex ed25519 signature by the Executor key.
    pub origin_signature: String,
}

impl SettlementProof {
    /// Canonical signing payload.
    ///
    /// Format: `"twinledger:proof:v1:" || lock_id || len||market_id ||
    /// len||outcome || len||beneficiary || len||amount || origin_height`.
    /// Variable-length fields carry a `u32` little-endian length prefix; the
    /// amount is normalised so `25` and `25.00` sign identically.
    #[must_use]
    pub fn signing_payload(&self) -> Vec<u8> {
        let mut payload = Vec::with_capacity(160);
        payload.extend_from_slice(constants::PROOF_DOMAIN);
        payload.extend_from_slice(self.lock_id.0.as_bytes());
        push_field(&mut payload, self.market_id.as_bytes());
        push_field(&mut payload, self.outcome.as_bytes());
        push_field(&mut payload, self.beneficiary.as_str().as_bytes());
        push_field(&mut payload, self.amount.normalize().to_string().as_bytes());
        payload.extend_from_slice(&self.origin_height.to_le_bytes());
        payload
    }
}

/// Append a length-prefixed field.
pub(crate) fn push_field(buf: &mut Vec<u8>, field: &[u8]) {
    let len = u32::try_from(field.len()).unwrap_or(u32::MAX);
    buf.extend_from_slice(&len.to_le_bytes());
    buf.extend_from_slice(field);
}

/// Aggregate lock counters reported by `GET /bridge/stats`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeStats {
    pub total_locks: usize,
    pub locked: usize,
    pub settlement_verified: usize,
    pub released: usize,
    pub expired: usize,
    /// Value currently held in open locks.
    pub open_amount: Decimal,
    /// Value delivered to beneficiaries so far.
    pub released_amount: Decimal,
}

/// Dummy lock for testing. **Never use in production.**
#[cfg(any(test, feature = "test-helpers"))]
impl BridgeLock {
    #[must_use]
    pub fn dummy(amount: Decimal, now: u64) -> Self {
        Self::new(
            BridgeId::new(),
            Address::random(),
            Address::random(),
            Layer::Executor,
            amount,
            now,
            constants::DEFAULT_LOCK_TTL_SECS,
        )
    }
}
