//! Identifiers used throughout TwinLedger.
//!
//! Lock, bridge and batch IDs use UUIDv7 for time-ordered lexicographic
//! sorting. Account addresses are derived from the ed25519 public key.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::constants;

// ---------------------------------------------------------------------------
// Address
// ---------------------------------------------------------------------------

/// Account address: `TL_` followed by the upper-case hex of the first
/// 20 bytes of `SHA-256(public_key)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(pub String);

impl Address {
    /// Derive the address owned by a raw ed25519 public key.
    #[must_use]
    pub fn from_public_key(public_key: &[u8; 32]) -> Self {
        let hash = Sha256::digest(public_key);
        Self(format!(
            "{}{}",
            constants::ADDRESS_PREFIX,
            hex::encode_upper(&hash[..20])
        ))
    }

    /// Derive the address from a hex-encoded public key.
    /// Returns `None` if the hex is malformed or not 32 bytes.
    #[must_use]
    pub fn from_public_key_hex(public_key_hex: &str) -> Option<Self> {
        let bytes: [u8; 32] = hex::decode(public_key_hex).ok()?.try_into().ok()?;
        Some(Self::from_public_key(&bytes))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Abbreviated form for log lines.
    #[must_use]
    pub fn short(&self) -> &str {
        let end = self.0.len().min(constants::ADDRESS_PREFIX.len() + 8);
        &self.0[..end]
    }
}

impl From<&str> for Address {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for Address {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Random address for unit tests. **Never use in production.**
#[cfg(any(test, feature = "test-helpers"))]
impl Address {
    #[must_use]
    pub fn random() -> Self {
        Self::from_public_key(&rand::random::<[u8; 32]>())
    }
}

// ---------------------------------------------------------------------------
// LockId
// ---------------------------------------------------------------------------

/// Unique identifier of a bridge lock (escrow record on the Authority).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct LockId(pub Uuid);

impl LockId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for LockId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for LockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "lock:{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// BridgeId
// ---------------------------------------------------------------------------

/// Client-chosen idempotency key of a bridge request.
///
/// A retried lock initiation carrying the same `BridgeId` returns the
/// original lock instead of locking funds a second time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct BridgeId(pub Uuid);

impl BridgeId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for BridgeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BridgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bridge:{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// BatchId
// ---------------------------------------------------------------------------

/// Unique identifier of a settlement batch. Idempotency key for submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct BatchId(pub Uuid);

impl BatchId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for BatchId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "batch:{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
