//! Error types for TwinLedger.
//!
//! All errors use the `TL_ERR_` prefix convention for easy grepping in logs.
//! Error codes are grouped by class:
//! - 1xx: Authentication errors
//! - 2xx: Funds errors
//! - 3xx: Bridge / escrow errors
//! - 4xx: Settlement errors
//! - 5xx: Network errors
//! - 8xx: Safety errors
//! - 9xx: General / internal errors
//!
//! The enum is serde-serialisable so a typed error survives the HTTP boundary
//! between the Authority, the Executor and their clients.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{Address, BatchId, BridgeId, LockId, LockStatus};

/// Central error enum for all TwinLedger operations.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerError {
    // =================================================================
    // Authentication Errors (1xx)
    // =================================================================
    /// Signature, public key or address binding did not verify.
    #[error("TL_ERR_100: Invalid signature: {reason}")]
    InvalidSignature { reason: String },

    /// Envelope timestamp is outside the accepted skew window.
    #[error("TL_ERR_101: Expired timestamp {timestamp} (now {now}, max skew {max_skew_secs}s)")]
    ExpiredTimestamp {
        timestamp: u64,
        now: u64,
        max_skew_secs: u64,
    },

    /// Nonce is not strictly greater than the last accepted one.
    #[error("TL_ERR_102: Nonce replay for {address}: nonce {nonce}, last accepted {last_accepted}")]
    NonceReplay {
        address: Address,
        nonce: u64,
        last_accepted: u64,
    },

    /// The account is not registered with this ledger.
    #[error("TL_ERR_103: Unknown account: {0}")]
    UnknownAccount(Address),

    /// The payload is not valid for this ledger.
    #[error("TL_ERR_104: Malformed envelope: {reason}")]
    MalformedEnvelope { reason: String },

    // =================================================================
    // Funds Errors (2xx)
    // =================================================================
    /// Not enough balance to perform the operation.
    #[error("TL_ERR_200: Insufficient balance for {address}: need {needed}, have {available}")]
    InsufficientBalance {
        address: Address,
        needed: Decimal,
        available: Decimal,
    },

    /// Amounts must be strictly positive.
    #[error("TL_ERR_201: Amount must be positive, got {0}")]
    NonPositiveAmount(Decimal),

    /// Neither layer can cover the requested action (auto-bridge).
    #[error(
        "TL_ERR_202: Insufficient funds for {address}: required {required}, \
         executor available {executor_available}, authority balance {authority_balance}, \
         deficit {deficit}"
    )]
    InsufficientFunds {
        address: Address,
        required: Decimal,
        executor_available: Decimal,
        authority_balance: Decimal,
        deficit: Decimal,
    },

    // =================================================================
    // Bridge / Escrow Errors (3xx)
    // =================================================================
    /// No lock with this ID exists.
    #[error("TL_ERR_300: Unknown lock: {0}")]
    UnknownLock(LockId),

    /// Release was attempted before the settlement was verified.
    #[error("TL_ERR_301: Lock {lock_id} not verified (status {status})")]
    LockNotVerified { lock_id: LockId, status: LockStatus },

    /// The lock has already been released (exactly-once guard).
    #[error("TL_ERR_302: Lock already released: {0}")]
    AlreadyReleased(LockId),

    /// The settlement proof disagrees with the lock's recorded terms.
    #[error("TL_ERR_303: Settlement mismatch for {lock_id}: {reason}")]
    SettlementMismatch { lock_id: LockId, reason: String },

    /// The lock passed its TTL and was refunded.
    #[error("TL_ERR_304: Lock expired: {0}")]
    LockExpired(LockId),

    /// A bridge was initiated but its credit has not reached the Executor yet.
    #[error("TL_ERR_305: Bridge {bridge_id} pending (lock {lock_id})")]
    BridgePending { bridge_id: BridgeId, lock_id: LockId },

    // =================================================================
    // Settlement Errors (4xx)
    // =================================================================
    /// A batch with this ID was already submitted with different content.
    #[error("TL_ERR_400: Batch already submitted with different content: {0}")]
    BatchAlreadySubmitted(BatchId),

    /// At least one entry could not be applied; nothing was applied.
    #[error("TL_ERR_401: Batch {batch_id} rejected, failing accounts: {failed:?}")]
    PartialBatchFailure {
        batch_id: BatchId,
        failed: Vec<Address>,
    },

    /// Batch deltas and withdrawals do not net to zero.
    #[error("TL_ERR_402: Batch {batch_id} is unbalanced by {net}")]
    UnbalancedBatch { batch_id: BatchId, net: Decimal },

    /// An unseen batch reuses a sequence the Authority has already applied.
    #[error("TL_ERR_403: Batch {batch_id} has stale sequence {sequence} (last applied {last_applied})")]
    StaleBatchSequence {
        batch_id: BatchId,
        sequence: u64,
        last_applied: u64,
    },

    // =================================================================
    // Network Errors (5xx)
    // =================================================================
    /// The remote service did not answer in time.
    #[error("TL_ERR_500: Timeout calling {endpoint}")]
    Timeout { endpoint: String },

    /// The remote service could not be reached.
    #[error("TL_ERR_501: Unreachable {endpoint}: {reason}")]
    Unreachable { endpoint: String, reason: String },

    /// The remote service answered with something we could not decode.
    #[error("TL_ERR_502: Unexpected response ({status}): {body}")]
    UnexpectedResponse { status: u16, body: String },

    // =================================================================
    // Safety Errors (8xx)
    // =================================================================
    /// Supply conservation invariant violated. Critical safety alert.
    #[error("TL_ERR_800: Supply invariant violation: {reason}")]
    SupplyInvariantViolation { reason: String },

    // =================================================================
    // General / Internal (9xx)
    // =================================================================
    /// Unrecoverable internal error.
    #[error("TL_ERR_900: Internal error: {0}")]
    Internal(String),

    /// Serialization / deserialization error.
    #[error("TL_ERR_901: Serialization error: {0}")]
    Serialization(String),

    /// Configuration error (invalid config file, missing fields, etc.).
    #[error("TL_ERR_902: Configuration error: {0}")]
    Configuration(String),

    /// I/O error (disk, socket).
    #[error("TL_ERR_903: I/O error: {0}")]
    Io(String),
}

/// Coarse error class, used for propagation policy and HTTP status mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    Authentication,
    Funds,
    Bridge,
    Settlement,
    Network,
    Safety,
    Internal,
}

impl LedgerError {
    /// The `TL_ERR_` code of this error.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidSignature { .. } => "TL_ERR_100",
            Self::ExpiredTimestamp { .. } => "TL_ERR_101",
            Self::NonceReplay { .. } => "TL_ERR_102",
            Self::UnknownAccount(_) => "TL_ERR_103",
            Self::MalformedEnvelope { .. } => "TL_ERR_104",
            Self::InsufficientBalance { .. } => "TL_ERR_200",
            Self::NonPositiveAmount(_) => "TL_ERR_201",
            Self::InsufficientFunds { .. } => "TL_ERR_202",
            Self::UnknownLock(_) => "TL_ERR_300",
            Self::LockNotVerified { .. } => "TL_ERR_301",
            Self::AlreadyReleased(_) => "TL_ERR_302",
            Self::SettlementMismatch { .. } => "TL_ERR_303",
            Self::LockExpired(_) => "TL_ERR_304",
            Self::BridgePending { .. } => "TL_ERR_305",
            Self::BatchAlreadySubmitted(_) => "TL_ERR_400",
            Self::PartialBatchFailure { .. } => "TL_ERR_401",
            Self::UnbalancedBatch { .. } => "TL_ERR_402",
            Self::StaleBatchSequence { .. } => "TL_ERR_403",
            Self::Timeout { .. } => "TL_ERR_500",
            Self::Unreachable { .. } => "TL_ERR_501",
            Self::UnexpectedResponse { .. } => "TL_ERR_502",
            Self::SupplyInvariantViolation { .. } => "TL_ERR_800",
            Self::Internal(_) => "TL_ERR_900",
            Self::Serialization(_) => "TL_ERR_901",
            Self::Configuration(_) => "TL_ERR_902",
            Self::Io(_) => "TL_ERR_903",
        }
    }

    /// Which class this error belongs to.
    #[must_use]
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::InvalidSignature { .. }
            | Self::ExpiredTimestamp { .. }
            | Self::NonceReplay { .. }
            | Self::UnknownAccount(_)
            | Self::MalformedEnvelope { .. } => ErrorClass::Authentication,
            Self::InsufficientBalance { .. }
            | Self::NonPositiveAmount(_)
            | Self::InsufficientFunds { .. } => ErrorClass::Funds,
            Self::UnknownLock(_)
            | Self::LockNotVerified { .. }
            | Self::AlreadyReleased(_)
            | Self::SettlementMismatch { .. }
            | Self::LockExpired(_)
            | Self::BridgePending { .. } => ErrorClass::Bridge,
            Self::BatchAlreadySubmitted(_)
            | Self::PartialBatchFailure { .. }
            | Self::UnbalancedBatch { .. }
            | Self::StaleBatchSequence { .. } => ErrorClass::Settlement,
            Self::Timeout { .. } | Self::Unreachable { .. } | Self::UnexpectedResponse { .. } => {
                ErrorClass::Network
            }
            Self::SupplyInvariantViolation { .. } => ErrorClass::Safety,
            Self::Internal(_) | Self::Serialization(_) | Self::Configuration(_) | Self::Io(_) => {
                ErrorClass::Internal
            }
        }
    }

    /// Only transport failures are worth retrying. Authentication and funds
    /// errors are terminal: a rejected signature or consumed nonce cannot
    /// succeed on a second attempt.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Unreachable { .. })
    }
}

/// Crate-wide `Result` alias.
pub type Result<T> = std::result::Result<T, LedgerError>;

impl From<std::io::Error> for LedgerError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for LedgerError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
