//! Receipts returned by mutating operations.
//!
//! Each receipt reports the post-state the caller needs, so clients do not
//! have to issue a second read to learn the outcome.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{Address, BridgeId, Layer, LockId, LockStatus};

/// Authority `POST /transfer`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferReceipt {
    pub from: Address,
    pub to: Address,
    pub amount: Decimal,
    /// Sender's confirmed balance after the transfer.
    pub from_balance: Decimal,
    pub nonce: u64,
}

/// Authority `POST /bridge/initiate`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockReceipt {
    pub lock_id: LockId,
    pub bridge_id: BridgeId,
    pub source: Address,
    pub target_address: Address,
    pub target_layer: Layer,
    pub amount: Decimal,
    pub status: LockStatus,
    /// Source confirmed balance after the debit.
    pub source_balance: Decimal,
    pub expires_at: u64,
    /// `true` when the `bridge_id` was already known and no new lock was made.
    pub existing: bool,
}

/// Authority `POST /bridge/verify-settlement`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifySettlementResponse {
    pub lock_id: LockId,
    pub release_authorized: bool,
    pub status: LockStatus,
}

/// Authority `POST /bridge/release`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseReceipt {
    pub lock_id: LockId,
    pub beneficiary: Address,
    pub amount: Decimal,
    pub layer: Layer,
    pub released_at: u64,
}

/// Authority `POST /accounts/register`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub address: Address,
    pub public_key: String,
    /// `false` if the account already existed.
    pub created: bool,
}

/// Executor `POST /bet/signed` and `POST /withdraw/signed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionReceipt {
    pub address: Address,
    /// `bet`, `transfer`, `withdraw` or `payout`.
    pub action: String,
    pub amount: Decimal,
    /// Actor's available balance after the action.
    pub available: Decimal,
    pub pending_delta: Decimal,
    pub nonce: u64,
}
