//! Request bodies and paths shared by the routers and the clients.

use serde::{Deserialize, Serialize};
use twinledger_types::{Address, LockId, constants};

pub const BALANCE: &str = "/balance";
pub const NONCE: &str = "/nonce";
pub const REGISTER: &str = "/accounts/register";
pub const TRANSFER: &str = "/transfer";
pub const BRIDGE_INITIATE: &str = "/bridge/initiate";
pub const BRIDGE_VERIFY: &str = "/bridge/verify-settlement";
pub const BRIDGE_RELEASE: &str = "/bridge/release";
pub const VERIFY_SIGNATURE: &str = "/verify-signature";
pub const BRIDGE_STATS: &str = "/bridge/stats";
pub const BRIDGE_PENDING: &str = "/bridge/pending";
pub const BRIDGE_STATUS: &str = "/bridge/status";
pub const SETTLE_BATCH: &str = "/settle/batch";

pub const BET: &str = "/bet/signed";
pub const WITHDRAW: &str = "/withdraw/signed";
pub const BALANCE_DETAILS: &str = "/balance/details";
pub const SETTLE: &str = "/settle";
pub const SETTLE_STATUS: &str = "/settle/status";
pub const SYNC: &str = "/sync";

pub const HEALTH: &str = "/health";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub public_key: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseRequest {
    pub lock_id: LockId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRequest {
    pub address: Address,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Health {
    pub status: String,
    pub engine: String,
    pub version: String,
    pub role: String,
}

impl Health {
    #[must_use]
    pub fn ok(role: &str) -> Self {
        Self {
            status: "ok".into(),
            engine: constants::ENGINE_NAME.into(),
            version: constants::VERSION.into(),
            role: role.into(),
        }
    }
}
