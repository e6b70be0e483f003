//! # Signed envelopes
//!
//! Every mutating client action travels as a [`SignedEnvelope`]: a JSON
//! payload plus the signer's public key, a unix timestamp and a nonce, bound
//! together by an ed25519 signature over
//!
//! ```text
//! payload || "\n" || timestamp || "\n" || nonce
//! ```
//!
//! Payloads are tagged JSON (`"type"` discriminator). The tag sets of
//! [`AuthorityPayload`] and [`ExecutorPayload`] are disjoint, so an envelope
//! signed for one ledger is malformed on the other and can never be replayed
//! across layers.

use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::{Address, BridgeId, Layer, LedgerError};

/// An authenticated, replay-protected client request.
///
/// Immutable once signed. Each envelope is accepted at most once per ledger:
/// the nonce must be strictly greater than the account's last accepted nonce.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedEnvelope {
    /// Signer's ed25519 public key, 64 hex characters.
    pub public_key: String,
    /// Address derived from `public_key`.
    pub wallet_address: Address,
    /// JSON text of the payload (signed verbatim).
    pub payload: String,
    /// Unix seconds at signing time.
    pub timestamp: u64,
    /// Strictly increasing per account and per ledger.
    pub nonce: u64,
    /// ed25519 signature, 128 hex characters.
    pub signature: String,
}

impl SignedEnvelope {
    /// The exact message that is signed for the given parts.
    #[must_use]
    pub fn signing_message(payload: &str, timestamp: u64, nonce: u64) -> String {
        format!("{payload}\n{timestamp}\n{nonce}")
    }

    /// Bytes covered by this envelope's signature.
    #[must_use]
    pub fn signing_bytes(&self) -> Vec<u8> {
        Self::signing_message(&self.payload, self.timestamp, self.nonce).into_bytes()
    }

    /// Decode the payload into a ledger-specific payload type.
    ///
    /// # Errors
    /// `MalformedEnvelope` if the JSON does not match `P`.
    pub fn parse_payload<P: DeserializeOwned>(&self) -> crate::Result<P> {
        serde_json::from_str(&self.payload).map_err(|e| LedgerError::MalformedEnvelope {
            reason: e.to_string(),
        })
    }
}

/// Actions accepted by the Authority ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthorityPayload {
    /// Move confirmed balance to another account.
    Transfer { to: Address, amount: Decimal },
    /// Lock confirmed balance in escrow for a cross-layer credit.
    BridgeInitiate {
        target_address: Address,
        amount: Decimal,
        target_layer: Layer,
        /// Client idempotency key. Generated by the ledger when absent.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        bridge_id: Option<BridgeId>,
    },
}

impl AuthorityPayload {
    #[must_use]
    pub fn amount(&self) -> Decimal {
        match self {
            Self::Transfer { amount, .. } | Self::BridgeInitiate { amount, .. } => *amount,
        }
    }

    /// Serialise to the payload JSON text that gets signed.
    #[must_use]
    pub fn to_json(&self) -> String {
        // A tagged enum of plain fields cannot fail to serialise.
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Actions accepted by the Executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExecutorPayload {
    /// Stake `amount` on `outcome` of `market_id`.
    Bet {
        market_id: String,
        outcome: String,
        amount: Decimal,
    },
    /// Move available balance to another Executor account.
    ExecutorTransfer { to: Address, amount: Decimal },
    /// Move available balance back to the Authority on the next settlement.
    Withdraw { amount: Decimal },
}

impl ExecutorPayload {
    #[must_use]
    pub fn amount(&self) -> Decimal {
        match self {
            Self::Bet { amount, .. }
            | Self::ExecutorTransfer { amount, .. }
            | Self::Withdraw { amount } => *amount,
        }
    }

    /// Short action name used in receipts and logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Bet { .. } => "bet",
            Self::ExecutorTransfer { .. } => "transfer",
            Self::Withdraw { .. } => "withdraw",
        }
    }

    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}
