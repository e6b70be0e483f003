//! Envelope verification.

use ed25519_dalek::Verifier;
use serde::de::DeserializeOwned;
use tracing::debug;
use twinledger_types::{Address, LedgerError, Result, SignedEnvelope, constants};

use crate::keys;

/// An envelope that passed every authentication check against a given
/// `last_accepted_nonce`. Only [`Authenticator::verify`] constructs one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedEnvelope {
    address: Address,
    public_key: String,
    nonce: u64,
    timestamp: u64,
    payload: String,
}

impl VerifiedEnvelope {
    #[must_use]
    pub fn address(&self) -> &Address {
        &self.address
    }

    #[must_use]
    pub fn public_key(&self) -> &str {
        &self.public_key
    }

    #[must_use]
    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    #[must_use]
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// Decode the signed payload.
    pub fn parse_payload<P: DeserializeOwned>(&self) -> Result<P> {
        serde_json::from_str(&self.payload).map_err(|e| LedgerError::MalformedEnvelope {
            reason: e.to_string(),
        })
    }
}

/// Stateless envelope verifier. The nonce state lives with the caller.
#[derive(Debug, Clone, Copy)]
pub struct Authenticator {
    max_skew_secs: u64,
}

impl Authenticator {
    #[must_use]
    pub fn new(max_skew_secs: u64) -> Self {
        Self { max_skew_secs }
    }

    #[must_use]
    pub fn max_skew_secs(&self) -> u64 {
        self.max_skew_secs
    }

    /// Verify `envelope` at time `now`.
    ///
    /// `expected_public_key` is the key bound to the account, if any. The
    /// envelope's nonce must exceed `last_accepted_nonce`. Nothing is
    /// recorded; see [`crate::NonceBook::commit`].
    pub fn verify(
        &self,
        envelope: &SignedEnvelope,
        expected_public_key: Option<&str>,
        last_accepted_nonce: u64,
        now: u64,
    ) -> Result<VerifiedEnvelope> {
        // Stale envelopes are rejected before any key material is looked at.
        if now.abs_diff(envelope.timestamp) > self.max_skew_secs {
            debug!(
                address = %envelope.wallet_address,
                timestamp = envelope.timestamp,
                now,
                "envelope outside skew window"
            );
            return Err(LedgerError::ExpiredTimestamp {
                timestamp: envelope.timestamp,
                now,
                max_skew_secs: self.max_skew_secs,
            });
        }

        let public_key = envelope.public_key.to_ascii_lowercase();
        let verifying_key = keys::verifying_key_from_hex(&public_key)?;
        let signature = keys::signature_from_hex(&envelope.signature)?;

        let derived = Address::from_public_key(&verifying_key.to_bytes());
        if derived != envelope.wallet_address {
            return Err(LedgerError::InvalidSignature {
                reason: format!(
                    "wallet address {} does not match public key (expected {derived})",
                    envelope.wallet_address
                ),
            });
        }
        if expected_public_key.is_some_and(|expected| !expected.eq_ignore_ascii_case(&public_key)) {
            return Err(LedgerError::InvalidSignature {
                reason: "public key differs from the key bound to this account".into(),
            });
        }

        verifying_key
            .verify(&envelope.signing_bytes(), &signature)
            .map_err(|_| LedgerError::InvalidSignature {
                reason: "ed25519 verification failed".into(),
            })?;

        if envelope.nonce <= last_accepted_nonce {
            return Err(LedgerError::NonceReplay {
                address: derived,
                nonce: envelope.nonce,
                last_accepted: last_accepted_nonce,
            });
        }

        Ok(VerifiedEnvelope {
            address: derived,
            public_key,
            nonce: envelope.nonce,
            timestamp: envelope.timestamp,
            payload: envelope.payload.clone(),
        })
    }
}

impl Default for Authenticator {
    fn default() -> Self {
        Self::new(constants::MAX_TIMESTAMP_SKEW_SECS)
    }
}
