//! ed25519 key handling.

use ed25519_dalek::{SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use twinledger_types::{Address, LedgerError, Result};

/// Fresh random signing key from the OS RNG.
#[must_use]
pub fn generate_signing_key() -> SigningKey {
    SigningKey::generate(&mut OsRng)
}

/// Hex of the 32-byte public key.
#[must_use]
pub fn public_key_hex(key: &SigningKey) -> String {
    hex::encode(key.verifying_key().to_bytes())
}

/// Address owned by a signing key.
#[must_use]
pub fn address_of(key: &SigningKey) -> Address {
    Address::from_public_key(&key.verifying_key().to_bytes())
}

/// Decode a 32-byte hex secret key (configuration input).
pub fn signing_key_from_hex(secret_hex: &str) -> Result<SigningKey> {
    let bytes: [u8; 32] = hex::decode(secret_hex.trim())
        .map_err(|e| LedgerError::Configuration(format!("signing key is not hex: {e}")))?
        .try_into()
        .map_err(|_| LedgerError::Configuration("signing key must be 32 bytes".into()))?;
    Ok(SigningKey::from_bytes(&bytes))
}

/// Decode a 32-byte hex public key.
pub fn verifying_key_from_hex(public_hex: &str) -> Result<VerifyingKey> {
    let bytes: [u8; 32] = hex::decode(public_hex)
        .map_err(|e| LedgerError::InvalidSignature {
            reason: format!("public key is not hex: {e}"),
        })?
        .try_into()
        .map_err(|_| LedgerError::InvalidSignature {
            reason: "public key must be 32 bytes".into(),
        })?;
    VerifyingKey::from_bytes(&bytes).map_err(|e| LedgerError::InvalidSignature {
        reason: format!("public key rejected: {e}"),
    })
}

/// Decode a 64-byte hex signature.
pub(crate) fn signature_from_hex(signature_hex: &str) -> Result<ed25519_dalek::Signature> {
    let bytes: [u8; 64] = hex::decode(signature_hex)
        .map_err(|e| LedgerError::InvalidSignature {
            reason: format!("signature is not hex: {e}"),
        })?
        .try_into()
        .map_err(|_| LedgerError::InvalidSignature {
            reason: "signature must be 64 bytes".into(),
        })?;
    Ok(ed25519_dalek::Signature::from_bytes(&bytes))
}

/// Deterministic key for tests. **Never use in production.**
#[cfg(any(test, feature = "test-helpers"))]
#[must_use]
pub fn test_signing_key(seed: u8) -> SigningKey {
    SigningKey::from_bytes(&[seed; 32])
}
