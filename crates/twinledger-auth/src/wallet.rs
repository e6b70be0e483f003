//! Client-side envelope signing.

use ed25519_dalek::{Signer, SigningKey};
use twinledger_types::{Address, AuthorityPayload, ExecutorPayload, SignedEnvelope};

use crate::keys;

/// Sign `payload` at `timestamp` with `nonce`.
#[must_use]
pub fn create(payload: &str, timestamp: u64, nonce: u64, key: &SigningKey) -> SignedEnvelope {
    let message = SignedEnvelope::signing_message(payload, timestamp, nonce);
    let signature = key.sign(message.as_bytes());
    SignedEnvelope {
        public_key: keys::public_key_hex(key),
        wallet_address: keys::address_of(key),
        payload: payload.to_string(),
        timestamp,
        nonce,
        signature: hex::encode(signature.to_bytes()),
    }
}

/// A signing key together with its derived address.
#[derive(Debug, Clone)]
pub struct Wallet {
    key: SigningKey,
    address: Address,
}

impl Wallet {
    #[must_use]
    pub fn new(key: SigningKey) -> Self {
        let address = keys::address_of(&key);
        Self { key, address }
    }

    #[must_use]
    pub fn generate() -> Self {
        Self::new(keys::generate_signing_key())
    }

    #[must_use]
    pub fn address(&self) -> &Address {
        &self.address
    }

    #[must_use]
    pub fn public_key_hex(&self) -> String {
        keys::public_key_hex(&self.key)
    }

    #[must_use]
    pub fn signing_key(&self) -> &SigningKey {
        &self.key
    }

    /// Sign an Authority action.
    #[must_use]
    pub fn sign_authority(
        &self,
        payload: &AuthorityPayload,
        timestamp: u64,
        nonce: u64,
    ) -> SignedEnvelope {
        create(&payload.to_json(), timestamp, nonce, &self.key)
    }

    /// Sign an Executor action.
    #[must_use]
    pub fn sign_executor(
        &self,
        payload: &ExecutorPayload,
        timestamp: u64,
        nonce: u64,
    ) -> SignedEnvelope {
        create(&payload.to_json(), timestamp, nonce, &self.key)
    }
}

/// Deterministic wallet for tests. **Never use in production.**
#[cfg(any(test, feature = "test-helpers"))]
impl Wallet {
    #[must_use]
    pub fn from_seed(seed: u8) -> Self {
        Self::new(keys::test_signing_key(seed))
    }
}
