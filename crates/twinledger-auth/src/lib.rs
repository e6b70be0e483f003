//! # twinledger-auth
//!
//! The **Signed Envelope Authenticator** and the signing primitives shared by
//! both ledgers.
//!
//! ## Components
//!
//! - [`keys`]: hex key decoding, key generation, deterministic test keys
//! - [`wallet`]: [`Wallet`], the client-side envelope signer
//! - [`authenticator`]: [`Authenticator::verify`], producing a [`VerifiedEnvelope`]
//! - [`nonce_book`]: [`NonceBook`], per-address last accepted nonce
//! - [`proof`]: settlement-proof and batch signatures
//!
//! ## Verification order
//!
//! 1. Timestamp skew (`ExpiredTimestamp`), before anything cryptographic
//! 2. Key and signature decoding (`InvalidSignature`)
//! 3. Address binding and expected key (`InvalidSignature`)
//! 4. ed25519 signature (`InvalidSignature`)
//! 5. Nonce ordering (`NonceReplay`)
//!
//! A [`VerifiedEnvelope`] can only be produced by [`Authenticator::verify`].
//! The owning ledger applies its state transition and then calls
//! [`NonceBook::commit`] under the same lock, so a rejected transition never
//! consumes a nonce.

pub mod authenticator;
pub mod keys;
pub mod nonce_book;
pub mod proof;
pub mod wallet;

pub use authenticator::{Authenticator, VerifiedEnvelope};
pub use keys::{generate_signing_key, public_key_hex, signing_key_from_hex, verifying_key_from_hex};
pub use nonce_book::NonceBook;
pub use proof::{sign_batch, sign_settlement_proof, verify_batch_signature, verify_settlement_proof};
pub use wallet::{Wallet, create as create_envelope};

pub use ed25519_dalek::{SigningKey, VerifyingKey};
