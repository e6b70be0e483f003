//! Executor-side signatures over settlement proofs and batches.
//!
//! Both are signed by the Executor's authority key and checked by the
//! Authority against the configured Executor public key.

use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};
use twinledger_types::{LedgerError, Result, SettlementBatch, SettlementProof};

use crate::keys;

/// Fill `proof.origin_signature`.
pub fn sign_settlement_proof(proof: &mut SettlementProof, key: &SigningKey) {
    let signature = key.sign(&proof.signing_payload());
    proof.origin_signature = hex::encode(signature.to_bytes());
}

/// Check `proof.origin_signature` against the Executor key.
pub fn verify_settlement_proof(proof: &SettlementProof, key: &VerifyingKey) -> Result<()> {
    let signature = keys::signature_from_hex(&proof.origin_signature)?;
    key.verify(&proof.signing_payload(), &signature)
        .map_err(|_| LedgerError::InvalidSignature {
            reason: format!("settlement proof for {} not signed by executor", proof.lock_id),
        })
}

/// Fill `batch.signature` over the digest bytes.
pub fn sign_batch(batch: &mut SettlementBatch, key: &SigningKey) -> Result<()> {
    let digest = hex::decode(&batch.digest)
        .map_err(|e| LedgerError::Internal(format!("batch digest is not hex: {e}")))?;
    batch.signature = hex::encode(key.sign(&digest).to_bytes());
    Ok(())
}

/// Check that the digest matches the content and is signed by the Executor.
pub fn verify_batch_signature(batch: &SettlementBatch, key: &VerifyingKey) -> Result<()> {
    if !batch.verify_digest() {
        return Err(LedgerError::InvalidSignature {
            reason: format!("digest of {} does not match its entries", batch.batch_id),
        });
    }
    let digest = hex::decode(&batch.digest).map_err(|e| LedgerError::InvalidSignature {
        reason: format!("batch digest is not hex: {e}"),
    })?;
    let signature = keys::signature_from_hex(&batch.signature)?;
    key.verify(&digest, &signature)
        .map_err(|_| LedgerError::InvalidSignature {
            reason: format!("{} not signed by executor", batch.batch_id),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::test_signing_key;
    use rust_decimal::Decimal;
    use twinledger_types::{Address, BatchEntry, LockId};

    fn proof() -> SettlementProof {
        SettlementProof {
            lock_id: LockId::new(),
            market_id: "bridge".into(),
            outcome: "credited".into(),
            beneficiary: Address::from("TL_B"),
            amount: Decimal::new(25, 0),
            origin_height: 0,
            origin_signature: String::new(),
        }
    }

    fn batch() -> SettlementBatch {
        SettlementBatch::new(
            1,
            vec![
                BatchEntry {
                    address: Address::from("TL_A"),
                    delta: Decimal::new(-5, 0),
                    withdrawal: Decimal::ZERO,
                },
                BatchEntry {
                    address: Address::from("TL_B"),
                    delta: Decimal::new(5, 0),
                    withdrawal: Decimal::ZERO,
                },
            ],
            0,
        )
    }

    #[test]
    fn signed_proof_verifies() {
        let key = test_signing_key(7);
        let mut p = proof();
        sign_settlement_proof(&mut p, &key);
        assert!(verify_settlement_proof(&p, &key.verifying_key()).is_ok());
    }

    #[test]
    fn proof_with_altered_amount_fails() {
        let key = test_signing_key(7);
        let mut p = proof();
        sign_settlement_proof(&mut p, &key);
        p.amount = Decimal::new(30, 0);
        assert!(verify_settlement_proof(&p, &key.verifying_key()).is_err());
    }

    #[test]
    fn proof_signed_by_other_key_fails() {
        let mut p = proof();
        sign_settlement_proof(&mut p, &test_signing_key(1));
        let err = verify_settlement_proof(&p, &test_signing_key(2).verifying_key()).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidSignature { .. }));
    }

    #[test]
    fn unsigned_proof_fails() {
        let p = proof();
        assert!(verify_settlement_proof(&p, &test_signing_key(1).verifying_key()).is_err());
    }

    #[test]
    fn signed_batch_verifies() {
        let key = test_signing_key(7);
        let mut b = batch();
        sign_batch(&mut b, &key).unwrap();
        assert!(verify_batch_signature(&b, &key.verifying_key()).is_ok());
    }

    #[test]
    fn batch_with_tampered_entry_fails() {
        let key = test_signing_key(7);
        let mut b = batch();
        sign_batch(&mut b, &key).unwrap();
        b.entries[0].delta = Decimal::new(-6, 0);
        assert!(verify_batch_signature(&b, &key.verifying_key()).is_err());
    }

    #[test]
    fn batch_signed_by_stranger_fails() {
        let mut b = batch();
        sign_batch(&mut b, &test_signing_key(3)).unwrap();
        assert!(verify_batch_signature(&b, &test_signing_key(7).verifying_key()).is_err());
    }
}
