//! Authority service flows through the async `AuthorityApi` seam.
//!
//! Envelopes are stamped with the wall clock, matching what the service
//! reads. Time travel for expiry goes through `with_ledger`.

use std::sync::Arc;

use rust_decimal::Decimal;
use twinledger_auth::keys::test_signing_key;
use twinledger_auth::{Authenticator, SigningKey, Wallet, sign_batch, sign_settlement_proof};
use twinledger_authority::{AuthorityLedger, AuthorityService};
use twinledger_types::constants::{DEFAULT_LOCK_TTL_SECS, MAX_TIMESTAMP_SKEW_SECS};
use twinledger_types::*;

fn dec(n: i64) -> Decimal {
    Decimal::new(n, 0)
}

fn executor_key() -> SigningKey {
    test_signing_key(200)
}

/// Service with wallet A holding 100 confirmed.
fn service() -> (Arc<AuthorityService>, Wallet, Wallet) {
    let mut ledger = AuthorityLedger::new(
        Authenticator::default(),
        Some(executor_key().verifying_key()),
        DEFAULT_LOCK_TTL_SECS,
    );
    let a = Wallet::from_seed(1);
    let b = Wallet::from_seed(2);
    ledger.deposit(a.address(), dec(100)).unwrap();
    (Arc::new(AuthorityService::new(ledger)), a, b)
}

fn bridge(wallet: &Wallet, target: &Address, amount: Decimal, nonce: u64) -> SignedEnvelope {
    wallet.sign_authority(
        &AuthorityPayload::BridgeInitiate {
            target_address: target.clone(),
            amount,
            target_layer: Layer::Executor,
            bridge_id: None,
        },
        unix_now(),
        nonce,
    )
}

fn proof(lock_id: LockId, beneficiary: &Address, amount: Decimal) -> SettlementProof {
    let mut proof = SettlementProof {
        lock_id,
        market_id: "m-1".into(),
        outcome: "yes".into(),
        beneficiary: beneficiary.clone(),
        amount,
        origin_height: 7,
        origin_signature: String::new(),
    };
    sign_settlement_proof(&mut proof, &executor_key());
    proof
}

#[tokio::test]
async fn lock_mismatch_verify_release() {
    let (svc, a, b) = service();

    // 100 confirmed, lock 25.
    let receipt = svc.initiate_lock(bridge(&a, b.address(), dec(25), 1)).await.unwrap();
    assert_eq!(receipt.source_balance, dec(75));
    assert_eq!(receipt.status, LockStatus::Locked);
    assert_eq!(svc.pending_locks().await.unwrap().len(), 1);

    // Proof for 30 against a 25 lock.
    let err = svc
        .verify_settlement(proof(receipt.lock_id, b.address(), dec(30)))
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::SettlementMismatch { .. }));
    let stats = svc.bridge_stats().await.unwrap();
    assert_eq!(stats.locked, 1);

    // Correct proof, then release twice.
    svc.verify_settlement(proof(receipt.lock_id, b.address(), dec(25)))
        .await
        .unwrap();
    let released = svc.release(receipt.lock_id).await.unwrap();
    assert_eq!(released.amount, dec(25));
    assert_eq!(svc.balance(b.address()).await.unwrap().layer_balance, dec(25));
    assert_eq!(
        svc.release(receipt.lock_id).await.unwrap_err(),
        LedgerError::AlreadyReleased(receipt.lock_id)
    );
    assert_eq!(svc.balance(b.address()).await.unwrap().layer_balance, dec(25));

    let stats = svc.bridge_stats().await.unwrap();
    assert_eq!(stats.released, 1);
    assert_eq!(stats.open_amount, Decimal::ZERO);
    svc.with_ledger(|l| l.verify_supply()).unwrap();
}

#[tokio::test]
async fn stale_timestamp_rejected_regardless_of_signature() {
    let (svc, a, b) = service();
    let stale = unix_now() - 2 * MAX_TIMESTAMP_SKEW_SECS;
    let mut env = a.sign_authority(
        &AuthorityPayload::Transfer {
            to: b.address().clone(),
            amount: dec(1),
        },
        stale,
        1,
    );
    env.signature = "zz".into();
    let err = svc.transfer(env).await.unwrap_err();
    assert!(matches!(err, LedgerError::ExpiredTimestamp { .. }));
    assert_eq!(svc.nonce(a.address()).await.unwrap().nonce, 0);
}

#[tokio::test]
async fn nonces_strictly_increase() {
    let (svc, a, b) = service();
    let send = |nonce| {
        a.sign_authority(
            &AuthorityPayload::Transfer {
                to: b.address().clone(),
                amount: dec(1),
            },
            unix_now(),
            nonce,
        )
    };
    svc.transfer(send(5)).await.unwrap();
    assert!(matches!(
        svc.transfer(send(5)).await,
        Err(LedgerError::NonceReplay { .. })
    ));
    assert!(matches!(
        svc.transfer(send(3)).await,
        Err(LedgerError::NonceReplay { .. })
    ));
    svc.transfer(send(6)).await.unwrap();
    let nonce = svc.nonce(a.address()).await.unwrap();
    assert_eq!(nonce.nonce, 6);
    assert_eq!(nonce.next(), 7);
    assert_eq!(svc.balance(a.address()).await.unwrap().confirmed_balance, dec(98));
}

#[tokio::test]
async fn expired_lock_refunds_source() {
    let (svc, a, b) = service();
    let receipt = svc.initiate_lock(bridge(&a, b.address(), dec(40), 1)).await.unwrap();
    assert_eq!(svc.balance(a.address()).await.unwrap().confirmed_balance, dec(60));

    let later = unix_now() + DEFAULT_LOCK_TTL_SECS + 1;
    let expired = svc.with_ledger(|l| l.expire_stale_locks(later));
    assert_eq!(expired, vec![receipt.lock_id]);
    assert_eq!(svc.balance(a.address()).await.unwrap().confirmed_balance, dec(100));
    assert!(matches!(
        svc.verify_settlement(proof(receipt.lock_id, b.address(), dec(40))).await,
        Err(LedgerError::LockExpired(_))
    ));
    svc.with_ledger(|l| l.verify_supply()).unwrap();
}

#[tokio::test]
async fn batches_apply_once_and_all_or_nothing() {
    let (svc, a, b) = service();
    svc.with_ledger(|l| l.deposit_to_layer(a.address(), dec(50))).unwrap();

    let entry = |w: &Wallet, delta: i64, withdrawal: i64| BatchEntry {
        address: w.address().clone(),
        delta: dec(delta),
        withdrawal: dec(withdrawal),
    };

    // B would go negative: nothing is applied.
    let mut bad = SettlementBatch::new(1, vec![entry(&a, 10, 0), entry(&b, -10, 0)], unix_now());
    sign_batch(&mut bad, &executor_key()).unwrap();
    assert!(matches!(
        svc.submit_batch(bad).await,
        Err(LedgerError::PartialBatchFailure { .. })
    ));
    assert_eq!(svc.balance(a.address()).await.unwrap().layer_balance, dec(50));
    assert_eq!(svc.balance(b.address()).await.unwrap().executor_batch_sequence, 0);

    let mut good =
        SettlementBatch::new(1, vec![entry(&a, -30, 5), entry(&b, 25, 0)], unix_now());
    sign_batch(&mut good, &executor_key()).unwrap();
    let ack = svc.submit_batch(good.clone()).await.unwrap();
    assert!(!ack.duplicate);
    let again = svc.submit_batch(good).await.unwrap();
    assert!(again.duplicate);

    let a_bal = svc.balance(a.address()).await.unwrap();
    assert_eq!(a_bal.layer_balance, dec(20));
    assert_eq!(a_bal.confirmed_balance, dec(105));
    assert_eq!(svc.balance(b.address()).await.unwrap().layer_balance, dec(25));
    assert_eq!(a_bal.executor_batch_sequence, 1);
    svc.with_ledger(|l| l.verify_supply()).unwrap();
}

#[tokio::test]
async fn concurrent_transfers_keep_supply() {
    let (svc, a, b) = service();
    let mut handles = Vec::new();
    for nonce in 1..=20u64 {
        let svc = Arc::clone(&svc);
        let env = a.sign_authority(
            &AuthorityPayload::Transfer {
                to: b.address().clone(),
                amount: dec(1),
            },
            unix_now(),
            nonce,
        );
        handles.push(tokio::spawn(async move { svc.transfer(env).await }));
    }
    let mut accepted: i64 = 0;
    for h in handles {
        if h.await.unwrap().is_ok() {
            accepted += 1;
        }
    }
    // Out-of-order arrivals may be rejected as replays, never double-applied.
    let a_bal = svc.balance(a.address()).await.unwrap().confirmed_balance;
    let b_bal = svc.balance(b.address()).await.unwrap().confirmed_balance;
    assert_eq!(a_bal + b_bal, dec(100));
    assert_eq!(b_bal, Decimal::from(accepted));
    svc.with_ledger(|l| l.verify_supply()).unwrap();
}

#[tokio::test]
async fn verify_signature_and_register() {
    let (svc, a, b) = service();
    let reg = svc.register_account(&b.public_key_hex()).await.unwrap();
    assert_eq!(&reg.address, b.address());
    assert!(reg.created);

    let env = a.sign_authority(
        &AuthorityPayload::Transfer {
            to: b.address().clone(),
            amount: dec(1),
        },
        unix_now(),
        1,
    );
    let check = svc.verify_signature(env.clone()).await.unwrap();
    assert!(check.valid);
    assert_eq!(svc.nonce(a.address()).await.unwrap().nonce, 0);
    svc.transfer(env).await.unwrap();
}
