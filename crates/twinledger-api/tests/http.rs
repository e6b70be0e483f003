//! Routers exercised in-process with `oneshot`, and both services wired
//! together over real loopback HTTP.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use rust_decimal::Decimal;
use tokio::net::TcpListener;
use tower::ServiceExt;
use twinledger_api::{
    AuthorityClient, ErrorBody, ExecutorClient, authority_router, executor_router,
};
use twinledger_auth::keys::test_signing_key;
use twinledger_auth::{Authenticator, Wallet};
use twinledger_authority::{AuthorityLedger, AuthorityService};
use twinledger_bridge::AutoBridge;
use twinledger_executor::{ExecutorLedger, ExecutorService};
use twinledger_types::constants::DEFAULT_LOCK_TTL_SECS;
use twinledger_types::*;

fn dec(n: i64) -> Decimal {
    Decimal::new(n, 0)
}

fn house() -> Address {
    Address::from("TL_HOUSE")
}

/// Alice holds 100 confirmed; the house 1000 on the layer.
fn authority_service() -> (Arc<AuthorityService>, Wallet) {
    let mut ledger = AuthorityLedger::new(
        Authenticator::default(),
        Some(test_signing_key(200).verifying_key()),
        DEFAULT_LOCK_TTL_SECS,
    );
    let alice = Wallet::from_seed(1);
    ledger.deposit(alice.address(), dec(100)).unwrap();
    ledger.deposit_to_layer(&house(), dec(1000)).unwrap();
    (Arc::new(AuthorityService::new(ledger)), alice)
}

fn executor_service(authority: Arc<dyn AuthorityApi>) -> Arc<ExecutorService> {
    Arc::new(ExecutorService::new(
        ExecutorLedger::new(Authenticator::default(), house()),
        authority,
        test_signing_key(200),
        RetryPolicy::immediate(2),
    ))
}

fn json_request(method: &str, uri: &str, body: &impl serde::Serialize) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_string(body).unwrap()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn read<T: serde::de::DeserializeOwned>(resp: axum::response::Response) -> T {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn spawn(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn authority_balance_route() {
    let (service, alice) = authority_service();
    let app = authority_router(service);

    let resp = app
        .oneshot(get(&format!("/balance/{}", alice.address())))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let balance: AuthorityBalance = read(resp).await;
    assert_eq!(&balance.address, alice.address());
    assert_eq!(balance.confirmed_balance, dec(100));
    assert_eq!(balance.nonce, 0);
}

#[tokio::test]
async fn replayed_transfer_is_unauthorized_with_typed_body() {
    let (service, alice) = authority_service();
    let app = authority_router(service);
    let env = alice.sign_authority(
        &AuthorityPayload::Transfer {
            to: Address::from("TL_BOB"),
            amount: dec(10),
        },
        unix_now(),
        1,
    );

    let first = app
        .clone()
        .oneshot(json_request("POST", "/transfer", &env))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    let receipt: TransferReceipt = read(first).await;
    assert_eq!(receipt.from_balance, dec(90));

    let replay = app
        .oneshot(json_request("POST", "/transfer", &env))
        .await
        .unwrap();
    assert_eq!(replay.status(), StatusCode::UNAUTHORIZED);
    let body: ErrorBody = read(replay).await;
    assert_eq!(body.code, "TL_ERR_102");
    assert!(matches!(body.error, LedgerError::NonceReplay { nonce: 1, .. }));
}

#[tokio::test]
async fn unknown_bridge_status_is_null() {
    let (service, _) = authority_service();
    let resp = authority_router(service)
        .oneshot(get(&format!("/bridge/status/{}", BridgeId::new().0)))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let lock: Option<BridgeLock> = read(resp).await;
    assert!(lock.is_none());
}

#[tokio::test]
async fn withdraw_route_rejects_bets() {
    let (authority, alice) = authority_service();
    let executor = executor_service(authority);
    let env = alice.sign_executor(
        &ExecutorPayload::Bet {
            market_id: "m-1".into(),
            outcome: "yes".into(),
            amount: dec(1),
        },
        unix_now(),
        1,
    );
    let resp = executor_router(executor)
        .oneshot(json_request("POST", "/withdraw/signed", &env))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: ErrorBody = read(resp).await;
    assert_eq!(body.code, "TL_ERR_104");
}

#[tokio::test]
async fn executor_health_and_status_routes() {
    let (authority, _) = authority_service();
    let app = executor_router(executor_service(authority));

    let health = app.clone().oneshot(get("/health")).await.unwrap();
    assert_eq!(health.status(), StatusCode::OK);

    let status = app.oneshot(get("/settle/status")).await.unwrap();
    assert_eq!(status.status(), StatusCode::OK);
    let status: SettlementStatus = read(status).await;
    assert_eq!(status.confirmed_batches, 0);
    assert_eq!(status.unsettled_accounts, 0);
}

#[tokio::test]
async fn services_over_http() {
    let (authority, alice) = authority_service();
    let authority_url = spawn(authority_router(Arc::clone(&authority) as Arc<dyn AuthorityApi>)).await;
    let timeout = Duration::from_secs(5);

    let authority_client: Arc<dyn AuthorityApi> =
        Arc::new(AuthorityClient::new(&authority_url, timeout).unwrap());
    let executor = executor_service(Arc::clone(&authority_client));
    let executor_url = spawn(executor_router(executor)).await;
    let executor_client: Arc<dyn ExecutorApi> =
        Arc::new(ExecutorClient::new(&executor_url, timeout).unwrap());

    // Typed errors survive the round trip.
    let missing = LockId::new();
    assert_eq!(
        authority_client.release(missing).await.unwrap_err(),
        LedgerError::UnknownLock(missing)
    );

    // Bet 40 with nothing on the Executor: the auto-bridge locks 40 first.
    let auto = AutoBridge::new(
        Arc::clone(&authority_client),
        Arc::clone(&executor_client),
        BridgeConfig {
            retry: RetryPolicy::immediate(2),
            poll: PollPolicy {
                attempts: 5,
                interval_ms: 10,
            },
        },
    );
    let receipt = auto
        .execute(
            &alice,
            &ExecutorPayload::Bet {
                market_id: "m-1".into(),
                outcome: "yes".into(),
                amount: dec(40),
            },
        )
        .await
        .unwrap();
    assert_eq!(receipt.available, Decimal::ZERO);

    let report = executor_client.settle().await.unwrap();
    assert_eq!(report.sequence, Some(1));
    assert_eq!(report.settled_volume, dec(40));

    let remote = authority_client.balance(alice.address()).await.unwrap();
    assert_eq!(remote.confirmed_balance, dec(60));
    assert_eq!(remote.layer_balance, Decimal::ZERO);
    assert_eq!(
        authority_client.balance(&house()).await.unwrap().layer_balance,
        dec(1040)
    );
    authority.with_ledger(|l| l.verify_supply()).unwrap();

    let local = executor_client.balance(alice.address()).await.unwrap();
    assert_eq!(local.pending_delta, Decimal::ZERO);
    assert_eq!(executor_client.nonce(alice.address()).await.unwrap().nonce, 1);
}
