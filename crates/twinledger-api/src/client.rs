//! reqwest clients implementing the service traits over HTTP.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;
use twinledger_types::{
    ActionReceipt, Address, AuthorityApi, AuthorityBalance, BatchAck, BridgeId, BridgeLock,
    BridgeStats, ExecutorApi, ExecutorBalance, ExecutorPayload, LedgerError, LockId,
    LockReceipt, NonceResponse, RegisterResponse, ReleaseReceipt, Result, SettlementBatch,
    SettlementProof, SettlementReport, SettlementStatus, SignatureCheck, SignedEnvelope,
    TransferReceipt, VerifySettlementResponse,
};

use crate::error::ErrorBody;
use crate::wire::{self, RegisterRequest, ReleaseRequest, SyncRequest};

/// Map a transport failure onto the network error classes.
fn transport_error(url: &str, err: &reqwest::Error) -> LedgerError {
    if err.is_timeout() {
        LedgerError::Timeout {
            endpoint: url.to_string(),
        }
    } else {
        LedgerError::Unreachable {
            endpoint: url.to_string(),
            reason: err.to_string(),
        }
    }
}

/// JSON over HTTP with typed error decoding.
#[derive(Debug, Clone)]
struct HttpClient {
    client: Client,
    base_url: String,
}

impl HttpClient {
    fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LedgerError::Configuration(format!("http client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        debug!(url = %url, "GET");
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| transport_error(&url, &e))?;
        Self::decode(&url, response).await
    }

    async fn post<B: Serialize + Sync, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        debug!(url = %url, "POST");
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| transport_error(&url, &e))?;
        Self::decode(&url, response).await
    }

    async fn decode<T: DeserializeOwned>(url: &str, response: Response) -> Result<T> {
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| transport_error(url, &e))?;
        if status.is_success() {
            return serde_json::from_str(&text).map_err(|e| LedgerError::UnexpectedResponse {
                status: status.as_u16(),
                body: format!("{e}: {text}"),
            });
        }
        match serde_json::from_str::<ErrorBody>(&text) {
            Ok(body) => Err(body.error),
            Err(_) => Err(LedgerError::UnexpectedResponse {
                status: status.as_u16(),
                body: text,
            }),
        }
    }
}

/// [`AuthorityApi`] over HTTP.
#[derive(Debug, Clone)]
pub struct AuthorityClient {
    http: HttpClient,
}

impl AuthorityClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            http: HttpClient::new(base_url, timeout)?,
        })
    }
}

#[async_trait]
impl AuthorityApi for AuthorityClient {
    async fn balance(&self, address: &Address) -> Result<AuthorityBalance> {
        self.http.get(&format!("{}/{address}", wire::BALANCE)).await
    }

    async fn nonce(&self, address: &Address) -> Result<NonceResponse> {
        self.http.get(&format!("{}/{address}", wire::NONCE)).await
    }

    async fn register_account(&self, public_key_hex: &str) -> Result<RegisterResponse> {
        let req = RegisterRequest {
            public_key: public_key_hex.to_string(),
        };
        self.http.post(wire::REGISTER, &req).await
    }

    async fn transfer(&self, envelope: SignedEnvelope) -> Result<TransferReceipt> {
        self.http.post(wire::TRANSFER, &envelope).await
    }

    async fn initiate_lock(&self, envelope: SignedEnvelope) -> Result<LockReceipt> {
        self.http.post(wire::BRIDGE_INITIATE, &envelope).await
    }

    async fn verify_settlement(&self, proof: SettlementProof) -> Result<VerifySettlementResponse> {
        self.http.post(wire::BRIDGE_VERIFY, &proof).await
    }

    async fn release(&self, lock_id: LockId) -> Result<ReleaseReceipt> {
        self.http
            .post(wire::BRIDGE_RELEASE, &ReleaseRequest { lock_id })
            .await
    }

    async fn verify_signature(&self, envelope: SignedEnvelope) -> Result<SignatureCheck> {
        self.http.post(wire::VERIFY_SIGNATURE, &envelope).await
    }

    async fn bridge_stats(&self) -> Result<BridgeStats> {
        self.http.get(wire::BRIDGE_STATS).await
    }

    async fn pending_locks(&self) -> Result<Vec<BridgeLock>> {
        self.http.get(wire::BRIDGE_PENDING).await
    }

    async fn bridge_status(&self, bridge_id: BridgeId) -> Result<Option<BridgeLock>> {
        self.http
            .get(&format!("{}/{}", wire::BRIDGE_STATUS, bridge_id.0))
            .await
    }

    async fn submit_batch(&self, batch: SettlementBatch) -> Result<BatchAck> {
        self.http.post(wire::SETTLE_BATCH, &batch).await
    }
}

/// [`ExecutorApi`] over HTTP.
#[derive(Debug, Clone)]
pub struct ExecutorClient {
    http: HttpClient,
}

impl ExecutorClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            http: HttpClient::new(base_url, timeout)?,
        })
    }
}

#[async_trait]
impl ExecutorApi for ExecutorClient {
    async fn apply_action(&self, envelope: SignedEnvelope) -> Result<ActionReceipt> {
        let path = match envelope.parse_payload::<ExecutorPayload>()? {
            ExecutorPayload::Withdraw { .. } => wire::WITHDRAW,
            _ => wire::BET,
        };
        self.http.post(path, &envelope).await
    }

    async fn balance(&self, address: &Address) -> Result<ExecutorBalance> {
        self.http
            .get(&format!("{}/{address}", wire::BALANCE_DETAILS))
            .await
    }

    async fn nonce(&self, address: &Address) -> Result<NonceResponse> {
        self.http.get(&format!("{}/{address}", wire::NONCE)).await
    }

    async fn sync(&self, address: &Address) -> Result<ExecutorBalance> {
        let req = SyncRequest {
            address: address.clone(),
        };
        self.http.post(wire::SYNC, &req).await
    }

    async fn settle(&self) -> Result<SettlementReport> {
        self.http.post(wire::SETTLE, &serde_json::json!({})).await
    }

    async fn settlement_status(&self) -> Result<SettlementStatus> {
        self.http.get(wire::SETTLE_STATUS).await
    }
}
