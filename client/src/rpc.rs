//! JSON-RPC client for the ledger's simulate/send endpoints.

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::error::TransportError;

/// The RPC methods the pipeline consumes.
#[async_trait]
pub trait LedgerRpc: Send + Sync {
    async fn simulate_transaction(
        &self,
        envelope_xdr: &str,
    ) -> Result<SimulateTransactionResponse, TransportError>;

    async fn send_transaction(
        &self,
        envelope_xdr: &str,
    ) -> Result<SendTransactionResponse, TransportError>;

    async fn get_transaction(&self, hash: &str) -> Result<GetTransactionResponse, TransportError>;
}

#[derive(Debug, Serialize)]
struct RpcRequest<'a, P: Serialize> {
    jsonrpc: &'static str,
    id: u64,
    method: &'static str,
    params: &'a P,
}

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

#[derive(Debug, Serialize)]
struct TransactionParams<'a> {
    transaction: &'a str,
}

#[derive(Debug, Serialize)]
struct HashParams<'a> {
    hash: &'a str,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulateTransactionResponse {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub transaction_data: Option<String>,
    #[serde(default)]
    pub min_resource_fee: Option<String>,
    #[serde(default)]
    pub results: Vec<SimulateHostFunctionResult>,
    #[serde(default)]
    pub cost: Option<SimulationCost>,
    #[serde(default)]
    pub latest_ledger: u32,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SimulateHostFunctionResult {
    #[serde(default)]
    pub auth: Vec<String>,
    /// Base64 XDR, or a JSON object when the server renders values as JSON.
    #[serde(default)]
    pub xdr: serde_json::Value,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SimulationCost {
    #[serde(default)]
    pub cpu_insns: String,
    #[serde(default)]
    pub mem_bytes: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendTransactionResponse {
    pub status: String,
    #[serde(default)]
    pub hash: String,
    #[serde(default)]
    pub error_result_xdr: Option<String>,
    #[serde(default)]
    pub latest_ledger: u32,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetTransactionResponse {
    pub status: String,
    #[serde(default)]
    pub ledger: Option<u32>,
}

/// HTTP JSON-RPC client.
#[derive(Clone)]
pub struct RpcClient {
    rpc_url: String,
    http: reqwest::Client,
}

impl RpcClient {
    pub fn new(rpc_url: impl Into<String>) -> Self {
        Self {
            rpc_url: rpc_url.into(),
            http: reqwest::Client::new(),
        }
    }

    pub fn rpc_url(&self) -> &str {
        &self.rpc_url
    }

    async fn call<P: Serialize, T: DeserializeOwned>(
        &self,
        method: &'static str,
        params: &P,
    ) -> Result<T, TransportError> {
        let request = RpcRequest {
            jsonrpc: "2.0",
            id: 1,
            method,
            params,
        };

        let resp = self.http.post(&self.rpc_url).json(&request).send().await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(TransportError::Status { status, body });
        }

        let body: RpcResponse<T> = resp.json().await?;
        unwrap_response(method, body)
    }
}

fn unwrap_response<T>(method: &'static str, body: RpcResponse<T>) -> Result<T, TransportError> {
    if let Some(error) = body.error {
        return Err(TransportError::Rpc {
            code: error.code,
            message: error.message,
        });
    }
    body.result.ok_or(TransportError::EmptyResponse(method))
}

#[async_trait]
impl LedgerRpc for RpcClient {
    async fn simulate_transaction(
        &self,
        envelope_xdr: &str,
    ) -> Result<SimulateTransactionResponse, TransportError> {
        self.call(
            "simulateTransaction",
            &TransactionParams {
                transaction: envelope_xdr,
            },
        )
        .await
    }

    async fn send_transaction(
        &self,
        envelope_xdr: &str,
    ) -> Result<SendTransactionResponse, TransportError> {
        self.call(
            "sendTransaction",
            &TransactionParams {
                transaction: envelope_xdr,
            },
        )
        .await
    }

    async fn get_transaction(&self, hash: &str) -> Result<GetTransactionResponse, TransportError> {
        self.call("getTransaction", &HashParams { hash }).await
    }
}
