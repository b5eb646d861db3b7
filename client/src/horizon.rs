//! Account sequence lookup against the ledger-state service (Horizon).

use async_trait::async_trait;
use serde::Deserialize;

use crate::address::Address;
use crate::error::TransportError;
use crate::transaction::SourceAccount;

/// Where sequence numbers come from.
#[async_trait]
pub trait AccountSource: Send + Sync {
    async fn load_account(&self, address: &Address) -> Result<SourceAccount, TransportError>;
}

#[derive(Debug, Deserialize)]
struct AccountResponse {
    sequence: String,
}

/// Horizon REST client.
#[derive(Clone)]
pub struct HorizonClient {
    base_url: String,
    http: reqwest::Client,
}

impl HorizonClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl AccountSource for HorizonClient {
    async fn load_account(&self, address: &Address) -> Result<SourceAccount, TransportError> {
        let url = format!(
            "{}/accounts/{}",
            self.base_url,
            urlencoding::encode(&address.to_string())
        );
        let resp = self.http.get(&url).send().await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(TransportError::Status { status, body });
        }

        let account: AccountResponse = resp.json().await?;
        let sequence = parse_sequence(&account.sequence)?;
        tracing::debug!(account = %address.short(), sequence, "loaded account");

        Ok(SourceAccount {
            address: *address,
            sequence,
        })
    }
}

fn parse_sequence(raw: &str) -> Result<i64, TransportError> {
    raw.parse()
        .map_err(|e| TransportError::Decode(format!("invalid sequence number {:?}: {}", raw, e)))
}
