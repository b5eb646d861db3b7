//! Local configuration management for the warranty client.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::address::Address;
use crate::submit::ConfirmationPolicy;
use crate::transaction::{BASE_FEE, TESTNET_PASSPHRASE};

pub const DEFAULT_RPC_URL: &str = "https://soroban-testnet.stellar.org";
pub const DEFAULT_HORIZON_URL: &str = "https://horizon-testnet.stellar.org";

/// Client configuration stored locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Soroban JSON-RPC endpoint
    pub rpc_url: String,

    /// Horizon endpoint, used for account sequence numbers
    pub horizon_url: String,

    pub network_passphrase: String,

    /// Deployed warranty contract (`C...`)
    pub contract_id: Option<String>,

    /// Fee bid in stroops before resource fees
    pub base_fee: u32,

    /// Transaction validity window. `None` never expires.
    pub timeout_secs: Option<u64>,

    /// Parallel fetches when listing an owner's warranties.
    pub fetch_concurrency: usize,

    /// `getTransaction` polls after submission. 0 disables confirmation.
    pub confirm_attempts: u32,

    pub confirm_interval_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            rpc_url: DEFAULT_RPC_URL.to_string(),
            horizon_url: DEFAULT_HORIZON_URL.to_string(),
            network_passphrase: TESTNET_PASSPHRASE.to_string(),
            contract_id: None,
            base_fee: BASE_FEE,
            timeout_secs: Some(30),
            fetch_concurrency: 4,
            confirm_attempts: 0,
            confirm_interval_ms: 1000,
        }
    }
}

impl ClientConfig {
    /// Get the config file path.
    pub fn path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("warranty-client")
            .join("config.json")
    }

    /// Load config from disk, falling back to defaults.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::path())
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            Ok(serde_json::from_str(&contents)?)
        } else {
            Ok(Self::default())
        }
    }

    /// Save config to disk.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::path())
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// The configured contract, parsed.
    pub fn contract(&self) -> Result<Address> {
        let id = self
            .contract_id
            .as_deref()
            .context("No contract configured; pass --contract or set contract_id")?;
        let address = Address::parse(id)?;
        if address.is_account() {
            anyhow::bail!("{} is an account, not a contract", id);
        }
        Ok(address)
    }

    pub fn confirmation(&self) -> ConfirmationPolicy {
        ConfirmationPolicy {
            attempts: self.confirm_attempts,
            interval: Duration::from_millis(self.confirm_interval_ms),
        }
    }
}
