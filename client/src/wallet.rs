//! Local wallet management for the warranty client.

use anyhow::{Context, Result};
use ed25519_dalek::SigningKey;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::address::Address;

/// Wallet configuration stored locally.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletConfig {
    /// Secret seed in strkey form (`S...`)
    pub secret_seed: String,

    /// Account address (`G...`)
    pub public_key: String,
}

impl WalletConfig {
    /// Get the wallet file path.
    pub fn path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("warranty-client")
            .join("wallet.json")
    }

    /// Generate a new wallet.
    pub fn generate() -> Result<Self> {
        let mut seed = [0u8; 32];
        getrandom::getrandom(&mut seed)?;
        Ok(Self::from_seed(seed))
    }

    pub fn from_seed(seed: [u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(&seed);
        let public = Address::Account(signing_key.verifying_key().to_bytes());
        Self {
            secret_seed: stellar_strkey::ed25519::PrivateKey(seed).to_string(),
            public_key: public.to_string(),
        }
    }

    /// Import an existing `S...` seed.
    pub fn from_secret(secret: &str) -> Result<Self> {
        let key = stellar_strkey::ed25519::PrivateKey::from_string(secret.trim())
            .map_err(|e| anyhow::anyhow!("Invalid secret seed: {:?}", e))?;
        Ok(Self::from_seed(key.0))
    }

    /// Load wallet from disk.
    pub fn load() -> Result<Option<Self>> {
        Self::load_from(&Self::path())
    }

    pub fn load_from(path: &Path) -> Result<Option<Self>> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            Ok(Some(serde_json::from_str(&contents)?))
        } else {
            Ok(None)
        }
    }

    /// Save wallet to disk.
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

    /// Load or generate a wallet.
    pub fn load_or_generate() -> Result<Self> {
        if let Some(wallet) = Self::load()? {
            Ok(wallet)
        } else {
            let wallet = Self::generate()?;
            wallet.save()?;
            tracing::info!(address = %wallet.short_address(), "generated new wallet");
            Ok(wallet)
        }
    }

    /// Get the key for signing.
    pub fn signing_key(&self) -> Result<SigningKey> {
        let key = stellar_strkey::ed25519::PrivateKey::from_string(&self.secret_seed)
            .map_err(|e| anyhow::anyhow!("Invalid secret seed: {:?}", e))?;
        let signing_key = SigningKey::from_bytes(&key.0);

        // A hand-edited file could pair the seed with someone else's address
        if self.address()?.account_key() != Some(signing_key.verifying_key().to_bytes()) {
            anyhow::bail!("Wallet public key does not match its secret seed");
        }
        Ok(signing_key)
    }

    pub fn address(&self) -> Result<Address> {
        Ok(Address::parse_account(&self.public_key)?)
    }

    /// Get short display version of public key.
    pub fn short_address(&self) -> String {
        let pk = &self.public_key;
        if pk.len() > 16 {
            format!("{}...{}", &pk[..8], &pk[pk.len() - 6..])
        } else {
            pk.clone()
        }
    }
}
