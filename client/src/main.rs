//! Warranty Tracker - register and manage product warranties on Soroban

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::signal;
use tracing_subscriber::EnvFilter;

use warranty_client::{
    ClientConfig, InvocationResult, LocalKeySigner, NewWarranty, WarrantyClient, WarrantyStatus,
};
use warranty_client::wallet::WalletConfig;

#[derive(Parser, Debug)]
#[command(name = "warranty")]
#[command(about = "Warranty Tracker - register and manage product warranties on Soroban")]
#[command(version)]
struct Cli {
    /// Soroban RPC URL (overrides the config file)
    #[arg(long)]
    rpc_url: Option<String>,

    /// Horizon URL (overrides the config file)
    #[arg(long)]
    horizon_url: Option<String>,

    /// Warranty contract id, C...
    #[arg(short, long)]
    contract: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show the local wallet, creating one if needed
    Wallet {
        /// Replace the wallet with this secret seed (S...)
        #[arg(long)]
        import: Option<String>,
    },
    /// Show the effective configuration
    Config {
        /// Write it back to the config file
        #[arg(long, default_value_t = false)]
        save: bool,
    },
    /// Register a warranty owned by the wallet account
    Register {
        #[arg(long)]
        product: String,
        #[arg(long)]
        serial: String,
        #[arg(long)]
        manufacturer: String,
        /// Unix seconds
        #[arg(long)]
        purchase_date: u64,
        /// Unix seconds
        #[arg(long)]
        expiration_date: u64,
    },
    /// Fetch one warranty
    Get { id: u64 },
    /// List warranties held by an owner (defaults to the wallet account)
    List { owner: Option<String> },
    /// Number of registered warranties
    Count,
    /// Whether a warranty has expired
    Expired { id: u64 },
    /// Transfer a warranty to a new owner
    Transfer { id: u64, new_owner: String },
    /// Set a warranty's status (Active, Expired, Revoked)
    Status { id: u64, status: String },
    /// Revoke a warranty
    Revoke { id: u64 },
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();

    tokio::select! {
        res = run(cli) => res,
        _ = signal::ctrl_c() => {
            tracing::warn!("interrupted; an in-flight submission may still land");
            Ok(())
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = ClientConfig::load()?;
    if let Some(url) = cli.rpc_url {
        config.rpc_url = url;
    }
    if let Some(url) = cli.horizon_url {
        config.horizon_url = url;
    }
    if let Some(contract) = cli.contract {
        config.contract_id = Some(contract);
    }

    match cli.command {
        Commands::Wallet { import } => {
            let wallet = match import {
                Some(secret) => {
                    let wallet = WalletConfig::from_secret(&secret)?;
                    wallet.save()?;
                    wallet
                }
                None => WalletConfig::load_or_generate()?,
            };
            println!("{}", wallet.public_key);
            println!("stored in {}", WalletConfig::path().display());
        }
        Commands::Config { save } => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            if save {
                config.save()?;
                println!("saved to {}", ClientConfig::path().display());
            }
        }
        Commands::Register {
            product,
            serial,
            manufacturer,
            purchase_date,
            expiration_date,
        } => {
            let (client, wallet, signer) = writer(config)?;
            let warranty = NewWarranty {
                owner: wallet.public_key.clone(),
                product_name: product,
                serial_number: serial,
                manufacturer,
                purchase_date,
                expiration_date,
            };
            let invocation = client
                .register_warranty(&warranty, &wallet.public_key, &signer)
                .await?;
            report(&invocation.hash, invocation.result, |id| format!("warranty id {}", id));
        }
        Commands::Get { id } => {
            let client = WarrantyClient::from_config(config)?;
            match client.get_warranty(id).await? {
                Some(warranty) => println!("{}", serde_json::to_string_pretty(&warranty)?),
                None => println!("warranty {} not found", id),
            }
        }
        Commands::List { owner } => {
            let owner = match owner {
                Some(owner) => owner,
                None => WalletConfig::load()?
                    .context("No wallet; pass an owner or run `warranty wallet`")?
                    .public_key,
            };
            let client = WarrantyClient::from_config(config)?;
            let warranties = client.list_warranties(&owner).await?;
            println!("{}", serde_json::to_string_pretty(&warranties)?);
        }
        Commands::Count => {
            let client = WarrantyClient::from_config(config)?;
            println!("{}", client.get_warranty_count().await?);
        }
        Commands::Expired { id } => {
            let client = WarrantyClient::from_config(config)?;
            match client.is_warranty_expired(id).await? {
                Some(expired) => println!("{}", expired),
                None => println!("warranty {} not found", id),
            }
        }
        Commands::Transfer { id, new_owner } => {
            let (client, wallet, signer) = writer(config)?;
            let invocation = client
                .transfer_ownership(id, &new_owner, &wallet.public_key, &signer)
                .await?;
            report(&invocation.hash, invocation.result, |_| String::new());
        }
        Commands::Status { id, status } => {
            let status: WarrantyStatus = status.parse()?;
            let (client, wallet, signer) = writer(config)?;
            let invocation = client
                .update_status(id, status, &wallet.public_key, &signer)
                .await?;
            report(&invocation.hash, invocation.result, |_| String::new());
        }
        Commands::Revoke { id } => {
            let (client, wallet, signer) = writer(config)?;
            let invocation = client
                .revoke_warranty(id, &wallet.public_key, &signer)
                .await?;
            report(&invocation.hash, invocation.result, |_| String::new());
        }
    }

    Ok(())
}

fn writer(config: ClientConfig) -> Result<(WarrantyClient, WalletConfig, LocalKeySigner)> {
    let wallet = WalletConfig::load_or_generate()?;
    let signer = LocalKeySigner::from_wallet(&wallet)?;
    let client = WarrantyClient::from_config(config)?;
    Ok((client, wallet, signer))
}

fn report<T>(hash: &str, result: InvocationResult<T>, describe: impl Fn(T) -> String) {
    println!("submitted {}", hash);
    match result {
        InvocationResult::Returned(value) => {
            let text = describe(value);
            if !text.is_empty() {
                println!("{}", text);
            }
        }
        InvocationResult::Completed => {}
        InvocationResult::Undecodable { raw, reason } => {
            println!("accepted, but the return value could not be read ({}): {}", reason, raw)
        }
    }
}
