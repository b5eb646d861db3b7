//! Warranty contract client.
//!
//! Writes run the full pipeline: build, simulate, fee, authorization,
//! signing, reconciliation, submission. Reads stop after simulation.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use futures::stream::{self, StreamExt, TryStreamExt};
use stellar_xdr::curr::ScVal;

use crate::address::Address;
use crate::assemble::assemble;
use crate::codec::{FromScVal, ToScVal};
use crate::config::ClientConfig;
use crate::error::{classify_simulation_error, malformed_simulation, InvocationError, ValidationError};
use crate::horizon::{AccountSource, HorizonClient};
use crate::reconcile::{reconcile, ReconcilePath};
use crate::rpc::{LedgerRpc, RpcClient};
use crate::signer::TransactionSigner;
use crate::simulate::{compute_fee, simulate, SimulationFailure, SimulationOutcome};
use crate::submit::{await_confirmation, extract_result, submit, InvocationResult};
use crate::transaction::{build, InvocationRequest, SourceAccount, TimeoutPolicy};
use crate::warranty::{NewWarranty, WarrantyData, WarrantyStatus};

/// A submitted invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation<T> {
    pub hash: String,
    pub result: InvocationResult<T>,
    /// Ledger the transaction landed in, when confirmation polling is on.
    pub confirmed_ledger: Option<u32>,
    pub reconciled: ReconcilePath,
}

/// Client for one deployed warranty contract.
///
/// Writes from the same signer account must not overlap: each one reads the
/// account's sequence number independently.
#[derive(Clone)]
pub struct WarrantyClient {
    rpc: Arc<dyn LedgerRpc>,
    accounts: Arc<dyn AccountSource>,
    contract: Address,
    config: ClientConfig,
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

fn parse_field(field: &'static str, value: &str) -> Result<Address, ValidationError> {
    Address::parse(value).map_err(|_| ValidationError::InvalidAddress {
        field,
        value: value.to_string(),
    })
}

fn parse_signer(value: &str) -> Result<Address, ValidationError> {
    match parse_field("signer", value)? {
        signer if signer.is_account() => Ok(signer),
        _ => Err(ValidationError::InvalidAddress {
            field: "signer",
            value: value.to_string(),
        }),
    }
}

fn failure_to_error(method: &str, failure: SimulationFailure) -> InvocationError {
    match failure {
        SimulationFailure::Ledger { error } => classify_simulation_error(method, &error).into(),
        SimulationFailure::Malformed { detail } => malformed_simulation(method, detail).into(),
    }
}

impl WarrantyClient {
    pub fn new(
        rpc: Arc<dyn LedgerRpc>,
        accounts: Arc<dyn AccountSource>,
        contract: Address,
        config: ClientConfig,
    ) -> Self {
        Self {
            rpc,
            accounts,
            contract,
            config,
        }
    }

    /// HTTP-backed client for the endpoints and contract in `config`.
    pub fn from_config(config: ClientConfig) -> anyhow::Result<Self> {
        let contract = config.contract()?;
        Ok(Self::new(
            Arc::new(RpcClient::new(config.rpc_url.clone())),
            Arc::new(HorizonClient::new(config.horizon_url.clone())),
            contract,
            config,
        ))
    }

    pub fn contract(&self) -> Address {
        self.contract
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Invoke `method` as `signer_address`, signing with `signer`.
    pub async fn invoke<T: FromScVal>(
        &self,
        method: &str,
        args: Vec<ScVal>,
        signer_address: &str,
        signer: &dyn TransactionSigner,
    ) -> Result<Invocation<T>, InvocationError> {
        let signer_address = parse_signer(signer_address)?;
        self.invoke_as(method, args, signer_address, signer).await
    }

    async fn invoke_as<T: FromScVal>(
        &self,
        method: &str,
        args: Vec<ScVal>,
        signer_address: Address,
        signer: &dyn TransactionSigner,
    ) -> Result<Invocation<T>, InvocationError> {
        let passphrase = self.config.network_passphrase.as_str();
        let source = self.accounts.load_account(&signer_address).await?;

        let request = InvocationRequest::new(self.contract, method, args, signer_address);
        let timeout = TimeoutPolicy::from_secs(self.config.timeout_secs, unix_now());
        let unsigned = build(&request, &source, self.config.base_fee, timeout)?;
        tracing::info!(
            method,
            signer = %signer_address.short(),
            sequence = source.sequence + 1,
            "invoking"
        );

        let success = match simulate(self.rpc.as_ref(), &unsigned).await? {
            SimulationOutcome::Success(success) => success,
            SimulationOutcome::Failure(failure) => return Err(failure_to_error(method, failure)),
        };

        let prepared =
            compute_fee(&unsigned, &success).map_err(|f| failure_to_error(method, f))?;
        let assembled = assemble(prepared, &success)?;

        let envelope = assembled.to_envelope_base64()?;
        let signed = signer
            .sign_transaction(&envelope, passphrase)
            .await
            .into_envelope()?;

        let (final_tx, reconciled) = reconcile(&assembled, &signed, passphrase)?;
        let outcome = submit(self.rpc.as_ref(), &final_tx, passphrase).await?;
        let confirmed_ledger =
            await_confirmation(self.rpc.as_ref(), &outcome.hash, self.config.confirmation())
                .await?;

        // The simulated return value is what the submitted transaction returns
        let result = extract_result::<T>(success.return_value.as_ref());
        tracing::info!(method, hash = %outcome.hash, ?reconciled, "invocation complete");

        Ok(Invocation {
            hash: outcome.hash,
            result,
            confirmed_ledger,
            reconciled,
        })
    }

    /// Read-only call via simulation from the placeholder account.
    ///
    /// `Ok(None)` when the ledger reports the call failed (missing record) or
    /// returned nothing.
    pub async fn query<T: FromScVal>(
        &self,
        method: &str,
        args: Vec<ScVal>,
    ) -> Result<Option<T>, InvocationError> {
        let request = InvocationRequest::read_only(self.contract, method, args);
        let unsigned = build(
            &request,
            &SourceAccount::placeholder(),
            self.config.base_fee,
            TimeoutPolicy::Infinite,
        )?;

        let success = match simulate(self.rpc.as_ref(), &unsigned).await? {
            SimulationOutcome::Success(success) => success,
            SimulationOutcome::Failure(SimulationFailure::Ledger { error }) => {
                tracing::debug!(method, %error, "query found nothing");
                return Ok(None);
            }
            SimulationOutcome::Failure(failure) => return Err(failure_to_error(method, failure)),
        };

        match success.return_value {
            None => Ok(None),
            Some(value) => value.decode::<T>().map_err(|e| {
                InvocationError::ExtractionAmbiguous(format!("{}: {} ({})", method, e, value.raw()))
            }),
        }
    }

    pub async fn register_warranty(
        &self,
        warranty: &NewWarranty,
        signer_address: &str,
        signer: &dyn TransactionSigner,
    ) -> Result<Invocation<u64>, InvocationError> {
        let signer_address = parse_signer(signer_address)?;
        let owner = warranty.validate(&signer_address, unix_now())?;
        let args = warranty.to_args(&owner)?;
        self.invoke_as("register_warranty", args, signer_address, signer)
            .await
    }

    pub async fn transfer_ownership(
        &self,
        warranty_id: u64,
        new_owner: &str,
        signer_address: &str,
        signer: &dyn TransactionSigner,
    ) -> Result<Invocation<()>, InvocationError> {
        let signer_address = parse_signer(signer_address)?;
        let new_owner = parse_field("new_owner", new_owner)?;
        let args = vec![warranty_id.to_sc_val()?, new_owner.to_sc_val()?];
        self.invoke_as("transfer_ownership", args, signer_address, signer)
            .await
    }

    pub async fn update_status(
        &self,
        warranty_id: u64,
        status: WarrantyStatus,
        signer_address: &str,
        signer: &dyn TransactionSigner,
    ) -> Result<Invocation<()>, InvocationError> {
        let signer_address = parse_signer(signer_address)?;
        let args = vec![warranty_id.to_sc_val()?, status.to_sc_val()?];
        self.invoke_as("update_status", args, signer_address, signer)
            .await
    }

    pub async fn revoke_warranty(
        &self,
        warranty_id: u64,
        signer_address: &str,
        signer: &dyn TransactionSigner,
    ) -> Result<Invocation<()>, InvocationError> {
        let signer_address = parse_signer(signer_address)?;
        let args = vec![warranty_id.to_sc_val()?];
        self.invoke_as("revoke_warranty", args, signer_address, signer)
            .await
    }

    pub async fn get_warranty(&self, warranty_id: u64) -> Result<Option<WarrantyData>, InvocationError> {
        self.query("get_warranty", vec![warranty_id.to_sc_val()?])
            .await
    }

    pub async fn get_warranties_by_owner(&self, owner: &str) -> Result<Vec<u64>, InvocationError> {
        let owner = parse_field("owner", owner)?;
        Ok(self
            .query::<Vec<u64>>("get_warranties_by_owner", vec![owner.to_sc_val()?])
            .await?
            .unwrap_or_default())
    }

    pub async fn get_warranty_count(&self) -> Result<u64, InvocationError> {
        Ok(self
            .query::<u64>("get_warranty_count", vec![])
            .await?
            .unwrap_or_default())
    }

    pub async fn is_warranty_expired(&self, warranty_id: u64) -> Result<Option<bool>, InvocationError> {
        self.query("is_warranty_expired", vec![warranty_id.to_sc_val()?])
            .await
    }

    /// Every warranty `owner` holds, in the order the contract lists them.
    pub async fn list_warranties(&self, owner: &str) -> Result<Vec<WarrantyData>, InvocationError> {
        let ids = self.get_warranties_by_owner(owner).await?;
        let concurrency = self.config.fetch_concurrency.max(1);
        tracing::debug!(count = ids.len(), concurrency, "fetching warranties");

        let warranties: Vec<Option<WarrantyData>> = stream::iter(ids)
            .map(|id| self.get_warranty(id))
            .buffered(concurrency)
            .try_collect()
            .await?;

        Ok(warranties.into_iter().flatten().collect())
    }
}
