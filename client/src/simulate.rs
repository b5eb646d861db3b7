//! Simulation and fee preparation.
//!
//! Ledger-side failures come back as [`SimulationOutcome::Failure`]; only
//! transport problems (and a transaction we cannot even encode) are
//! returned as `Err`.

use stellar_xdr::curr::{SorobanTransactionData, TransactionExt};

use crate::codec::{self, ReturnValue};
use crate::error::InvocationError;
use crate::rpc::{LedgerRpc, SimulateTransactionResponse, SimulationCost};
use crate::transaction::{PreparedTransaction, UnsignedTransaction};

#[derive(Debug, Clone, PartialEq)]
pub enum SimulationFailure {
    /// The ledger reported an error (contract panic, auth failure, ...).
    Ledger { error: String },
    /// The response was present but could not be interpreted.
    Malformed { detail: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimulationSuccess {
    /// Resource footprint and fee; absent only on some read-only responses.
    pub transaction_data: Option<SorobanTransactionData>,
    pub min_resource_fee: i64,
    pub return_value: Option<ReturnValue>,
    /// Authorization entries, still base64-encoded.
    pub auth: Vec<String>,
    pub cost: Option<SimulationCost>,
    pub latest_ledger: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SimulationOutcome {
    Failure(SimulationFailure),
    Success(SimulationSuccess),
}

impl SimulationOutcome {
    /// Interpret a raw simulation response.
    pub fn from_response(resp: SimulateTransactionResponse) -> Self {
        if let Some(error) = resp.error {
            return SimulationOutcome::Failure(SimulationFailure::Ledger { error });
        }

        let transaction_data = match resp.transaction_data.as_deref() {
            None | Some("") => None,
            Some(b64) => match codec::from_base64::<SorobanTransactionData>(b64) {
                Ok(data) => Some(data),
                Err(e) => {
                    return SimulationOutcome::Failure(SimulationFailure::Malformed {
                        detail: format!("transactionData: {}", e),
                    })
                }
            },
        };

        let min_resource_fee = match resp.min_resource_fee.as_deref() {
            None | Some("") => 0,
            Some(raw) => match raw.parse::<i64>() {
                Ok(fee) if fee >= 0 => fee,
                _ => {
                    return SimulationOutcome::Failure(SimulationFailure::Malformed {
                        detail: format!("minResourceFee {:?}", raw),
                    })
                }
            },
        };

        let (return_value, auth) = match resp.results.into_iter().next() {
            Some(result) => (ReturnValue::from_json(result.xdr), result.auth),
            None => (None, Vec::new()),
        };

        SimulationOutcome::Success(SimulationSuccess {
            transaction_data,
            min_resource_fee,
            return_value,
            auth,
            cost: resp.cost,
            latest_ledger: resp.latest_ledger,
        })
    }

    pub fn is_success(&self) -> bool {
        matches!(self, SimulationOutcome::Success(_))
    }
}

/// Dry-run `unsigned` against current ledger state.
pub async fn simulate(
    rpc: &dyn LedgerRpc,
    unsigned: &UnsignedTransaction,
) -> Result<SimulationOutcome, InvocationError> {
    let envelope = unsigned.to_envelope_base64()?;

    tracing::debug!(method = %unsigned.method, envelope_len = envelope.len(), "simulating");
    let resp = rpc.simulate_transaction(&envelope).await?;
    let outcome = SimulationOutcome::from_response(resp);

    match &outcome {
        SimulationOutcome::Success(success) => tracing::info!(
            method = %unsigned.method,
            min_resource_fee = success.min_resource_fee,
            auth_entries = success.auth.len(),
            has_return_value = success.return_value.is_some(),
            "simulation succeeded"
        ),
        SimulationOutcome::Failure(failure) => {
            tracing::info!(method = %unsigned.method, ?failure, "simulation failed")
        }
    }

    Ok(outcome)
}

/// Finalize the fee bid from the simulated resource cost.
///
/// `fee = base fee + minResourceFee`, and the resource footprint is attached.
pub fn compute_fee(
    unsigned: &UnsignedTransaction,
    success: &SimulationSuccess,
) -> Result<PreparedTransaction, SimulationFailure> {
    let data = success
        .transaction_data
        .clone()
        .ok_or_else(|| SimulationFailure::Malformed {
            detail: "simulation returned no transactionData".to_string(),
        })?;

    let resource_fee = u32::try_from(success.min_resource_fee).unwrap_or(u32::MAX);
    let mut tx = unsigned.tx.clone();
    tx.fee = tx.fee.saturating_add(resource_fee);
    tx.ext = TransactionExt::V1(data);

    tracing::debug!(
        method = %unsigned.method,
        base_fee = unsigned.tx.fee,
        resource_fee,
        final_fee = tx.fee,
        "fee finalized"
    );

    Ok(PreparedTransaction {
        method: unsigned.method.clone(),
        tx,
    })
}
