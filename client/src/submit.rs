//! Submission, optional confirmation polling, and result extraction.

use std::time::Duration;

use stellar_xdr::curr::TransactionResult;

use crate::codec::{self, FromScVal, ReturnValue};
use crate::error::InvocationError;
use crate::rpc::LedgerRpc;
use crate::transaction::AssembledTransaction;

/// Outcome of a contract invocation that made it onto the network.
#[derive(Debug, Clone, PartialEq)]
pub enum InvocationResult<T> {
    /// The call returned a value.
    Returned(T),
    /// The call succeeded without a return payload.
    Completed,
    /// A value came back but could not be decoded into `T`. The transaction
    /// itself was accepted.
    Undecodable { raw: String, reason: String },
}

impl<T> InvocationResult<T> {
    pub fn returned(self) -> Option<T> {
        match self {
            InvocationResult::Returned(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_undecodable(&self) -> bool {
        matches!(self, InvocationResult::Undecodable { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionOutcome {
    pub hash: String,
    pub status: String,
    pub latest_ledger: u32,
}

/// How long to wait for the ledger to include a submitted transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfirmationPolicy {
    pub attempts: u32,
    pub interval: Duration,
}

impl ConfirmationPolicy {
    pub fn disabled() -> Self {
        Self {
            attempts: 0,
            interval: Duration::ZERO,
        }
    }
}

/// Send `final_tx`. Only `PENDING` and `DUPLICATE` count as accepted.
pub async fn submit(
    rpc: &dyn LedgerRpc,
    final_tx: &AssembledTransaction,
    network_passphrase: &str,
) -> Result<SubmissionOutcome, InvocationError> {
    if final_tx.signatures.is_empty() {
        return Err(InvocationError::Signer(
            "refusing to submit an unsigned transaction".to_string(),
        ));
    }

    let envelope = final_tx.to_envelope_base64()?;
    let local_hash = final_tx.hash_hex(network_passphrase)?;
    tracing::info!(method = %final_tx.method, hash = %local_hash, fee = final_tx.tx.fee, "submitting");

    let resp = rpc.send_transaction(&envelope).await?;

    let accepted = resp.error_result_xdr.is_none()
        && matches!(resp.status.as_str(), "PENDING" | "DUPLICATE");
    if !accepted {
        let detail = resp
            .error_result_xdr
            .as_deref()
            .map(describe_error_result)
            .unwrap_or_else(|| "no error result".to_string());
        tracing::error!(method = %final_tx.method, status = %resp.status, %detail, "submission rejected");
        return Err(InvocationError::SubmissionRejected {
            status: resp.status,
            detail,
        });
    }

    let hash = if resp.hash.is_empty() {
        local_hash
    } else {
        resp.hash
    };
    tracing::info!(method = %final_tx.method, %hash, status = %resp.status, "submission accepted");

    Ok(SubmissionOutcome {
        hash,
        status: resp.status,
        latest_ledger: resp.latest_ledger,
    })
}

/// Poll until the transaction is in a ledger.
///
/// Returns the ledger sequence once confirmed, `None` if polling gave up.
/// Only an explicit `FAILED` is an error: the transaction was already accepted.
pub async fn await_confirmation(
    rpc: &dyn LedgerRpc,
    hash: &str,
    policy: ConfirmationPolicy,
) -> Result<Option<u32>, InvocationError> {
    for attempt in 1..=policy.attempts {
        tokio::time::sleep(policy.interval).await;

        match rpc.get_transaction(hash).await {
            Ok(resp) => match resp.status.as_str() {
                "SUCCESS" => {
                    tracing::info!(%hash, ledger = ?resp.ledger, attempt, "transaction confirmed");
                    return Ok(Some(resp.ledger.unwrap_or_default()));
                }
                "FAILED" => {
                    return Err(InvocationError::SubmissionRejected {
                        status: resp.status,
                        detail: format!("transaction {} failed on ledger {:?}", hash, resp.ledger),
                    })
                }
                other => tracing::debug!(%hash, status = other, attempt, "not yet confirmed"),
            },
            Err(e) => {
                tracing::warn!(%hash, error = %e, "confirmation polling stopped");
                return Ok(None);
            }
        }
    }

    if policy.attempts > 0 {
        tracing::warn!(%hash, attempts = policy.attempts, "transaction not confirmed in time");
    }
    Ok(None)
}

/// Turn the simulated return value into a typed result.
pub fn extract_result<T: FromScVal>(value: Option<&ReturnValue>) -> InvocationResult<T> {
    let Some(value) = value else {
        return InvocationResult::Completed;
    };

    match value.decode::<T>() {
        Ok(Some(decoded)) => InvocationResult::Returned(decoded),
        Ok(None) => InvocationResult::Completed,
        Err(e) => {
            let raw = value.raw();
            tracing::warn!(%raw, error = %e, "return value could not be decoded");
            InvocationResult::Undecodable {
                raw,
                reason: e.to_string(),
            }
        }
    }
}

fn describe_error_result(xdr: &str) -> String {
    match codec::from_base64::<TransactionResult>(xdr) {
        Ok(result) => format!(
            "{} (fee charged {})",
            result.result.discriminant().name(),
            result.fee_charged
        ),
        Err(_) => xdr.to_string(),
    }
}
