//! Merge simulated authorization entries into the prepared transaction.

use stellar_xdr::curr::{OperationBody, SorobanAuthorizationEntry, VecM};

use crate::codec;
use crate::error::InvocationError;
use crate::simulate::SimulationSuccess;
use crate::transaction::{AssembledTransaction, PreparedTransaction};

/// Inject `success.auth` into the single invoke operation of `prepared`.
///
/// Entries already present on the operation win; simulation output only
/// fills an empty list. Undecodable entries are fatal.
pub fn assemble(
    prepared: PreparedTransaction,
    success: &SimulationSuccess,
) -> Result<AssembledTransaction, InvocationError> {
    let PreparedTransaction { method, mut tx } = prepared;

    let entries = success
        .auth
        .iter()
        .enumerate()
        .map(|(i, b64)| {
            codec::from_base64::<SorobanAuthorizationEntry>(b64)
                .map_err(|e| InvocationError::Authorization(format!("entry {}: {}", i, e)))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut operations = tx.operations.to_vec();
    if operations.len() != 1 {
        return Err(InvocationError::Authorization(format!(
            "expected exactly one operation, found {}",
            operations.len()
        )));
    }

    let OperationBody::InvokeHostFunction(op) = &mut operations[0].body else {
        return Err(InvocationError::Authorization(
            "operation is not a contract invocation".to_string(),
        ));
    };

    if op.auth.is_empty() {
        let count = entries.len();
        op.auth = VecM::try_from(entries)
            .map_err(|e| InvocationError::Authorization(format!("too many entries: {}", e)))?;
        tracing::debug!(method = %method, entries = count, "authorization entries injected");
    } else {
        tracing::debug!(method = %method, "operation already carries authorization entries");
    }

    tx.operations = operations
        .try_into()
        .map_err(|e| InvocationError::Authorization(format!("operations: {}", e)))?;

    Ok(AssembledTransaction {
        method,
        tx,
        signatures: Vec::new(),
    })
}
