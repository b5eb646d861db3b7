//! Reconcile a signer's output with the transaction we assembled.
//!
//! Signers are free to re-serialize the envelope however they like. When
//! the result is an envelope this XDR build cannot parse (an unknown union
//! arm somewhere inside), the signature is cut out of the raw bytes and
//! attached to our own assembled transaction instead.

use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use stellar_xdr::curr::{
    DecoratedSignature, TransactionEnvelope, TransactionV0Envelope, TransactionV1Envelope, VecM,
};

use crate::codec;
use crate::error::InvocationError;
use crate::transaction::AssembledTransaction;

const ENVELOPE_TYPE_TX_V0: i32 = 0;
const ENVELOPE_TYPE_TX: i32 = 2;

/// Which path produced the final transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcilePath {
    /// The envelope parsed cleanly and is used as-is.
    Parsed,
    /// A legacy v0 envelope parsed cleanly; its signatures were moved over.
    ParsedV0,
    /// The envelope could not be parsed; the signature was extracted by offset.
    Manual,
}

/// Produce the transaction to submit from `assembled` and the signer's envelope.
pub fn reconcile(
    assembled: &AssembledTransaction,
    signed_envelope_xdr: &str,
    network_passphrase: &str,
) -> Result<(AssembledTransaction, ReconcilePath), InvocationError> {
    let bytes = codec::decode_base64_bytes(signed_envelope_xdr)
        .map_err(|e| InvocationError::EnvelopeFormat(format!("not base64: {}", e)))?;

    match codec::from_xdr_bytes::<TransactionEnvelope>(&bytes) {
        Ok(envelope) => from_parsed(assembled, envelope),
        Err(stellar_xdr::curr::Error::Invalid) => {
            tracing::warn!(
                method = %assembled.method,
                envelope_len = bytes.len(),
                "signed envelope has an unrecognized variant, reconciling manually"
            );
            let signature = extract_signature(assembled, &bytes)?;
            verify_signature(assembled, &signature, network_passphrase)?;
            let mut out = assembled.clone();
            out.append_signature(signature);
            Ok((out, ReconcilePath::Manual))
        }
        Err(e) => Err(InvocationError::EnvelopeFormat(format!(
            "{} ({} bytes)",
            e,
            bytes.len()
        ))),
    }
}

fn from_parsed(
    assembled: &AssembledTransaction,
    envelope: TransactionEnvelope,
) -> Result<(AssembledTransaction, ReconcilePath), InvocationError> {
    match envelope {
        TransactionEnvelope::Tx(TransactionV1Envelope { tx, signatures }) => {
            if signatures.is_empty() {
                return Err(InvocationError::Reconciliation(
                    "signed envelope carries no signatures".to_string(),
                ));
            }
            if tx != assembled.tx {
                tracing::warn!(method = %assembled.method, "signer returned a modified transaction");
            }
            Ok((
                AssembledTransaction {
                    method: assembled.method.clone(),
                    tx,
                    signatures: signatures.to_vec(),
                },
                ReconcilePath::Parsed,
            ))
        }
        // v0 cannot carry resource data, so only its signatures are usable.
        TransactionEnvelope::TxV0(TransactionV0Envelope { signatures, .. }) => {
            let Some(signature) = signatures.first() else {
                return Err(InvocationError::Reconciliation(
                    "v0 envelope carries no signatures".to_string(),
                ));
            };
            let mut out = assembled.clone();
            out.append_signature(signature.clone());
            Ok((out, ReconcilePath::ParsedV0))
        }
        TransactionEnvelope::TxFeeBump(_) => Err(InvocationError::EnvelopeFormat(
            "signer returned a fee-bump envelope".to_string(),
        )),
    }
}

/// Pull the first signature out of raw envelope bytes.
///
/// The body is not re-parsed; its length is taken from `assembled`, which
/// must be the transaction the signer was given.
fn extract_signature(
    assembled: &AssembledTransaction,
    bytes: &[u8],
) -> Result<DecoratedSignature, InvocationError> {
    let head: [u8; 4] = bytes
        .get(..4)
        .and_then(|b| b.try_into().ok())
        .ok_or_else(|| InvocationError::EnvelopeFormat("envelope shorter than its tag".to_string()))?;
    let discriminant = i32::from_be_bytes(head);

    let body = match discriminant {
        ENVELOPE_TYPE_TX_V0 => assembled.body_xdr_v0(),
        ENVELOPE_TYPE_TX => assembled.body_xdr(),
        other => {
            return Err(InvocationError::Reconciliation(format!(
                "unsupported envelope discriminant {}",
                other
            )))
        }
    }
    .map_err(|e| InvocationError::Reconciliation(format!("re-encoding body: {}", e)))?;

    let offset = 4 + body.len();
    let tail = bytes.get(offset..).ok_or_else(|| {
        InvocationError::Reconciliation(format!(
            "envelope is {} bytes, body alone needs {}",
            bytes.len(),
            offset
        ))
    })?;

    let signatures = codec::from_xdr_bytes::<VecM<DecoratedSignature, 20>>(tail)
        .map_err(|e| InvocationError::Reconciliation(format!("signature list: {}", e)))?;
    let signature = signatures.first().cloned().ok_or_else(|| {
        InvocationError::Reconciliation("signed envelope carries no signatures".to_string())
    })?;

    tracing::debug!(discriminant, offset, "signature extracted");
    Ok(signature)
}

/// Check an extracted signature against the assembled transaction's hash.
///
/// Only signatures hinted as the source account key can be checked here;
/// others (multisig cosigners) are passed through with a warning.
fn verify_signature(
    assembled: &AssembledTransaction,
    signature: &DecoratedSignature,
    passphrase: &str,
) -> Result<(), InvocationError> {
    let Some(key) = assembled.signer_key() else {
        return Ok(());
    };
    if signature.hint.0[..] != key[28..] {
        tracing::warn!(
            method = %assembled.method,
            hint = %hex::encode(signature.hint.0),
            "extracted signature is not from the source account key"
        );
        return Ok(());
    }

    let hash = assembled
        .hash(passphrase)
        .map_err(|e| InvocationError::Reconciliation(format!("hashing: {}", e)))?;
    let verifying = VerifyingKey::from_bytes(&key)
        .map_err(|e| InvocationError::Reconciliation(format!("source key: {}", e)))?;
    let bytes: [u8; 64] = signature.signature.0.as_slice().try_into().map_err(|_| {
        InvocationError::Reconciliation(format!(
            "signature is {} bytes, expected 64",
            signature.signature.0.len()
        ))
    })?;
    verifying
        .verify(&hash, &Signature::from_bytes(&bytes))
        .map_err(|_| {
            InvocationError::Reconciliation(
                "extracted signature does not cover the assembled transaction".to_string(),
            )
        })
}
