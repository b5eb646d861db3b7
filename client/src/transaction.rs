//! Transaction building.
//!
//! A contract call moves through three shapes before it is signed:
//! 1. [`UnsignedTransaction`] - one `InvokeHostFunction` operation, a placeholder fee bid
//! 2. [`PreparedTransaction`] - fee finalized from simulated resource cost
//! 3. [`AssembledTransaction`] - authorization entries injected, signatures attached
//!
//! None of them are shared between invocations; each carries its own
//! sequence number snapshot.

use sha2::{Digest, Sha256};
use stellar_xdr::curr::{
    DecoratedSignature, Hash, HostFunction, InvokeContractArgs, InvokeHostFunctionOp, Limits,
    Memo, Operation, OperationBody, Preconditions, ScVal, SequenceNumber, TimeBounds, TimePoint,
    Transaction, TransactionEnvelope, TransactionExt, TransactionSignaturePayload,
    TransactionSignaturePayloadTaggedTransaction, TransactionV0, TransactionV0Ext,
    TransactionV1Envelope, VecM, WriteXdr,
};

use crate::address::Address;
use crate::codec;
use crate::error::CodecError;

/// Default fee bid in stroops. A placeholder until simulation quotes resources.
pub const BASE_FEE: u32 = 100;

/// Network passphrases.
pub const TESTNET_PASSPHRASE: &str = "Test SDF Network ; September 2015";
pub const MAINNET_PASSPHRASE: &str = "Public Global Stellar Network ; September 2015";

/// Network id: SHA-256 of the passphrase.
pub fn network_id(passphrase: &str) -> Hash {
    Hash(Sha256::digest(passphrase.as_bytes()).into())
}

/// A logical contract call.
#[derive(Debug, Clone, PartialEq)]
pub struct InvocationRequest {
    pub contract: Address,
    pub method: String,
    pub args: Vec<ScVal>,
    pub signer: Address,
}

impl InvocationRequest {
    pub fn new(contract: Address, method: impl Into<String>, args: Vec<ScVal>, signer: Address) -> Self {
        Self {
            contract,
            method: method.into(),
            args,
            signer,
        }
    }

    /// A read-only call sourced from the placeholder account.
    pub fn read_only(contract: Address, method: impl Into<String>, args: Vec<ScVal>) -> Self {
        Self::new(contract, method, args, Address::placeholder())
    }
}

/// Source account snapshot: address plus its current sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceAccount {
    pub address: Address,
    pub sequence: i64,
}

impl SourceAccount {
    pub fn placeholder() -> Self {
        Self {
            address: Address::placeholder(),
            sequence: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutPolicy {
    Infinite,
    /// Unix timestamp after which the network refuses the transaction.
    Until(u64),
}

impl TimeoutPolicy {
    /// `secs` from `now`, or infinite.
    pub fn from_secs(secs: Option<u64>, now: u64) -> Self {
        match secs {
            Some(secs) => TimeoutPolicy::Until(now.saturating_add(secs)),
            None => TimeoutPolicy::Infinite,
        }
    }

    fn preconditions(&self) -> Preconditions {
        match self {
            TimeoutPolicy::Infinite => Preconditions::None,
            TimeoutPolicy::Until(deadline) => Preconditions::Time(TimeBounds {
                min_time: TimePoint(0),
                max_time: TimePoint(*deadline),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnsignedTransaction {
    pub method: String,
    pub tx: Transaction,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PreparedTransaction {
    pub method: String,
    pub tx: Transaction,
}

/// The transaction that is ultimately submitted.
#[derive(Debug, Clone, PartialEq)]
pub struct AssembledTransaction {
    pub method: String,
    pub tx: Transaction,
    pub signatures: Vec<DecoratedSignature>,
}

/// Build the unsigned transaction for `request`. Pure: no I/O.
pub fn build(
    request: &InvocationRequest,
    source: &SourceAccount,
    fee: u32,
    timeout: TimeoutPolicy,
) -> Result<UnsignedTransaction, CodecError> {
    let seq_num = source
        .sequence
        .checked_add(1)
        .ok_or(CodecError::OutOfRange("sequence number"))?;

    let args: VecM<ScVal> = request.args.clone().try_into()?;
    let operation = Operation {
        source_account: None,
        body: OperationBody::InvokeHostFunction(InvokeHostFunctionOp {
            host_function: HostFunction::InvokeContract(InvokeContractArgs {
                contract_address: request.contract.to_sc_address(),
                function_name: codec::symbol(&request.method)?,
                args,
            }),
            auth: VecM::default(),
        }),
    };

    let tx = Transaction {
        source_account: source.address.to_muxed_account()?,
        fee,
        seq_num: SequenceNumber(seq_num),
        cond: timeout.preconditions(),
        memo: Memo::None,
        operations: vec![operation].try_into()?,
        ext: TransactionExt::V0,
    };

    Ok(UnsignedTransaction {
        method: request.method.clone(),
        tx,
    })
}

/// Wrap a transaction in a V1 envelope and serialize it.
pub fn envelope_base64(
    tx: &Transaction,
    signatures: &[DecoratedSignature],
) -> Result<String, CodecError> {
    let envelope = TransactionEnvelope::Tx(TransactionV1Envelope {
        tx: tx.clone(),
        signatures: signatures.to_vec().try_into()?,
    });
    codec::to_base64(&envelope)
}

/// The hash a signer signs: SHA-256 of the network-bound signature payload.
pub fn transaction_hash(tx: &Transaction, passphrase: &str) -> Result<[u8; 32], CodecError> {
    let payload = TransactionSignaturePayload {
        network_id: network_id(passphrase),
        tagged_transaction: TransactionSignaturePayloadTaggedTransaction::Tx(tx.clone()),
    };
    Ok(Sha256::digest(payload.to_xdr(Limits::none())?).into())
}

impl UnsignedTransaction {
    pub fn to_envelope_base64(&self) -> Result<String, CodecError> {
        envelope_base64(&self.tx, &[])
    }
}

impl PreparedTransaction {
    pub fn to_envelope_base64(&self) -> Result<String, CodecError> {
        envelope_base64(&self.tx, &[])
    }
}

impl AssembledTransaction {
    pub fn to_envelope_base64(&self) -> Result<String, CodecError> {
        envelope_base64(&self.tx, &self.signatures)
    }

    pub fn hash(&self, passphrase: &str) -> Result<[u8; 32], CodecError> {
        transaction_hash(&self.tx, passphrase)
    }

    pub fn hash_hex(&self, passphrase: &str) -> Result<String, CodecError> {
        Ok(hex::encode(self.hash(passphrase)?))
    }

    pub fn append_signature(&mut self, signature: DecoratedSignature) {
        self.signatures.push(signature);
    }

    /// The single operation's payload (host function plus auth), serialized.
    pub fn operation_xdr(&self) -> Result<Vec<u8>, CodecError> {
        let op = self
            .tx
            .operations
            .first()
            .ok_or(CodecError::MissingField("operation"))?;
        Ok(op.to_xdr(Limits::none())?)
    }

    /// Serialized transaction body, without signatures.
    pub fn body_xdr(&self) -> Result<Vec<u8>, CodecError> {
        Ok(self.tx.to_xdr(Limits::none())?)
    }

    /// Serialized body in the legacy V0 shape, if the transaction fits it.
    pub fn body_xdr_v0(&self) -> Result<Vec<u8>, CodecError> {
        let source = self
            .signer_key()
            .ok_or(CodecError::UnexpectedType {
                expected: "ed25519 source account",
                found: "muxed account".to_string(),
            })?;
        let time_bounds = match &self.tx.cond {
            Preconditions::None => None,
            Preconditions::Time(bounds) => Some(bounds.clone()),
            Preconditions::V2(_) => {
                return Err(CodecError::UnexpectedType {
                    expected: "time bounds",
                    found: "v2 preconditions".to_string(),
                })
            }
        };
        let v0 = TransactionV0 {
            source_account_ed25519: stellar_xdr::curr::Uint256(source),
            fee: self.tx.fee,
            seq_num: self.tx.seq_num.clone(),
            time_bounds,
            memo: self.tx.memo.clone(),
            operations: self.tx.operations.clone(),
            ext: TransactionV0Ext::V0,
        };
        Ok(v0.to_xdr(Limits::none())?)
    }

    /// Ed25519 key of the source account.
    pub fn signer_key(&self) -> Option<[u8; 32]> {
        match &self.tx.source_account {
            stellar_xdr::curr::MuxedAccount::Ed25519(key) => Some(key.0),
            stellar_xdr::curr::MuxedAccount::MuxedEd25519(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::ToScVal;

    fn request() -> InvocationRequest {
        InvocationRequest::new(
            Address::Contract([3u8; 32]),
            "revoke_warranty",
            vec![7u64.to_sc_val().unwrap()],
            Address::Account([9u8; 32]),
        )
    }

    fn source() -> SourceAccount {
        SourceAccount {
            address: Address::Account([9u8; 32]),
            sequence: 41,
        }
    }

    #[test]
    fn test_build_single_operation() {
        let unsigned = build(&request(), &source(), BASE_FEE, TimeoutPolicy::Infinite).unwrap();
        assert_eq!(unsigned.tx.seq_num, SequenceNumber(42));
        assert_eq!(unsigned.tx.fee, BASE_FEE);
        assert_eq!(unsigned.tx.operations.len(), 1);
        assert_eq!(unsigned.tx.cond, Preconditions::None);

        let OperationBody::InvokeHostFunction(op) = &unsigned.tx.operations[0].body else {
            panic!("expected invoke host function");
        };
        assert!(op.auth.is_empty());
        let HostFunction::InvokeContract(call) = &op.host_function else {
            panic!("expected contract call");
        };
        assert_eq!(call.function_name.0.as_slice(), b"revoke_warranty");
        assert_eq!(call.args.len(), 1);
    }

    #[test]
    fn test_build_is_pure() {
        let a = build(&request(), &source(), BASE_FEE, TimeoutPolicy::Until(1_000)).unwrap();
        let b = build(&request(), &source(), BASE_FEE, TimeoutPolicy::Until(1_000)).unwrap();
        assert_eq!(a, b);
        assert_eq!(
            a.tx.cond,
            Preconditions::Time(TimeBounds {
                min_time: TimePoint(0),
                max_time: TimePoint(1_000)
            })
        );
    }

    #[test]
    fn test_read_only_placeholder_source() {
        let req = InvocationRequest::read_only(Address::Contract([3u8; 32]), "get_warranty_count", vec![]);
        let unsigned = build(&req, &SourceAccount::placeholder(), BASE_FEE, TimeoutPolicy::Infinite).unwrap();
        assert_eq!(unsigned.tx.seq_num, SequenceNumber(1));
        assert!(unsigned.to_envelope_base64().is_ok());
    }

    #[test]
    fn test_contract_cannot_be_source() {
        let src = SourceAccount {
            address: Address::Contract([1u8; 32]),
            sequence: 0,
        };
        assert!(build(&request(), &src, BASE_FEE, TimeoutPolicy::Infinite).is_err());
    }

    #[test]
    fn test_timeout_from_secs() {
        assert_eq!(TimeoutPolicy::from_secs(Some(30), 100), TimeoutPolicy::Until(130));
        assert_eq!(TimeoutPolicy::from_secs(None, 100), TimeoutPolicy::Infinite);
    }

    #[test]
    fn test_hash_depends_on_network() {
        let unsigned = build(&request(), &source(), BASE_FEE, TimeoutPolicy::Infinite).unwrap();
        let a = transaction_hash(&unsigned.tx, TESTNET_PASSPHRASE).unwrap();
        let b = transaction_hash(&unsigned.tx, MAINNET_PASSPHRASE).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_v0_body_is_shorter_by_muxed_tag() {
        let unsigned = build(&request(), &source(), BASE_FEE, TimeoutPolicy::Infinite).unwrap();
        let assembled = AssembledTransaction {
            method: unsigned.method,
            tx: unsigned.tx,
            signatures: Vec::new(),
        };
        let v1 = assembled.body_xdr().unwrap();
        let v0 = assembled.body_xdr_v0().unwrap();
        assert_eq!(v1.len(), v0.len() + 4);
    }
}
