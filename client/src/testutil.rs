//! In-memory fakes for the network and signer boundaries.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use ed25519_dalek::SigningKey;
use serde_json::Value;
use stellar_xdr::curr::{
    BytesM, DecoratedSignature, ExtensionPoint, Hash, HostFunction, InvokeContractArgs,
    LedgerFootprint, Limits, OperationBody, ScAddress, ScVal, Signature, SignatureHint,
    SorobanAuthorizationEntry, SorobanAuthorizedFunction, SorobanAuthorizedInvocation, SorobanCredentials, SorobanResources, SorobanTransactionData,
    Transaction, TransactionEnvelope, VecM, WriteXdr,
};

use crate::address::Address;
use crate::assemble::assemble;
use crate::codec::{self, ReturnValue};
use crate::error::TransportError;
use crate::horizon::AccountSource;
use crate::rpc::{
    GetTransactionResponse, LedgerRpc, SendTransactionResponse, SimulateHostFunctionResult,
    SimulateTransactionResponse,
};
use crate::signer::{LocalKeySigner, SignerResponse, TransactionSigner};
use crate::simulate::{compute_fee, SimulationSuccess};
use crate::transaction::{
    build, AssembledTransaction, InvocationRequest, SourceAccount, TimeoutPolicy,
    UnsignedTransaction, BASE_FEE, TESTNET_PASSPHRASE,
};

pub const PASSPHRASE: &str = TESTNET_PASSPHRASE;
pub const CONTRACT: Address = Address::Contract([3u8; 32]);
pub const SEQUENCE: i64 = 41;
pub const RESOURCE_FEE: i64 = 58181;

pub fn local_signer() -> LocalKeySigner {
    LocalKeySigner::new(SigningKey::from_bytes(&[7u8; 32]))
}

pub fn signer_address() -> Address {
    Address::Account(local_signer().public_key())
}

pub fn transaction_data() -> SorobanTransactionData {
    SorobanTransactionData {
        ext: ExtensionPoint::V0,
        resources: SorobanResources {
            footprint: LedgerFootprint {
                read_only: VecM::default(),
                read_write: VecM::default(),
            },
            instructions: 1_000_000,
            read_bytes: 1_024,
            write_bytes: 256,
        },
        resource_fee: RESOURCE_FEE,
    }
}

pub fn transaction_data_b64() -> String {
    codec::to_base64(&transaction_data()).unwrap()
}

pub fn auth_entry_b64() -> String {
    let entry = SorobanAuthorizationEntry {
        credentials: SorobanCredentials::SourceAccount,
        root_invocation: SorobanAuthorizedInvocation {
            function: SorobanAuthorizedFunction::ContractFn(InvokeContractArgs {
                contract_address: ScAddress::Contract(Hash([3u8; 32])),
                function_name: codec::symbol("register_warranty").unwrap(),
                args: VecM::default(),
            }),
            sub_invocations: VecM::default(),
        },
    };
    codec::to_base64(&entry).unwrap()
}

/// XDR for `levels` single-element `ScVal::Vec`s wrapped around a void.
///
/// Written by hand since encoding a value this deep would itself recurse.
pub fn nested_vec_xdr(levels: usize) -> Vec<u8> {
    const SCV_VOID: u32 = 1;
    const SCV_VEC: u32 = 16;
    let mut bytes = Vec::with_capacity(levels * 12 + 4);
    for _ in 0..levels {
        bytes.extend_from_slice(&SCV_VEC.to_be_bytes());
        // Option::Some, then a length of one
        bytes.extend_from_slice(&1u32.to_be_bytes());
        bytes.extend_from_slice(&1u32.to_be_bytes());
    }
    bytes.extend_from_slice(&SCV_VOID.to_be_bytes());
    bytes
}

pub fn dummy_signature() -> DecoratedSignature {
    let bytes: BytesM<64> = vec![0xAB; 64].try_into().unwrap();
    DecoratedSignature {
        hint: SignatureHint([1, 2, 3, 4]),
        signature: Signature(bytes),
    }
}

pub fn unsigned_from(signer: Address, method: &str) -> UnsignedTransaction {
    let request = InvocationRequest::new(CONTRACT, method, vec![], signer);
    let source = SourceAccount {
        address: signer,
        sequence: SEQUENCE,
    };
    build(&request, &source, BASE_FEE, TimeoutPolicy::Infinite).unwrap()
}

pub fn unsigned(method: &str) -> UnsignedTransaction {
    unsigned_from(signer_address(), method)
}

pub fn simulation_success(
    return_value: Option<ReturnValue>,
    auth: Vec<String>,
) -> SimulationSuccess {
    SimulationSuccess {
        transaction_data: Some(transaction_data()),
        min_resource_fee: RESOURCE_FEE,
        return_value,
        auth,
        cost: None,
        latest_ledger: 100,
    }
}

/// Built, fee-prepared and assembled for `signer`'s account, not yet signed.
pub fn assembled_for(signer: &LocalKeySigner, method: &str) -> AssembledTransaction {
    let unsigned = unsigned_from(Address::Account(signer.public_key()), method);
    let success = simulation_success(None, vec![auth_entry_b64()]);
    let prepared = compute_fee(&unsigned, &success).unwrap();
    assemble(prepared, &success).unwrap()
}

/// Assembled and signed on the clean path.
pub async fn signed_assembled(method: &str) -> AssembledTransaction {
    let signer = local_signer();
    let mut assembled = assembled_for(&signer, method);
    let signed = signer
        .sign_transaction(&assembled.to_envelope_base64().unwrap(), PASSPHRASE)
        .await
        .into_envelope()
        .unwrap();
    let envelope: TransactionEnvelope = codec::from_base64(&signed).unwrap();
    let TransactionEnvelope::Tx(env) = envelope else {
        panic!("expected v1 envelope");
    };
    for sig in env.signatures.iter() {
        assembled.append_signature(sig.clone());
    }
    assembled
}

pub fn success_response(xdr: Value, auth: Vec<String>) -> SimulateTransactionResponse {
    SimulateTransactionResponse {
        transaction_data: Some(transaction_data_b64()),
        min_resource_fee: Some(RESOURCE_FEE.to_string()),
        results: vec![SimulateHostFunctionResult { auth, xdr }],
        latest_ledger: 100,
        ..Default::default()
    }
}

pub fn failure_response(error: &str) -> SimulateTransactionResponse {
    SimulateTransactionResponse {
        error: Some(error.to_string()),
        latest_ledger: 100,
        ..Default::default()
    }
}

pub fn pending() -> SendTransactionResponse {
    SendTransactionResponse {
        status: "PENDING".to_string(),
        hash: "f00d".to_string(),
        ..Default::default()
    }
}

/// Scripted responses are consumed in order; the last one repeats.
fn next<T: Clone>(queue: &Mutex<VecDeque<T>>) -> Option<T> {
    let mut queue = queue.lock().unwrap();
    if queue.len() > 1 {
        queue.pop_front()
    } else {
        queue.front().cloned()
    }
}

/// Most specific first: `method:<arg>`, then `method`.
fn route_keys(envelope_xdr: &str) -> Vec<String> {
    let Ok(TransactionEnvelope::Tx(env)) = codec::from_base64::<TransactionEnvelope>(envelope_xdr)
    else {
        return Vec::new();
    };
    let Some(OperationBody::InvokeHostFunction(op)) = env.tx.operations.first().map(|op| &op.body)
    else {
        return Vec::new();
    };
    let HostFunction::InvokeContract(call) = &op.host_function else {
        return Vec::new();
    };
    let method = String::from_utf8_lossy(call.function_name.0.as_slice()).to_string();
    let mut keys = Vec::new();
    if let Some(ScVal::U64(arg)) = call.args.first() {
        keys.push(format!("{}:{}", method, arg));
    }
    keys.push(method);
    keys
}

#[derive(Default)]
pub struct FakeRpc {
    simulations: Mutex<VecDeque<SimulateTransactionResponse>>,
    routes: Mutex<HashMap<String, SimulateTransactionResponse>>,
    sends: Mutex<VecDeque<SendTransactionResponse>>,
    statuses: Mutex<VecDeque<GetTransactionResponse>>,
    simulated: Mutex<Vec<String>>,
    sent: Mutex<Vec<String>>,
    polled: Mutex<u32>,
}

impl FakeRpc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_simulation(self, resp: SimulateTransactionResponse) -> Self {
        self.simulations.lock().unwrap().push_back(resp);
        self
    }

    /// Answer simulations of `key` (`"method"` or `"method:<first u64 arg>"`).
    pub fn with_simulation_for(self, key: &str, resp: SimulateTransactionResponse) -> Self {
        self.routes.lock().unwrap().insert(key.to_string(), resp);
        self
    }

    pub fn with_send(self, resp: SendTransactionResponse) -> Self {
        self.sends.lock().unwrap().push_back(resp);
        self
    }

    pub fn with_get_transaction(self, resp: GetTransactionResponse) -> Self {
        self.statuses.lock().unwrap().push_back(resp);
        self
    }

    /// Envelopes passed to `simulateTransaction`.
    pub fn simulated(&self) -> Vec<String> {
        self.simulated.lock().unwrap().clone()
    }

    /// Envelopes passed to `sendTransaction`.
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    pub fn polled(&self) -> u32 {
        *self.polled.lock().unwrap()
    }

    pub fn calls(&self) -> usize {
        self.simulated().len() + self.sent().len() + self.polled() as usize
    }
}

#[async_trait]
impl LedgerRpc for FakeRpc {
    async fn simulate_transaction(
        &self,
        envelope_xdr: &str,
    ) -> Result<SimulateTransactionResponse, TransportError> {
        self.simulated.lock().unwrap().push(envelope_xdr.to_string());
        {
            let routes = self.routes.lock().unwrap();
            for key in route_keys(envelope_xdr) {
                if let Some(resp) = routes.get(&key) {
                    return Ok(resp.clone());
                }
            }
        }
        next(&self.simulations).ok_or(TransportError::EmptyResponse("simulateTransaction"))
    }

    async fn send_transaction(
        &self,
        envelope_xdr: &str,
    ) -> Result<SendTransactionResponse, TransportError> {
        self.sent.lock().unwrap().push(envelope_xdr.to_string());
        next(&self.sends).ok_or(TransportError::EmptyResponse("sendTransaction"))
    }

    async fn get_transaction(&self, _hash: &str) -> Result<GetTransactionResponse, TransportError> {
        *self.polled.lock().unwrap() += 1;
        next(&self.statuses).ok_or(TransportError::EmptyResponse("getTransaction"))
    }
}

#[derive(Default)]
pub struct FakeAccounts {
    sequences: HashMap<Address, i64>,
    loads: Mutex<u32>,
}

impl FakeAccounts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_account(mut self, address: Address, sequence: i64) -> Self {
        self.sequences.insert(address, sequence);
        self
    }

    pub fn loads(&self) -> u32 {
        *self.loads.lock().unwrap()
    }
}

#[async_trait]
impl AccountSource for FakeAccounts {
    async fn load_account(&self, address: &Address) -> Result<SourceAccount, TransportError> {
        *self.loads.lock().unwrap() += 1;
        match self.sequences.get(address) {
            Some(sequence) => Ok(SourceAccount {
                address: *address,
                sequence: *sequence,
            }),
            None => Err(TransportError::Status {
                status: 404,
                body: "account not found".to_string(),
            }),
        }
    }
}

/// Byte offset of the memo tag inside a v1 envelope of `tx`.
fn memo_offset(tx: &Transaction) -> usize {
    let cond = tx.cond.to_xdr(Limits::none()).unwrap().len();
    // envelope tag, muxed ed25519 source, fee, sequence
    4 + 36 + 4 + 8 + cond
}

/// Signs correctly, then re-serializes with a memo arm this XDR build does
/// not know, the way some wallets re-encode envelopes.
pub struct CorruptingSigner {
    inner: LocalKeySigner,
}

impl CorruptingSigner {
    pub fn new(inner: LocalKeySigner) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &LocalKeySigner {
        &self.inner
    }
}

#[async_trait]
impl TransactionSigner for CorruptingSigner {
    async fn sign_transaction(&self, envelope_xdr: &str, network_passphrase: &str) -> SignerResponse {
        let signed = match self
            .inner
            .sign_transaction(envelope_xdr, network_passphrase)
            .await
            .into_envelope()
        {
            Ok(signed) => signed,
            Err(e) => return SignerResponse::refused(e.to_string()),
        };
        let envelope: TransactionEnvelope = codec::from_base64(&signed).unwrap();
        let TransactionEnvelope::Tx(env) = envelope else {
            panic!("expected v1 envelope");
        };
        let mut bytes = codec::decode_base64_bytes(&signed).unwrap();
        let at = memo_offset(&env.tx);
        bytes[at..at + 4].copy_from_slice(&99u32.to_be_bytes());
        SignerResponse::signed(codec::encode_base64_bytes(&bytes))
    }
}

pub struct RefusingSigner;

#[async_trait]
impl TransactionSigner for RefusingSigner {
    async fn sign_transaction(&self, _envelope_xdr: &str, _network_passphrase: &str) -> SignerResponse {
        SignerResponse::refused("user rejected the request")
    }
}
