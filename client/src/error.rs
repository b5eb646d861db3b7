//! Error taxonomy and classification of raw failure payloads.

use std::fmt;

use thiserror::Error;

/// Marker the host emits when a parameter's encoding cannot be converted to
/// the contract's declared type during simulation.
pub const ENCODING_LIMITATION_MARKER: &str = "UnexpectedType";

/// Wire codec errors.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("XDR error: {0}")]
    Xdr(#[from] stellar_xdr::curr::Error),

    #[error("Base64 error: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Expected {expected}, found {found}")]
    UnexpectedType { expected: &'static str, found: String },

    #[error("Missing field: {0}")]
    MissingField(&'static str),

    #[error("Value out of range for {0}")]
    OutOfRange(&'static str),
}

/// Network-level failures. Never a ledger outcome.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Empty response from {0}")]
    EmptyResponse(&'static str),

    #[error("Unreadable response: {0}")]
    Decode(String),
}

/// Checks done locally before any network round trip.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid {field} address: {value}")]
    InvalidAddress { field: &'static str, value: String },

    #[error("Expiration date ({expiration}) must be after purchase date ({purchase})")]
    DateOrdering { purchase: u64, expiration: u64 },

    #[error("Purchase date ({purchase}) cannot be in the future (now {now})")]
    PurchaseInFuture { purchase: u64, now: u64 },

    #[error("Owner {owner} does not match signer {signer}; the owner must sign the registration")]
    OwnerMismatch { owner: String, signer: String },

    #[error("{0} must not be empty")]
    EmptyField(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimulationErrorKind {
    /// The contract aborted: invalid input or an access-control rejection.
    ContractPanic,
    /// A parameter encoding the host cannot simulate for this method.
    EncodingLimitation,
    /// The simulation response could not be interpreted.
    Malformed,
}

/// A classified simulation failure.
///
/// `detail` always keeps the raw payload; `guidance` replaces it in the
/// rendered message when a method-specific refinement applies.
#[derive(Debug)]
pub struct SimulationError {
    pub method: String,
    pub kind: SimulationErrorKind,
    pub detail: String,
    pub guidance: Option<String>,
}

impl fmt::Display for SimulationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let message = self.guidance.as_deref().unwrap_or(&self.detail);
        write!(
            f,
            "Simulation of {} failed ({:?}): {}",
            self.method, self.kind, message
        )
    }
}

impl std::error::Error for SimulationError {}

/// Everything an invocation can fail with.
#[derive(Debug, Error)]
pub enum InvocationError {
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Simulation(#[from] SimulationError),

    #[error("Signer did not sign: {0}")]
    Signer(String),

    #[error("Malformed authorization data: {0}")]
    Authorization(String),

    #[error("Unreadable signed envelope: {0}")]
    EnvelopeFormat(String),

    #[error("Envelope reconciliation failed: {0}")]
    Reconciliation(String),

    #[error("Submission rejected ({status}): {detail}")]
    SubmissionRejected { status: String, detail: String },

    #[error("Could not decode return value: {0}")]
    ExtractionAmbiguous(String),

    #[error("Encoding error: {0}")]
    Encoding(#[from] CodecError),
}

impl InvocationError {
    pub fn simulation_kind(&self) -> Option<SimulationErrorKind> {
        match self {
            InvocationError::Simulation(e) => Some(e.kind),
            _ => None,
        }
    }

    /// True when the failure happened before anything reached the network.
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            InvocationError::Validation(_) | InvocationError::Encoding(_)
        )
    }
}

const PANIC_MARKERS: &[&str] = &[
    "WasmVm",
    "UnreachableCodeReached",
    "InvalidAction",
    "Error(Auth",
    "Error(Context",
    "Error(Storage",
    "panicked",
];

/// Methods whose panics almost always mean a missing warranty or a signer
/// that does not own it.
const OWNER_GATED_METHODS: &[&str] = &["transfer_ownership", "revoke_warranty", "update_status"];

/// Classify a ledger-side simulation error payload.
pub fn classify_simulation_error(method: &str, payload: &str) -> SimulationError {
    if method == "update_status" && payload.contains(ENCODING_LIMITATION_MARKER) {
        return SimulationError {
            method: method.to_string(),
            kind: SimulationErrorKind::EncodingLimitation,
            detail: payload.to_string(),
            guidance: Some(
                "The status argument cannot be simulated for update_status; \
                 use revoke_warranty to revoke a warranty instead"
                    .to_string(),
            ),
        };
    }

    let aborted = PANIC_MARKERS.iter().any(|m| payload.contains(m));
    let guidance = if !aborted {
        None
    } else if OWNER_GATED_METHODS.contains(&method) {
        Some("Warranty not found or the signer is not its owner".to_string())
    } else if method == "register_warranty" {
        Some(
            "The contract rejected the registration; check the dates and that the owner signed"
                .to_string(),
        )
    } else {
        None
    };

    SimulationError {
        method: method.to_string(),
        kind: SimulationErrorKind::ContractPanic,
        detail: payload.to_string(),
        guidance,
    }
}

/// A simulation response that could not be interpreted at all.
pub fn malformed_simulation(method: &str, detail: impl Into<String>) -> SimulationError {
    SimulationError {
        method: method.to_string(),
        kind: SimulationErrorKind::Malformed,
        detail: detail.into(),
        guidance: None,
    }
}
