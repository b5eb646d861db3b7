//! Warranty Tracker client: invoke the warranty contract on Soroban.
//!
//! ```text
//! build -> simulate -> fee -> assemble -> sign -> reconcile -> submit -> extract
//! ```
//!
//! Read-only queries stop after simulation.

pub mod address;
pub mod assemble;
pub mod client;
pub mod codec;
pub mod config;
pub mod error;
pub mod horizon;
pub mod reconcile;
pub mod rpc;
pub mod signer;
pub mod simulate;
pub mod submit;
pub mod transaction;
pub mod wallet;
pub mod warranty;

#[cfg(test)]
mod testutil;

pub use address::Address;
pub use client::{Invocation, WarrantyClient};
pub use config::ClientConfig;
pub use error::{InvocationError, SimulationErrorKind};
pub use signer::{LocalKeySigner, SignerResponse, TransactionSigner};
pub use submit::InvocationResult;
pub use warranty::{NewWarranty, WarrantyData, WarrantyStatus};
