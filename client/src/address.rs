//! Stellar strkey addresses.
//!
//! Accounts are `G...` ed25519 public keys, contracts are `C...` ids. Both
//! map onto `ScAddress` when passed to a contract.

use std::fmt;
use std::str::FromStr;

use stellar_strkey::{ed25519::PublicKey as StrkeyPublicKey, Contract as StrkeyContract};
use stellar_xdr::curr::{AccountId, Hash, MuxedAccount, PublicKey, ScAddress, Uint256};

use crate::error::CodecError;

/// All-zero ed25519 key. Simulation only needs a syntactically valid source.
pub const PLACEHOLDER_ACCOUNT: &str = "GAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAWHF";

/// A parsed ledger address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Address {
    Account([u8; 32]),
    Contract([u8; 32]),
}

impl Address {
    /// Parse a `G...` or `C...` strkey.
    pub fn parse(s: &str) -> Result<Self, CodecError> {
        let s = s.trim();
        if let Ok(pk) = StrkeyPublicKey::from_string(s) {
            return Ok(Address::Account(pk.0));
        }
        if let Ok(contract) = StrkeyContract::from_string(s) {
            return Ok(Address::Contract(contract.0));
        }
        Err(CodecError::InvalidAddress(s.to_string()))
    }

    /// Parse an address that must be an account (transaction sources, signers).
    pub fn parse_account(s: &str) -> Result<Self, CodecError> {
        match Self::parse(s)? {
            addr @ Address::Account(_) => Ok(addr),
            Address::Contract(_) => Err(CodecError::InvalidAddress(format!(
                "{} is a contract, expected an account",
                s
            ))),
        }
    }

    pub fn placeholder() -> Self {
        Address::Account([0u8; 32])
    }

    pub fn is_account(&self) -> bool {
        matches!(self, Address::Account(_))
    }

    /// Raw ed25519 key bytes for account addresses.
    pub fn account_key(&self) -> Option<[u8; 32]> {
        match self {
            Address::Account(key) => Some(*key),
            Address::Contract(_) => None,
        }
    }

    pub fn to_sc_address(&self) -> ScAddress {
        match self {
            Address::Account(key) => ScAddress::Account(AccountId(
                PublicKey::PublicKeyTypeEd25519(Uint256(*key)),
            )),
            Address::Contract(id) => ScAddress::Contract(Hash(*id)),
        }
    }

    pub fn from_sc_address(addr: &ScAddress) -> Self {
        match addr {
            ScAddress::Account(AccountId(PublicKey::PublicKeyTypeEd25519(Uint256(key)))) => {
                Address::Account(*key)
            }
            ScAddress::Contract(Hash(id)) => Address::Contract(*id),
        }
    }

    /// Transaction source form. Contracts cannot source transactions.
    pub fn to_muxed_account(&self) -> Result<MuxedAccount, CodecError> {
        match self {
            Address::Account(key) => Ok(MuxedAccount::Ed25519(Uint256(*key))),
            Address::Contract(_) => Err(CodecError::InvalidAddress(format!(
                "{} cannot be a transaction source",
                self
            ))),
        }
    }

    /// Short display version, e.g. `GABC1234...WXYZ56`.
    pub fn short(&self) -> String {
        let s = self.to_string();
        if s.len() > 16 {
            format!("{}...{}", &s[..8], &s[s.len() - 6..])
        } else {
            s
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Address::Account(key) => write!(f, "{}", StrkeyPublicKey(*key).to_string()),
            Address::Contract(id) => write!(f, "{}", StrkeyContract(*id).to_string()),
        }
    }
}

impl FromStr for Address {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
