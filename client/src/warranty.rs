//! Warranty records as the contract stores them.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use stellar_xdr::curr::{ScMap, ScMapEntry, ScVal, ScVec, VecM};

use crate::address::Address;
use crate::codec::{self, map_field, FromScVal, NativeValue, ToScVal};
use crate::error::{CodecError, ValidationError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WarrantyStatus {
    Active,
    Expired,
    Revoked,
}

impl WarrantyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WarrantyStatus::Active => "Active",
            WarrantyStatus::Expired => "Expired",
            WarrantyStatus::Revoked => "Revoked",
        }
    }
}

impl fmt::Display for WarrantyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WarrantyStatus {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "active" => Ok(WarrantyStatus::Active),
            "expired" => Ok(WarrantyStatus::Expired),
            "revoked" => Ok(WarrantyStatus::Revoked),
            _ => Err(CodecError::UnexpectedType {
                expected: "Active, Expired or Revoked",
                found: s.to_string(),
            }),
        }
    }
}

// Unit enum variants travel as a one-element vec holding the variant symbol.
impl ToScVal for WarrantyStatus {
    fn to_sc_val(&self) -> Result<ScVal, CodecError> {
        let items: VecM<ScVal> = vec![ScVal::Symbol(codec::symbol(self.as_str())?)].try_into()?;
        Ok(ScVal::Vec(Some(ScVec(items))))
    }
}

impl FromScVal for WarrantyStatus {
    fn from_sc_val(value: &ScVal) -> Result<Self, CodecError> {
        let name = match value {
            ScVal::Vec(Some(ScVec(items))) if items.len() == 1 => String::from_sc_val(&items[0])?,
            // Tolerate a bare symbol
            ScVal::Symbol(_) => String::from_sc_val(value)?,
            other => {
                return Err(CodecError::UnexpectedType {
                    expected: "status",
                    found: codec::kind_of(other),
                })
            }
        };
        name.parse()
    }

    fn from_native(value: &NativeValue) -> Result<Self, CodecError> {
        match value {
            NativeValue::Vec(items) if items.len() == 1 => Self::from_native(&items[0]),
            NativeValue::Symbol(name) | NativeValue::Str(name) => {
                let status: WarrantyStatus = name.parse()?;
                Self::from_sc_val(&status.to_sc_val()?)
            }
            other => Err(other.unexpected("status")),
        }
    }
}

/// A registered warranty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarrantyData {
    pub id: u64,
    pub owner: String,
    pub product_name: String,
    pub serial_number: String,
    pub manufacturer: String,
    pub purchase_date: u64,
    pub expiration_date: u64,
    pub status: WarrantyStatus,
    pub created_at: u64,
}

impl FromScVal for WarrantyData {
    fn from_sc_val(value: &ScVal) -> Result<Self, CodecError> {
        Ok(Self {
            id: u64::from_sc_val(map_field(value, "id")?)?,
            owner: Address::from_sc_val(map_field(value, "owner")?)?.to_string(),
            product_name: String::from_sc_val(map_field(value, "product_name")?)?,
            serial_number: String::from_sc_val(map_field(value, "serial_number")?)?,
            manufacturer: String::from_sc_val(map_field(value, "manufacturer")?)?,
            purchase_date: u64::from_sc_val(map_field(value, "purchase_date")?)?,
            expiration_date: u64::from_sc_val(map_field(value, "expiration_date")?)?,
            status: WarrantyStatus::from_sc_val(map_field(value, "status")?)?,
            created_at: u64::from_sc_val(map_field(value, "created_at")?)?,
        })
    }

    fn from_native(value: &NativeValue) -> Result<Self, CodecError> {
        Ok(Self {
            id: u64::from_native(value.field("id")?)?,
            owner: Address::from_native(value.field("owner")?)?.to_string(),
            product_name: String::from_native(value.field("product_name")?)?,
            serial_number: String::from_native(value.field("serial_number")?)?,
            manufacturer: String::from_native(value.field("manufacturer")?)?,
            purchase_date: u64::from_native(value.field("purchase_date")?)?,
            expiration_date: u64::from_native(value.field("expiration_date")?)?,
            status: WarrantyStatus::from_native(value.field("status")?)?,
            created_at: u64::from_native(value.field("created_at")?)?,
        })
    }
}

impl ToScVal for WarrantyData {
    fn to_sc_val(&self) -> Result<ScVal, CodecError> {
        let owner = Address::parse(&self.owner)?;
        // Keys sorted, as the host requires for struct maps
        let fields = [
            ("created_at", self.created_at.to_sc_val()?),
            ("expiration_date", self.expiration_date.to_sc_val()?),
            ("id", self.id.to_sc_val()?),
            ("manufacturer", self.manufacturer.to_sc_val()?),
            ("owner", owner.to_sc_val()?),
            ("product_name", self.product_name.to_sc_val()?),
            ("purchase_date", self.purchase_date.to_sc_val()?),
            ("serial_number", self.serial_number.to_sc_val()?),
            ("status", self.status.to_sc_val()?),
        ];
        let entries = fields
            .into_iter()
            .map(|(key, val)| {
                Ok(ScMapEntry {
                    key: ScVal::Symbol(codec::symbol(key)?),
                    val,
                })
            })
            .collect::<Result<Vec<_>, CodecError>>()?;
        let entries: VecM<ScMapEntry> = entries.try_into()?;
        Ok(ScVal::Map(Some(ScMap(entries))))
    }
}

/// Arguments for `register_warranty`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewWarranty {
    pub owner: String,
    pub product_name: String,
    pub serial_number: String,
    pub manufacturer: String,
    pub purchase_date: u64,
    pub expiration_date: u64,
}

impl NewWarranty {
    /// Local checks mirroring the contract's own, plus the signer binding.
    ///
    /// Returns the parsed owner address.
    pub fn validate(&self, signer: &Address, now: u64) -> Result<Address, ValidationError> {
        let owner = Address::parse(&self.owner).map_err(|_| ValidationError::InvalidAddress {
            field: "owner",
            value: self.owner.clone(),
        })?;

        if owner != *signer {
            return Err(ValidationError::OwnerMismatch {
                owner: owner.to_string(),
                signer: signer.to_string(),
            });
        }

        for (field, value) in [
            ("product_name", &self.product_name),
            ("serial_number", &self.serial_number),
            ("manufacturer", &self.manufacturer),
        ] {
            if value.trim().is_empty() {
                return Err(ValidationError::EmptyField(field));
            }
        }

        if self.expiration_date <= self.purchase_date {
            return Err(ValidationError::DateOrdering {
                purchase: self.purchase_date,
                expiration: self.expiration_date,
            });
        }

        if self.purchase_date > now {
            return Err(ValidationError::PurchaseInFuture {
                purchase: self.purchase_date,
                now,
            });
        }

        Ok(owner)
    }

    /// Contract arguments in declaration order.
    pub fn to_args(&self, owner: &Address) -> Result<Vec<ScVal>, CodecError> {
        Ok(vec![
            owner.to_sc_val()?,
            self.product_name.to_sc_val()?,
            self.serial_number.to_sc_val()?,
            self.manufacturer.to_sc_val()?,
            self.purchase_date.to_sc_val()?,
            self.expiration_date.to_sc_val()?,
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // 2024-01-01 and 2023-01-01 UTC
    const JAN_2024: u64 = 1_704_067_200;
    const JAN_2023: u64 = 1_672_531_200;

    fn owner() -> Address {
        Address::Account([9u8; 32])
    }

    fn new_warranty() -> NewWarranty {
        NewWarranty {
            owner: owner().to_string(),
            product_name: "Laptop".to_string(),
            serial_number: "SN123456".to_string(),
            manufacturer: "TechCorp".to_string(),
            purchase_date: JAN_2024,
            expiration_date: JAN_2024 + 31_536_000,
        }
    }

    fn sample() -> WarrantyData {
        WarrantyData {
            id: 1,
            owner: owner().to_string(),
            product_name: "Laptop".to_string(),
            serial_number: "SN123456".to_string(),
            manufacturer: "TechCorp".to_string(),
            purchase_date: JAN_2024,
            expiration_date: JAN_2024 + 31_536_000,
            status: WarrantyStatus::Active,
            created_at: JAN_2024 + 86_400,
        }
    }

    #[test]
    fn test_status_encoding() {
        let value = WarrantyStatus::Revoked.to_sc_val().unwrap();
        assert_eq!(WarrantyStatus::from_sc_val(&value).unwrap(), WarrantyStatus::Revoked);
        assert_eq!("expired".parse::<WarrantyStatus>().unwrap(), WarrantyStatus::Expired);
        assert!("lost".parse::<WarrantyStatus>().is_err());
    }

    #[test]
    fn test_record_from_wire() {
        let warranty = sample();
        let value = warranty.to_sc_val().unwrap();
        assert_eq!(WarrantyData::from_sc_val(&value).unwrap(), warranty);
    }

    #[test]
    fn test_record_from_structured_json() {
        let warranty = sample();
        let json = json!({
            "map": [
                { "key": { "symbol": "created_at" }, "val": { "u64": (JAN_2024 + 86_400).to_string() } },
                { "key": { "symbol": "expiration_date" }, "val": { "u64": JAN_2024 + 31_536_000 } },
                { "key": { "symbol": "id" }, "val": { "u64": 1 } },
                { "key": { "symbol": "manufacturer" }, "val": { "string": "TechCorp" } },
                { "key": { "symbol": "owner" }, "val": { "address": owner().to_string() } },
                { "key": { "symbol": "product_name" }, "val": { "string": "Laptop" } },
                { "key": { "symbol": "purchase_date" }, "val": { "u64": JAN_2024 } },
                { "key": { "symbol": "serial_number" }, "val": { "string": "SN123456" } },
                { "key": { "symbol": "status" }, "val": { "vec": [{ "symbol": "Active" }] } }
            ]
        });
        let native = NativeValue::from_json(&json).unwrap();
        assert_eq!(WarrantyData::from_native(&native).unwrap(), warranty);
    }

    #[test]
    fn test_missing_field() {
        let value = ScVal::Map(Some(ScMap(VecM::default())));
        assert!(matches!(
            WarrantyData::from_sc_val(&value),
            Err(CodecError::MissingField("id"))
        ));
    }

    #[test]
    fn test_validate_ok() {
        let parsed = new_warranty().validate(&owner(), JAN_2024 + 10).unwrap();
        assert_eq!(parsed, owner());
        assert_eq!(new_warranty().to_args(&parsed).unwrap().len(), 6);
    }

    #[test]
    fn test_validate_date_ordering() {
        let mut w = new_warranty();
        w.expiration_date = JAN_2023;
        assert_eq!(
            w.validate(&owner(), JAN_2024 + 10),
            Err(ValidationError::DateOrdering {
                purchase: JAN_2024,
                expiration: JAN_2023
            })
        );
    }

    #[test]
    fn test_validate_owner_mismatch() {
        let other = Address::Account([1u8; 32]);
        assert!(matches!(
            new_warranty().validate(&other, JAN_2024 + 10),
            Err(ValidationError::OwnerMismatch { .. })
        ));
    }

    #[test]
    fn test_validate_bad_owner_and_empty_fields() {
        let mut w = new_warranty();
        w.owner = "GNOPE".to_string();
        assert!(matches!(
            w.validate(&owner(), JAN_2024 + 10),
            Err(ValidationError::InvalidAddress { field: "owner", .. })
        ));

        let mut w = new_warranty();
        w.manufacturer = "  ".to_string();
        assert_eq!(
            w.validate(&owner(), JAN_2024 + 10),
            Err(ValidationError::EmptyField("manufacturer"))
        );
    }

    #[test]
    fn test_validate_future_purchase() {
        assert!(matches!(
            new_warranty().validate(&owner(), JAN_2024 - 1),
            Err(ValidationError::PurchaseInFuture { .. })
        ));
    }
}
