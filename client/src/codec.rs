//! Wire codec between native values and the ledger's `ScVal` encoding.
//!
//! Return values reach us in three shapes: an already-decoded `ScVal`, a
//! base64 XDR string, or the RPC server's JSON rendering of the value. The
//! JSON shape goes through a generic [`NativeValue`] first and is then
//! re-encoded into whatever type the caller expects.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde_json::Value;
use stellar_xdr::curr::{
    Limits, ReadXdr, ScString, ScSymbol, ScVal, ScVec, StringM, VecM, WriteXdr,
};

use crate::address::Address;
use crate::error::CodecError;

/// Serialize any XDR type to its base64 text form.
pub fn to_base64<T: WriteXdr>(value: &T) -> Result<String, CodecError> {
    Ok(BASE64.encode(value.to_xdr(Limits::none())?))
}

/// Nesting bound for XDR read from the network or a signer.
pub const XDR_DEPTH_LIMIT: u32 = 500;

/// Read limits for `len` bytes of untrusted XDR.
pub fn read_limits(len: usize) -> Limits {
    Limits {
        depth: XDR_DEPTH_LIMIT,
        len,
    }
}

/// Parse any XDR type from raw bytes, bounded by [`read_limits`].
pub fn from_xdr_bytes<T: ReadXdr>(bytes: &[u8]) -> Result<T, stellar_xdr::curr::Error> {
    T::from_xdr(bytes, read_limits(bytes.len()))
}

/// Parse any XDR type from its base64 text form.
pub fn from_base64<T: ReadXdr>(b64: &str) -> Result<T, CodecError> {
    let bytes = decode_base64_bytes(b64)?;
    Ok(from_xdr_bytes(&bytes)?)
}

pub fn decode_base64_bytes(b64: &str) -> Result<Vec<u8>, CodecError> {
    Ok(BASE64.decode(b64.trim())?)
}

pub fn encode_base64_bytes(bytes: &[u8]) -> String {
    BASE64.encode(bytes)
}

pub fn symbol(name: &str) -> Result<ScSymbol, CodecError> {
    let s: StringM<32> = name.try_into()?;
    Ok(ScSymbol(s))
}

/// Short human name of a value's type, for error messages.
pub fn kind_of(value: &ScVal) -> String {
    let kind = match value {
        ScVal::Void => "void",
        ScVal::Bool(_) => "bool",
        ScVal::U32(_) => "u32",
        ScVal::I32(_) => "i32",
        ScVal::U64(_) => "u64",
        ScVal::I64(_) => "i64",
        ScVal::U128(_) => "u128",
        ScVal::I128(_) => "i128",
        ScVal::Bytes(_) => "bytes",
        ScVal::String(_) => "string",
        ScVal::Symbol(_) => "symbol",
        ScVal::Vec(_) => "vec",
        ScVal::Map(_) => "map",
        ScVal::Address(_) => "address",
        _ => "other",
    };
    kind.to_string()
}

fn unexpected(expected: &'static str, found: &ScVal) -> CodecError {
    CodecError::UnexpectedType {
        expected,
        found: kind_of(found),
    }
}

/// Native value to wire value.
pub trait ToScVal {
    fn to_sc_val(&self) -> Result<ScVal, CodecError>;
}

/// Wire value to native value.
pub trait FromScVal: Sized {
    fn from_sc_val(value: &ScVal) -> Result<Self, CodecError>;

    /// Convert a generically decoded value by re-encoding it as this type.
    fn from_native(value: &NativeValue) -> Result<Self, CodecError>;
}

impl ToScVal for u64 {
    fn to_sc_val(&self) -> Result<ScVal, CodecError> {
        Ok(ScVal::U64(*self))
    }
}

impl FromScVal for u64 {
    fn from_sc_val(value: &ScVal) -> Result<Self, CodecError> {
        match value {
            ScVal::U64(n) => Ok(*n),
            ScVal::U32(n) => Ok(u64::from(*n)),
            other => Err(unexpected("u64", other)),
        }
    }

    fn from_native(value: &NativeValue) -> Result<Self, CodecError> {
        let n = u64::try_from(value.as_int()?).map_err(|_| CodecError::OutOfRange("u64"))?;
        Self::from_sc_val(&ScVal::U64(n))
    }
}

/// Contract functions returning `()` travel as `Void`.
impl FromScVal for () {
    fn from_sc_val(value: &ScVal) -> Result<Self, CodecError> {
        match value {
            ScVal::Void => Ok(()),
            other => Err(unexpected("void", other)),
        }
    }

    fn from_native(value: &NativeValue) -> Result<Self, CodecError> {
        match value {
            NativeValue::Void => Ok(()),
            other => Err(other.unexpected("void")),
        }
    }
}

impl ToScVal for bool {
    fn to_sc_val(&self) -> Result<ScVal, CodecError> {
        Ok(ScVal::Bool(*self))
    }
}

impl FromScVal for bool {
    fn from_sc_val(value: &ScVal) -> Result<Self, CodecError> {
        match value {
            ScVal::Bool(b) => Ok(*b),
            other => Err(unexpected("bool", other)),
        }
    }

    fn from_native(value: &NativeValue) -> Result<Self, CodecError> {
        match value {
            NativeValue::Bool(b) => Self::from_sc_val(&ScVal::Bool(*b)),
            other => Err(other.unexpected("bool")),
        }
    }
}

impl ToScVal for str {
    fn to_sc_val(&self) -> Result<ScVal, CodecError> {
        let s: StringM = self.try_into()?;
        Ok(ScVal::String(ScString(s)))
    }
}

impl ToScVal for String {
    fn to_sc_val(&self) -> Result<ScVal, CodecError> {
        self.as_str().to_sc_val()
    }
}

impl FromScVal for String {
    fn from_sc_val(value: &ScVal) -> Result<Self, CodecError> {
        let bytes = match value {
            ScVal::String(ScString(s)) => s.as_slice(),
            ScVal::Symbol(ScSymbol(s)) => s.as_slice(),
            other => return Err(unexpected("string", other)),
        };
        std::str::from_utf8(bytes)
            .map(str::to_string)
            .map_err(|_| CodecError::UnexpectedType {
                expected: "utf-8 string",
                found: "non-utf-8 bytes".to_string(),
            })
    }

    fn from_native(value: &NativeValue) -> Result<Self, CodecError> {
        match value {
            NativeValue::Str(s) | NativeValue::Symbol(s) => Ok(s.clone()),
            other => Err(other.unexpected("string")),
        }
    }
}

impl ToScVal for Address {
    fn to_sc_val(&self) -> Result<ScVal, CodecError> {
        Ok(ScVal::Address(self.to_sc_address()))
    }
}

impl FromScVal for Address {
    fn from_sc_val(value: &ScVal) -> Result<Self, CodecError> {
        match value {
            ScVal::Address(addr) => Ok(Address::from_sc_address(addr)),
            other => Err(unexpected("address", other)),
        }
    }

    fn from_native(value: &NativeValue) -> Result<Self, CodecError> {
        match value {
            NativeValue::Address(s) | NativeValue::Str(s) => {
                Self::from_sc_val(&Address::parse(s)?.to_sc_val()?)
            }
            other => Err(other.unexpected("address")),
        }
    }
}

impl<T: ToScVal> ToScVal for Vec<T> {
    fn to_sc_val(&self) -> Result<ScVal, CodecError> {
        let items = self
            .iter()
            .map(ToScVal::to_sc_val)
            .collect::<Result<Vec<_>, _>>()?;
        let items: VecM<ScVal> = items.try_into()?;
        Ok(ScVal::Vec(Some(ScVec(items))))
    }
}

impl<T: FromScVal> FromScVal for Vec<T> {
    fn from_sc_val(value: &ScVal) -> Result<Self, CodecError> {
        match value {
            ScVal::Vec(Some(ScVec(items))) => items.iter().map(T::from_sc_val).collect(),
            ScVal::Vec(None) => Ok(Vec::new()),
            other => Err(unexpected("vec", other)),
        }
    }

    fn from_native(value: &NativeValue) -> Result<Self, CodecError> {
        match value {
            NativeValue::Vec(items) => items.iter().map(T::from_native).collect(),
            other => Err(other.unexpected("vec")),
        }
    }
}

/// Lookup helper for `contracttype` structs, which travel as symbol-keyed maps.
pub fn map_field<'a>(value: &'a ScVal, name: &'static str) -> Result<&'a ScVal, CodecError> {
    let ScVal::Map(Some(map)) = value else {
        return Err(unexpected("map", value));
    };
    map.0
        .iter()
        .find(|entry| matches!(&entry.key, ScVal::Symbol(s) if s.0.as_slice() == name.as_bytes()))
        .map(|entry| &entry.val)
        .ok_or(CodecError::MissingField(name))
}

/// A value decoded without knowing its target type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NativeValue {
    Void,
    Bool(bool),
    Int(i128),
    Str(String),
    Symbol(String),
    Address(String),
    Bytes(Vec<u8>),
    Vec(Vec<NativeValue>),
    Map(Vec<(NativeValue, NativeValue)>),
}

impl NativeValue {
    /// Convert the JSON rendering of an `ScVal` (`{"u64": "5"}`, `"void"`, ...).
    pub fn from_json(value: &Value) -> Result<Self, CodecError> {
        match value {
            Value::Null => Ok(NativeValue::Void),
            Value::Bool(b) => Ok(NativeValue::Bool(*b)),
            Value::Number(_) => Ok(NativeValue::Int(json_int(value)?)),
            Value::String(s) if s == "void" => Ok(NativeValue::Void),
            Value::String(s) => Ok(NativeValue::Str(s.clone())),
            Value::Array(items) => Ok(NativeValue::Vec(
                items.iter().map(Self::from_json).collect::<Result<_, _>>()?,
            )),
            Value::Object(obj) => {
                let mut fields = obj.iter();
                let (Some((tag, inner)), None) = (fields.next(), fields.next()) else {
                    return Err(CodecError::UnexpectedType {
                        expected: "single-key value object",
                        found: value.to_string(),
                    });
                };
                Self::from_tagged(tag, inner)
            }
        }
    }

    fn from_tagged(tag: &str, inner: &Value) -> Result<Self, CodecError> {
        match tag {
            "void" => Ok(NativeValue::Void),
            "bool" => inner
                .as_bool()
                .map(NativeValue::Bool)
                .ok_or_else(|| json_unexpected("bool", inner)),
            "u32" | "i32" | "u64" | "i64" | "timepoint" | "duration" | "u128" | "i128" => {
                Ok(NativeValue::Int(json_int(inner)?))
            }
            "string" => json_str(inner).map(NativeValue::Str),
            "symbol" => json_str(inner).map(NativeValue::Symbol),
            "address" => json_str(inner).map(NativeValue::Address),
            "bytes" => {
                let hex_str = json_str(inner)?;
                hex::decode(&hex_str)
                    .map(NativeValue::Bytes)
                    .map_err(|_| json_unexpected("hex bytes", inner))
            }
            "vec" => match inner {
                Value::Null => Ok(NativeValue::Vec(Vec::new())),
                Value::Array(items) => Ok(NativeValue::Vec(
                    items.iter().map(Self::from_json).collect::<Result<_, _>>()?,
                )),
                other => Err(json_unexpected("vec", other)),
            },
            "map" => match inner {
                Value::Null => Ok(NativeValue::Map(Vec::new())),
                Value::Array(entries) => entries
                    .iter()
                    .map(|entry| {
                        let key = entry.get("key").ok_or(CodecError::MissingField("key"))?;
                        let val = entry.get("val").ok_or(CodecError::MissingField("val"))?;
                        Ok((Self::from_json(key)?, Self::from_json(val)?))
                    })
                    .collect::<Result<_, CodecError>>()
                    .map(NativeValue::Map),
                other => Err(json_unexpected("map", other)),
            },
            _ => Err(CodecError::UnexpectedType {
                expected: "known value tag",
                found: tag.to_string(),
            }),
        }
    }

    pub fn is_void(&self) -> bool {
        matches!(self, NativeValue::Void)
    }

    pub fn as_int(&self) -> Result<i128, CodecError> {
        match self {
            NativeValue::Int(n) => Ok(*n),
            // Some renderings carry 64-bit numbers as strings
            NativeValue::Str(s) => s.parse().map_err(|_| self.unexpected("integer")),
            other => Err(other.unexpected("integer")),
        }
    }

    /// Field of a symbol-keyed map.
    pub fn field(&self, name: &'static str) -> Result<&NativeValue, CodecError> {
        let NativeValue::Map(entries) = self else {
            return Err(self.unexpected("map"));
        };
        entries
            .iter()
            .find(|(k, _)| matches!(k, NativeValue::Symbol(s) | NativeValue::Str(s) if s == name))
            .map(|(_, v)| v)
            .ok_or(CodecError::MissingField(name))
    }

    fn kind(&self) -> &'static str {
        match self {
            NativeValue::Void => "void",
            NativeValue::Bool(_) => "bool",
            NativeValue::Int(_) => "integer",
            NativeValue::Str(_) => "string",
            NativeValue::Symbol(_) => "symbol",
            NativeValue::Address(_) => "address",
            NativeValue::Bytes(_) => "bytes",
            NativeValue::Vec(_) => "vec",
            NativeValue::Map(_) => "map",
        }
    }

    pub fn unexpected(&self, expected: &'static str) -> CodecError {
        CodecError::UnexpectedType {
            expected,
            found: self.kind().to_string(),
        }
    }
}

fn json_unexpected(expected: &'static str, found: &Value) -> CodecError {
    CodecError::UnexpectedType {
        expected,
        found: found.to_string(),
    }
}

fn json_str(value: &Value) -> Result<String, CodecError> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| json_unexpected("string", value))
}

fn json_int(value: &Value) -> Result<i128, CodecError> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .map(i128::from)
            .or_else(|| n.as_i64().map(i128::from))
            .ok_or_else(|| json_unexpected("integer", value)),
        Value::String(s) => s.parse().map_err(|_| json_unexpected("integer", value)),
        Value::Object(parts) => {
            // 128-bit values split into hi/lo halves
            let hi = parts.get("hi").ok_or(CodecError::MissingField("hi"))?;
            let lo = parts.get("lo").ok_or(CodecError::MissingField("lo"))?;
            let hi = json_int(hi)?;
            let lo = u64::try_from(json_int(lo)?).map_err(|_| CodecError::OutOfRange("lo"))?;
            hi.checked_mul(1i128 << 64)
                .and_then(|h| h.checked_add(i128::from(lo)))
                .ok_or(CodecError::OutOfRange("i128"))
        }
        other => Err(json_unexpected("integer", other)),
    }
}

/// A return value in whichever encoding the network handed back.
#[derive(Debug, Clone, PartialEq)]
pub enum ReturnValue {
    Decoded(ScVal),
    Encoded(String),
    Structured(Value),
}

impl ReturnValue {
    /// Wrap an RPC `xdr` field. `null` means no return payload.
    pub fn from_json(value: Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::String(s) if s.is_empty() => None,
            // JSON rendering of a void result
            Value::String(s) if s == "void" => Some(ReturnValue::Structured(Value::String(s))),
            Value::String(s) => Some(ReturnValue::Encoded(s)),
            other => Some(ReturnValue::Structured(other)),
        }
    }

    /// Decode into `T`. `Ok(None)` when the value is void.
    pub fn decode<T: FromScVal>(&self) -> Result<Option<T>, CodecError> {
        match self {
            ReturnValue::Decoded(value) => decode_sc_val(value),
            ReturnValue::Encoded(b64) => decode_sc_val(&from_base64::<ScVal>(b64)?),
            ReturnValue::Structured(json) => {
                let native = NativeValue::from_json(json)?;
                if native.is_void() {
                    Ok(None)
                } else {
                    T::from_native(&native).map(Some)
                }
            }
        }
    }

    /// Raw text kept for diagnostics when decoding fails.
    pub fn raw(&self) -> String {
        match self {
            ReturnValue::Decoded(value) => {
                to_base64(value).unwrap_or_else(|_| format!("{:?}", value))
            }
            ReturnValue::Encoded(b64) => b64.clone(),
            ReturnValue::Structured(json) => json.to_string(),
        }
    }
}

fn decode_sc_val<T: FromScVal>(value: &ScVal) -> Result<Option<T>, CodecError> {
    match value {
        ScVal::Void => Ok(None),
        other => T::from_sc_val(other).map(Some),
    }
}
