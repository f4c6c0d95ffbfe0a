//! Generic decoded values
//!
//! [`DataValue`] is the untyped target: every wire type decodes into it, so
//! it is what callers use when they do not have (or want) a declared record
//! type. Pointers never appear here; they are resolved while decoding.
//!
//! # Supported Types
//!
//! - **String**: UTF-8 text data
//! - **Double**: 64-bit floating point (IEEE 754)
//! - **Bytes**: Raw byte arrays
//! - **Uint16 / Uint32 / Uint64 / Uint128**: Unsigned integers
//! - **Map**: Key-value pairs (string keys)
//! - **Int32**: Signed 32-bit integers
//! - **Array**: Ordered lists of values
//! - **Bool**: Boolean values
//! - **Float**: 32-bit floating point (IEEE 754)

use crate::activator::container::capacity_hint;
use crate::decoder::{Decode, DecodeContext, Decoder, Number};
use crate::error::{Error, Result};
use crate::mmdb::types::TypeTag;
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;

/// Data value decoded from the data section
#[derive(Debug, Clone, PartialEq)]
pub enum DataValue {
    /// UTF-8 string
    String(String),
    /// IEEE 754 double precision float
    Double(f64),
    /// Raw byte array
    Bytes(Vec<u8>),
    /// Unsigned 16-bit integer
    Uint16(u16),
    /// Unsigned 32-bit integer
    Uint32(u32),
    /// Key-value map (string keys only per MMDB spec)
    Map(BTreeMap<String, DataValue>),
    /// Signed 32-bit integer
    Int32(i32),
    /// Unsigned 64-bit integer
    Uint64(u64),
    /// Unsigned 128-bit integer
    Uint128(u128),
    /// Array of values
    Array(Vec<DataValue>),
    /// Boolean value
    Bool(bool),
    /// IEEE 754 single precision float
    Float(f32),
}

impl DataValue {
    /// Look up a key of a map value
    pub fn get(&self, key: &str) -> Option<&DataValue> {
        match self {
            DataValue::Map(m) => m.get(key),
            _ => None,
        }
    }

    /// Follow a path of map keys
    pub fn pointer(&self, path: &[&str]) -> Option<&DataValue> {
        path.iter().try_fold(self, |v, key| v.get(key))
    }

    /// The value as text, if it is a string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            DataValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// The value as an unsigned integer, if it is a non-negative integer
    /// that fits
    pub fn as_u64(&self) -> Option<u64> {
        match *self {
            DataValue::Uint16(n) => Some(n as u64),
            DataValue::Uint32(n) => Some(n as u64),
            DataValue::Uint64(n) => Some(n),
            DataValue::Uint128(n) => u64::try_from(n).ok(),
            DataValue::Int32(n) => u64::try_from(n).ok(),
            _ => None,
        }
    }

    /// The value as a float, if it is numeric
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            DataValue::Double(d) => Some(d),
            DataValue::Float(f) => Some(f as f64),
            DataValue::Int32(n) => Some(n as f64),
            _ => self.as_u64().map(|n| n as f64),
        }
    }

    /// Name of the wire type this value came from
    pub fn type_name(&self) -> &'static str {
        match self {
            DataValue::String(_) => TypeTag::Utf8String.name(),
            DataValue::Double(_) => TypeTag::Double.name(),
            DataValue::Bytes(_) => TypeTag::Bytes.name(),
            DataValue::Uint16(_) => TypeTag::Uint16.name(),
            DataValue::Uint32(_) => TypeTag::Uint32.name(),
            DataValue::Map(_) => TypeTag::Map.name(),
            DataValue::Int32(_) => TypeTag::Int32.name(),
            DataValue::Uint64(_) => TypeTag::Uint64.name(),
            DataValue::Uint128(_) => TypeTag::Uint128.name(),
            DataValue::Array(_) => TypeTag::Array.name(),
            DataValue::Bool(_) => TypeTag::Boolean.name(),
            DataValue::Float(_) => TypeTag::Float.name(),
        }
    }
}

impl Decode for DataValue {
    fn decode(d: &Decoder<'_>, offset: usize, ctx: &DecodeContext<'_>) -> Result<(Self, usize)> {
        let field = d.field(offset)?;
        match field.tag {
            TypeTag::Map => {
                let child = ctx.descend()?;
                let mut map = BTreeMap::new();
                let mut cursor = field.data;
                for _ in 0..field.size {
                    let (key, used) = d.read_key(cursor)?;
                    cursor += used;
                    let key = key.as_str().ok_or_else(|| {
                        Error::invalid(format!("map key at offset {} is not UTF-8", cursor))
                    })?;
                    let (value, used) = DataValue::decode(d, cursor, &child)?;
                    cursor += used;
                    map.insert(key.to_owned(), value);
                }
                Ok((DataValue::Map(map), field.consumed(cursor)))
            }
            TypeTag::Array => {
                let child = ctx.descend()?;
                let mut items = Vec::with_capacity(capacity_hint(d, field.data, field.size));
                let mut cursor = field.data;
                for _ in 0..field.size {
                    let (value, used) = DataValue::decode(d, cursor, &child)?;
                    cursor += used;
                    items.push(value);
                }
                Ok((DataValue::Array(items), field.consumed(cursor)))
            }
            TypeTag::Utf8String => Ok((
                DataValue::String(d.read_str(&field)?.to_owned()),
                field.consumed(field.scalar_end()),
            )),
            TypeTag::Bytes => Ok((
                DataValue::Bytes(d.read_raw_bytes(&field)?.to_vec()),
                field.consumed(field.scalar_end()),
            )),
            TypeTag::Boolean => Ok((
                DataValue::Bool(d.read_bool(&field)?),
                field.consumed(field.scalar_end()),
            )),
            tag => {
                let number = d.read_number(&field)?;
                let value = match (tag, number) {
                    (TypeTag::Uint16, Number::Unsigned(n)) => DataValue::Uint16(n as u16),
                    (TypeTag::Uint32, Number::Unsigned(n)) => DataValue::Uint32(n as u32),
                    (TypeTag::Uint64, Number::Unsigned(n)) => DataValue::Uint64(n as u64),
                    (TypeTag::Uint128, Number::Unsigned(n)) => DataValue::Uint128(n),
                    (TypeTag::Int32, Number::Signed(n)) => DataValue::Int32(n as i32),
                    (TypeTag::Float, Number::Float(f)) => DataValue::Float(f as f32),
                    (_, Number::Float(f)) => DataValue::Double(f),
                    _ => return Err(field.mismatch("value")),
                };
                Ok((value, field.consumed(field.scalar_end())))
            }
        }
    }

    fn empty(_ctx: &DecodeContext<'_>) -> Result<Self> {
        Ok(DataValue::Map(BTreeMap::new()))
    }
}

impl Serialize for DataValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            DataValue::String(s) => serializer.serialize_str(s),
            DataValue::Double(d) => serializer.serialize_f64(*d),
            DataValue::Bytes(b) => serializer.serialize_bytes(b),
            DataValue::Uint16(n) => serializer.serialize_u16(*n),
            DataValue::Uint32(n) => serializer.serialize_u32(*n),
            DataValue::Map(m) => {
                let mut map = serializer.serialize_map(Some(m.len()))?;
                for (k, v) in m {
                    map.serialize_entry(k, v)?;
                }
                map.end()
            }
            DataValue::Int32(n) => serializer.serialize_i32(*n),
            DataValue::Uint64(n) => serializer.serialize_u64(*n),
            DataValue::Uint128(n) => serializer.serialize_u128(*n),
            DataValue::Array(a) => {
                let mut seq = serializer.serialize_seq(Some(a.len()))?;
                for v in a {
                    seq.serialize_element(v)?;
                }
                seq.end()
            }
            DataValue::Bool(b) => serializer.serialize_bool(*b),
            DataValue::Float(f) => serializer.serialize_f32(*f),
        }
    }
}
