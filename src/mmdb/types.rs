//! MMDB-specific Type Definitions

use crate::error::{Error, Result};
use serde::{Serialize, Serializer};
use std::fmt;

/// MMDB metadata marker: "\xAB\xCD\xEFMaxMind.com"
pub const METADATA_MARKER: &[u8] = b"\xAB\xCD\xEFMaxMind.com";

/// Size of the all-zero separator between the search tree and the data section
pub const DATA_SECTION_SEPARATOR_SIZE: usize = 16;

/// Number of zero bits that lead from the root of an IPv6 tree to the IPv4 subtree
pub const IPV4_SUBTREE_DEPTH: usize = 96;

/// IP version
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpVersion {
    /// IPv4 only
    V4,
    /// IPv6 (may include IPv4 under ::/96)
    V6,
}

impl IpVersion {
    /// Parse the metadata `ip_version` field
    pub fn from_number(n: u16) -> Result<Self> {
        match n {
            4 => Ok(IpVersion::V4),
            6 => Ok(IpVersion::V6),
            _ => Err(Error::invalid(format!("invalid IP version: {}", n))),
        }
    }

    /// The metadata number (4 or 6)
    pub fn number(self) -> u16 {
        match self {
            IpVersion::V4 => 4,
            IpVersion::V6 => 6,
        }
    }

    /// Address width in bytes
    pub fn address_bytes(self) -> usize {
        match self {
            IpVersion::V4 => 4,
            IpVersion::V6 => 16,
        }
    }

    /// Address width in bits (tree depth)
    pub fn bit_count(self) -> usize {
        self.address_bytes() * 8
    }
}

impl Serialize for IpVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_u16(self.number())
    }
}

/// Record size in bits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordSize {
    /// 24-bit records (3 bytes per record, 6 bytes per node)
    Bits24 = 24,
    /// 28-bit records (3.5 bytes per record, 7 bytes per node)
    Bits28 = 28,
    /// 32-bit records (4 bytes per record, 8 bytes per node)
    Bits32 = 32,
}

impl RecordSize {
    /// Get the size of a node (2 records) in bytes: width / 4
    pub fn node_bytes(self) -> usize {
        match self {
            RecordSize::Bits24 => 6,
            RecordSize::Bits28 => 7,
            RecordSize::Bits32 => 8,
        }
    }

    /// Width in bits
    pub fn bits(self) -> u16 {
        self as u16
    }

    /// Create from bit size
    pub fn from_bits(bits: u16) -> Result<Self> {
        match bits {
            24 => Ok(RecordSize::Bits24),
            28 => Ok(RecordSize::Bits28),
            32 => Ok(RecordSize::Bits32),
            _ => Err(Error::invalid(format!("unknown record size: {} bits", bits))),
        }
    }
}

impl Serialize for RecordSize {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_u16(self.bits())
    }
}

/// Base types selected by the control byte of an encoded value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeTag {
    /// Next byte holds the real type (minus 7)
    Extended,
    /// Reference to another value in the data section
    Pointer,
    /// UTF-8 text
    Utf8String,
    /// IEEE 754 binary64
    Double,
    /// Raw bytes
    Bytes,
    /// Unsigned 16-bit integer
    Uint16,
    /// Unsigned 32-bit integer
    Uint32,
    /// String-keyed map
    Map,
    /// Signed 32-bit integer
    Int32,
    /// Unsigned 64-bit integer
    Uint64,
    /// Unsigned 128-bit integer
    Uint128,
    /// Ordered list
    Array,
    /// Reserved data cache container
    Container,
    /// Reserved end marker
    EndMarker,
    /// Boolean (value is the size field)
    Boolean,
    /// IEEE 754 binary32
    Float,
}

impl TypeTag {
    /// Map a numeric type id (0..=15) to its tag
    pub fn from_id(id: u16) -> Result<Self> {
        Ok(match id {
            0 => TypeTag::Extended,
            1 => TypeTag::Pointer,
            2 => TypeTag::Utf8String,
            3 => TypeTag::Double,
            4 => TypeTag::Bytes,
            5 => TypeTag::Uint16,
            6 => TypeTag::Uint32,
            7 => TypeTag::Map,
            8 => TypeTag::Int32,
            9 => TypeTag::Uint64,
            10 => TypeTag::Uint128,
            11 => TypeTag::Array,
            12 => TypeTag::Container,
            13 => TypeTag::EndMarker,
            14 => TypeTag::Boolean,
            15 => TypeTag::Float,
            _ => return Err(Error::invalid(format!("unknown data type id {}", id))),
        })
    }

    /// Name used in error messages
    pub fn name(self) -> &'static str {
        match self {
            TypeTag::Extended => "extended",
            TypeTag::Pointer => "pointer",
            TypeTag::Utf8String => "utf8_string",
            TypeTag::Double => "double",
            TypeTag::Bytes => "bytes",
            TypeTag::Uint16 => "uint16",
            TypeTag::Uint32 => "uint32",
            TypeTag::Map => "map",
            TypeTag::Int32 => "int32",
            TypeTag::Uint64 => "uint64",
            TypeTag::Uint128 => "uint128",
            TypeTag::Array => "array",
            TypeTag::Container => "container",
            TypeTag::EndMarker => "end_marker",
            TypeTag::Boolean => "boolean",
            TypeTag::Float => "float",
        }
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
