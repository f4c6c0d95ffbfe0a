//! Data section decoding
//!
//! Values in the data section use the MMDB encoding: a control byte whose
//! high 3 bits select the type (0 = extended, real type is `7 + next byte`)
//! and whose low 5 bits carry the size:
//!
//! | size bits | meaning                                           |
//! |-----------|---------------------------------------------------|
//! | 0..=28    | literal size                                      |
//! | 29        | 29 + next byte                                    |
//! | 30        | 285 + next two bytes (big-endian)                 |
//! | 31        | 65821 + next three bytes (big-endian)             |
//!
//! Pointers use the size bits differently: bits 3-4 pick one of four
//! encodings and bits 0-2 are the high bits of the offset. A pointer is
//! replaced by the value it points to, but the bytes consumed are the
//! pointer's own.
//!
//! Typed decoding goes through the [`Decode`] trait. Scalars, containers,
//! [`DataValue`](crate::data_value::DataValue) and every
//! [`Record`](crate::activator::Record) implement it; all of them return the
//! decoded value together with the number of bytes consumed so that maps
//! and arrays can advance without re-parsing.
//!
//! See: https://maxmind.github.io/MaxMind-DB/

use crate::activator::{ActivatorRegistry, InjectableValues};
use crate::buffer::Buffer;
use crate::error::{Error, Result};
use crate::key::Key;
use crate::mmdb::types::TypeTag;
use crate::network::Network;
use std::cell::Cell;

/// Maximum nesting of maps and arrays
pub const MAX_DEPTH: usize = 512;

/// Maximum number of values one [`Decoder`] will locate. Pointers let a
/// small data section describe an exponentially large value, so the total
/// work is bounded as well as the depth.
pub const MAX_DECODED_VALUES: usize = 1 << 18;

/// Decoded control byte(s) of a non-pointer value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Header {
    tag: TypeTag,
    size: usize,
    data: usize,
}

/// Control byte(s) of a value, either a value or a pointer to one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Control {
    Value(Header),
    Pointer { target: usize, len: usize },
}

/// A value located in the data section, with any pointer already followed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    /// Wire type of the value
    pub tag: TypeTag,
    /// Size field: byte length for strings/bytes/numbers, entry count for
    /// maps and arrays, the value itself for booleans
    pub size: usize,
    /// Absolute offset of the first payload byte
    pub data: usize,
    start: usize,
    pointer_len: Option<usize>,
}

impl Field {
    /// Bytes consumed at the original offset once the payload ended at `end`.
    /// When the value was reached through a pointer, that is the pointer's
    /// own length.
    #[inline]
    pub fn consumed(&self, end: usize) -> usize {
        self.pointer_len.unwrap_or(end - self.start)
    }

    /// True if the value was reached through a pointer
    pub fn via_pointer(&self) -> bool {
        self.pointer_len.is_some()
    }

    /// End of the payload of a scalar value
    #[inline]
    pub fn scalar_end(&self) -> usize {
        match self.tag {
            TypeTag::Boolean => self.data,
            _ => self.data + self.size,
        }
    }

    /// Error for a value that cannot become `expected`
    pub fn mismatch(&self, expected: &'static str) -> Error {
        Error::TypeMismatch {
            expected,
            found: self.tag.name(),
        }
    }
}

/// A number read from any of the numeric wire types
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    /// uint16, uint32, uint64, uint128
    Unsigned(u128),
    /// int32
    Signed(i64),
    /// double, float
    Float(f64),
}

/// Per-call decoding state: where activators come from and what to hand to
/// network / injectable parameters.
#[derive(Clone, Copy)]
pub struct DecodeContext<'a> {
    registry: &'a ActivatorRegistry,
    network: Option<Network>,
    injectables: Option<&'a InjectableValues>,
    depth: usize,
}

impl<'a> DecodeContext<'a> {
    /// Context with no network and no injectables
    pub fn new(registry: &'a ActivatorRegistry) -> Self {
        Self {
            registry,
            network: None,
            injectables: None,
            depth: 0,
        }
    }

    /// Set the network handed to network parameters
    pub fn with_network(mut self, network: Option<Network>) -> Self {
        self.network = network;
        self
    }

    /// Set the values handed to injectable parameters
    pub fn with_injectables(mut self, injectables: Option<&'a InjectableValues>) -> Self {
        self.injectables = injectables;
        self
    }

    /// The activator registry
    pub fn registry(&self) -> &'a ActivatorRegistry {
        self.registry
    }

    /// Network of the current lookup, if any
    pub fn network(&self) -> Option<Network> {
        self.network
    }

    /// Caller-supplied injectable values, if any
    pub fn injectables(&self) -> Option<&'a InjectableValues> {
        self.injectables
    }

    /// Context for the children of a map or array
    pub fn descend(&self) -> Result<Self> {
        if self.depth >= MAX_DEPTH {
            return Err(Error::invalid(format!(
                "maximum data structure depth of {} exceeded",
                MAX_DEPTH
            )));
        }
        Ok(Self {
            depth: self.depth + 1,
            ..*self
        })
    }
}

/// A type that can be materialised from the data section
pub trait Decode: Sized + Send + 'static {
    /// Decode the value at absolute `offset`, returning it together with the
    /// number of bytes consumed at `offset`
    fn decode(decoder: &Decoder<'_>, offset: usize, ctx: &DecodeContext<'_>)
        -> Result<(Self, usize)>;

    /// Zero/empty-equivalent used for parameters absent from the input
    fn empty(ctx: &DecodeContext<'_>) -> Result<Self>;

    /// Freshly constructed instance used for "always create" parameters.
    /// Only differs from [`Decode::empty`] for optional values.
    fn create(ctx: &DecodeContext<'_>) -> Result<Self> {
        Self::empty(ctx)
    }
}

/// Decoder over one buffer with a fixed pointer base.
///
/// Each decoder carries its own budget of [`MAX_DECODED_VALUES`], so build a
/// fresh one per top-level decode.
#[derive(Debug, Clone)]
pub struct Decoder<'a> {
    buffer: &'a Buffer,
    pointer_base: usize,
    visited: Cell<usize>,
}

impl<'a> Decoder<'a> {
    /// Create a decoder
    ///
    /// # Arguments
    /// * `buffer` - The whole database
    /// * `pointer_base` - Offset pointers are relative to (start of the data
    ///   section, or start of the metadata map when decoding metadata)
    pub fn new(buffer: &'a Buffer, pointer_base: usize) -> Self {
        Self {
            buffer,
            pointer_base,
            visited: Cell::new(0),
        }
    }

    /// The underlying buffer
    pub fn buffer(&self) -> &'a Buffer {
        self.buffer
    }

    /// Offset pointers are relative to
    pub fn pointer_base(&self) -> usize {
        self.pointer_base
    }

    /// Decode a typed value at `offset`
    pub fn decode<T: Decode>(&self, offset: usize, ctx: &DecodeContext<'_>) -> Result<(T, usize)> {
        T::decode(self, offset, ctx)
    }

    fn control(&self, offset: usize) -> Result<Control> {
        let ctrl = self.buffer.read_byte(offset)?;
        let mut cursor = offset + 1;

        let type_id = ctrl >> 5;
        let tag = match type_id {
            0 => {
                let ext = self.buffer.read_byte(cursor)?;
                cursor += 1;
                let id = 7 + ext as u16;
                if id < 8 {
                    return Err(Error::invalid(format!(
                        "extended type {} at offset {} is not a valid type",
                        id, offset
                    )));
                }
                TypeTag::from_id(id)?
            }
            1 => {
                let size_bits = ((ctrl >> 3) & 0x3) as usize;
                let high = (ctrl & 0x7) as usize;
                let low = self.buffer.read_var_uint(cursor, size_bits + 1)? as usize;
                let relative = match size_bits {
                    0 => (high << 8) | low,
                    1 => ((high << 16) | low) + 2048,
                    2 => ((high << 24) | low) + 526_336,
                    _ => low,
                };
                let target = self.pointer_base.checked_add(relative).ok_or_else(|| {
                    Error::invalid(format!("pointer at offset {} overflows", offset))
                })?;
                return Ok(Control::Pointer {
                    target,
                    len: 1 + size_bits + 1,
                });
            }
            id => TypeTag::from_id(id as u16)?,
        };
        if matches!(tag, TypeTag::Container | TypeTag::EndMarker) {
            return Err(Error::invalid(format!(
                "unsupported data type {} at offset {}",
                tag, offset
            )));
        }

        let size_bits = ctrl & 0x1F;
        let size = match size_bits {
            0..=28 => size_bits as usize,
            29 => {
                let n = 29 + self.buffer.read_byte(cursor)? as usize;
                cursor += 1;
                n
            }
            30 => {
                let n = 285 + self.buffer.read_var_uint(cursor, 2)? as usize;
                cursor += 2;
                n
            }
            _ => {
                let n = 65_821 + self.buffer.read_var_uint(cursor, 3)? as usize;
                cursor += 3;
                n
            }
        };

        Ok(Control::Value(Header {
            tag,
            size,
            data: cursor,
        }))
    }

    /// Locate the value at `offset`, following a pointer if there is one.
    ///
    /// A pointer to another pointer is corruption.
    pub fn field(&self, offset: usize) -> Result<Field> {
        let visited = self.visited.get() + 1;
        if visited > MAX_DECODED_VALUES {
            return Err(Error::invalid(format!(
                "more than {} values decoded from one record",
                MAX_DECODED_VALUES
            )));
        }
        self.visited.set(visited);

        match self.control(offset)? {
            Control::Value(h) => Ok(Field {
                tag: h.tag,
                size: h.size,
                data: h.data,
                start: offset,
                pointer_len: None,
            }),
            Control::Pointer { target, len } => match self.control(target)? {
                Control::Value(h) => Ok(Field {
                    tag: h.tag,
                    size: h.size,
                    data: h.data,
                    start: offset,
                    pointer_len: Some(len),
                }),
                Control::Pointer { .. } => Err(Error::invalid(format!(
                    "pointer at offset {} points to another pointer at {}",
                    offset, target
                ))),
            },
        }
    }

    /// Bytes occupied by the value at `offset`, without materialising it
    pub fn skip(&self, offset: usize) -> Result<usize> {
        self.skip_at(offset, 0)
    }

    fn skip_at(&self, offset: usize, depth: usize) -> Result<usize> {
        if depth > MAX_DEPTH {
            return Err(Error::invalid(format!(
                "maximum data structure depth of {} exceeded",
                MAX_DEPTH
            )));
        }
        let field = self.field(offset)?;
        if let Some(len) = field.pointer_len {
            return Ok(len);
        }
        let end = match field.tag {
            TypeTag::Map | TypeTag::Array => {
                let children = if field.tag == TypeTag::Map {
                    field.size * 2
                } else {
                    field.size
                };
                let mut cursor = field.data;
                for _ in 0..children {
                    cursor += self.skip_at(cursor, depth + 1)?;
                }
                cursor
            }
            _ => {
                self.check_scalar(&field)?;
                field.scalar_end()
            }
        };
        Ok(end - offset)
    }

    /// Validate the size field of a scalar and that its payload is in bounds
    pub fn check_scalar(&self, field: &Field) -> Result<()> {
        let max = match field.tag {
            TypeTag::Double => Some(8),
            TypeTag::Float => Some(4),
            TypeTag::Uint16 => Some(2),
            TypeTag::Uint32 | TypeTag::Int32 => Some(4),
            TypeTag::Uint64 => Some(8),
            TypeTag::Uint128 => Some(16),
            TypeTag::Boolean => Some(1),
            TypeTag::Utf8String | TypeTag::Bytes => None,
            TypeTag::Map | TypeTag::Array => return Ok(()),
            other => {
                return Err(Error::invalid(format!(
                    "unsupported data type {} at offset {}",
                    other, field.start
                )))
            }
        };
        let bad_size = match field.tag {
            TypeTag::Double | TypeTag::Float => max != Some(field.size),
            _ => max.is_some_and(|m| field.size > m),
        };
        if bad_size {
            return Err(Error::invalid(format!(
                "{} of size {} at offset {}",
                field.tag, field.size, field.data
            )));
        }
        self.buffer
            .read_bytes(field.data, field.scalar_end() - field.data)
            .map(|_| ())
    }

    /// Read a map key. Keys must be strings (possibly behind a pointer).
    pub fn read_key(&self, offset: usize) -> Result<(Key<'a>, usize)> {
        let field = self.field(offset)?;
        if field.tag != TypeTag::Utf8String {
            return Err(Error::invalid(format!(
                "map key at offset {} is {}, not a string",
                offset, field.tag
            )));
        }
        let key = Key::from_buffer(self.buffer, field.data, field.size)?;
        Ok((key, field.consumed(field.scalar_end())))
    }

    /// Borrow a string payload
    pub fn read_str(&self, field: &Field) -> Result<&'a str> {
        if field.tag != TypeTag::Utf8String {
            return Err(field.mismatch("string"));
        }
        self.buffer.read_utf8(field.data, field.size)
    }

    /// Borrow a bytes payload
    pub fn read_raw_bytes(&self, field: &Field) -> Result<&'a [u8]> {
        if field.tag != TypeTag::Bytes {
            return Err(field.mismatch("bytes"));
        }
        self.buffer.read_bytes(field.data, field.size)
    }

    /// Read a boolean
    pub fn read_bool(&self, field: &Field) -> Result<bool> {
        if field.tag != TypeTag::Boolean {
            return Err(field.mismatch("bool"));
        }
        self.check_scalar(field)?;
        Ok(field.size != 0)
    }

    /// Read any numeric type
    ///
    /// int32 payloads shorter than 4 bytes are not sign extended.
    pub fn read_number(&self, field: &Field) -> Result<Number> {
        match field.tag {
            TypeTag::Uint16 | TypeTag::Uint32 | TypeTag::Uint64 | TypeTag::Uint128 => {
                self.check_scalar(field)?;
                Ok(Number::Unsigned(self.buffer.read_u128(field.data, field.size)?))
            }
            TypeTag::Int32 => {
                self.check_scalar(field)?;
                let raw = self.buffer.read_var_uint(field.data, field.size)?;
                Ok(Number::Signed(raw as i32 as i64))
            }
            TypeTag::Double => {
                self.check_scalar(field)?;
                Ok(Number::Float(self.buffer.read_f64(field.data)?))
            }
            TypeTag::Float => {
                self.check_scalar(field)?;
                Ok(Number::Float(self.buffer.read_f32(field.data)? as f64))
            }
            _ => Err(field.mismatch("number")),
        }
    }
}

/// Raw bytes value (the `bytes` wire type)
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, serde::Serialize)]
pub struct Bytes(pub Vec<u8>);

impl Decode for Bytes {
    fn decode(d: &Decoder<'_>, offset: usize, _ctx: &DecodeContext<'_>) -> Result<(Self, usize)> {
        let field = d.field(offset)?;
        let bytes = d.read_raw_bytes(&field)?.to_vec();
        Ok((Bytes(bytes), field.consumed(field.scalar_end())))
    }

    fn empty(_ctx: &DecodeContext<'_>) -> Result<Self> {
        Ok(Bytes::default())
    }
}

impl Decode for String {
    fn decode(d: &Decoder<'_>, offset: usize, _ctx: &DecodeContext<'_>) -> Result<(Self, usize)> {
        let field = d.field(offset)?;
        let s = d.read_str(&field)?.to_owned();
        Ok((s, field.consumed(field.scalar_end())))
    }

    fn empty(_ctx: &DecodeContext<'_>) -> Result<Self> {
        Ok(String::new())
    }
}

impl Decode for bool {
    fn decode(d: &Decoder<'_>, offset: usize, _ctx: &DecodeContext<'_>) -> Result<(Self, usize)> {
        let field = d.field(offset)?;
        let b = d.read_bool(&field)?;
        Ok((b, field.consumed(field.scalar_end())))
    }

    fn empty(_ctx: &DecodeContext<'_>) -> Result<Self> {
        Ok(false)
    }
}

macro_rules! decode_integer {
    ($($t:ty),*) => {
        $(
            impl Decode for $t {
                fn decode(
                    d: &Decoder<'_>,
                    offset: usize,
                    _ctx: &DecodeContext<'_>,
                ) -> Result<(Self, usize)> {
                    let field = d.field(offset)?;
                    let value = match d.read_number(&field) {
                        Ok(Number::Unsigned(n)) => <$t>::try_from(n).ok(),
                        Ok(Number::Signed(n)) => <$t>::try_from(n).ok(),
                        Ok(Number::Float(_)) => None,
                        Err(Error::TypeMismatch { .. }) => None,
                        Err(e) => return Err(e),
                    }
                    .ok_or_else(|| field.mismatch(stringify!($t)))?;
                    Ok((value, field.consumed(field.scalar_end())))
                }

                fn empty(_ctx: &DecodeContext<'_>) -> Result<Self> {
                    Ok(0)
                }
            }
        )*
    };
}

decode_integer!(u8, u16, u32, u64, u128, usize, i8, i16, i32, i64, i128);

macro_rules! decode_float {
    ($($t:ty),*) => {
        $(
            impl Decode for $t {
                fn decode(
                    d: &Decoder<'_>,
                    offset: usize,
                    _ctx: &DecodeContext<'_>,
                ) -> Result<(Self, usize)> {
                    let field = d.field(offset)?;
                    let value = match d.read_number(&field) {
                        Ok(Number::Float(f)) => f as $t,
                        Ok(Number::Unsigned(n)) => n as $t,
                        Ok(Number::Signed(n)) => n as $t,
                        Err(Error::TypeMismatch { .. }) => {
                            return Err(field.mismatch(stringify!($t)))
                        }
                        Err(e) => return Err(e),
                    };
                    Ok((value, field.consumed(field.scalar_end())))
                }

                fn empty(_ctx: &DecodeContext<'_>) -> Result<Self> {
                    Ok(0.0)
                }
            }
        )*
    };
}

decode_float!(f32, f64);

impl<T: Decode> Decode for Option<T> {
    fn decode(d: &Decoder<'_>, offset: usize, ctx: &DecodeContext<'_>) -> Result<(Self, usize)> {
        let (value, used) = T::decode(d, offset, ctx)?;
        Ok((Some(value), used))
    }

    fn empty(_ctx: &DecodeContext<'_>) -> Result<Self> {
        Ok(None)
    }

    fn create(ctx: &DecodeContext<'_>) -> Result<Self> {
        T::create(ctx).map(Some)
    }
}
