//! List and dictionary activators
//!
//! Arrays and maps decode into any collection implementing
//! [`ListActivator`] / [`DictionaryActivator`]. Collections are created with
//! a capacity hint taken from the encoded element count (bounded by the
//! bytes left in the buffer, so a corrupt count cannot force a huge
//! allocation).

use crate::decoder::{Decode, DecodeContext, Decoder};
use crate::error::{Error, Result};
use crate::mmdb::types::TypeTag;
use std::any::type_name;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::hash::BuildHasher;

/// A collection that arrays decode into
pub trait ListActivator: Sized + Send + 'static {
    /// Element type
    type Item: Decode;

    /// Empty collection with room for `capacity` elements
    fn with_capacity(capacity: usize) -> Self;

    /// Append one element
    fn push_item(&mut self, item: Self::Item);
}

/// A string-keyed collection that maps decode into
pub trait DictionaryActivator: Sized + Send + 'static {
    /// Value type
    type Value: Decode;

    /// Empty collection with room for `capacity` entries
    fn with_capacity(capacity: usize) -> Self;

    /// Insert one entry (a repeated key replaces the earlier value)
    fn insert_entry(&mut self, key: String, value: Self::Value);
}

impl<T: Decode> ListActivator for Vec<T> {
    type Item = T;

    fn with_capacity(capacity: usize) -> Self {
        Vec::with_capacity(capacity)
    }

    fn push_item(&mut self, item: T) {
        self.push(item);
    }
}

impl<T: Decode> ListActivator for VecDeque<T> {
    type Item = T;

    fn with_capacity(capacity: usize) -> Self {
        VecDeque::with_capacity(capacity)
    }

    fn push_item(&mut self, item: T) {
        self.push_back(item);
    }
}

impl<V, S> DictionaryActivator for HashMap<String, V, S>
where
    V: Decode,
    S: BuildHasher + Default + Send + 'static,
{
    type Value = V;

    fn with_capacity(capacity: usize) -> Self {
        HashMap::with_capacity_and_hasher(capacity, S::default())
    }

    fn insert_entry(&mut self, key: String, value: V) {
        self.insert(key, value);
    }
}

impl<V: Decode> DictionaryActivator for BTreeMap<String, V> {
    type Value = V;

    fn with_capacity(_capacity: usize) -> Self {
        BTreeMap::new()
    }

    fn insert_entry(&mut self, key: String, value: V) {
        self.insert(key, value);
    }
}

/// Largest number of elements reserved up front for one container
pub const PREALLOCATION_LIMIT: usize = 1024;

/// Initial capacity for a container of `count` elements starting at `data`.
///
/// Every element takes at least one byte, so the count is bounded by the
/// bytes left; the fixed limit keeps large element types from turning that
/// bound into a huge allocation.
pub(crate) fn capacity_hint(d: &Decoder<'_>, data: usize, count: usize) -> usize {
    count
        .min(d.buffer().len().saturating_sub(data))
        .min(PREALLOCATION_LIMIT)
}

/// Decode an array at `offset` into `L`.
///
/// Elements whose type does not fit `L::Item` are skipped.
pub fn decode_list<L: ListActivator>(
    d: &Decoder<'_>,
    offset: usize,
    ctx: &DecodeContext<'_>,
) -> Result<(L, usize)> {
    let field = d.field(offset)?;
    if field.tag != TypeTag::Array {
        return Err(field.mismatch(type_name::<L>()));
    }
    let child = ctx.descend()?;
    let mut list = L::with_capacity(capacity_hint(d, field.data, field.size));
    let mut cursor = field.data;

    for _ in 0..field.size {
        match L::Item::decode(d, cursor, &child) {
            Ok((item, used)) => {
                list.push_item(item);
                cursor += used;
            }
            Err(Error::TypeMismatch { expected, found }) => {
                log::debug!(
                    "{}: dropping element, expected {} but found {}",
                    type_name::<L>(),
                    expected,
                    found
                );
                cursor += d.skip(cursor)?;
            }
            Err(e) => return Err(e),
        }
    }
    Ok((list, field.consumed(cursor)))
}

/// Decode a map at `offset` into `M`.
///
/// Entries whose value does not fit `M::Value` are skipped.
pub fn decode_dictionary<M: DictionaryActivator>(
    d: &Decoder<'_>,
    offset: usize,
    ctx: &DecodeContext<'_>,
) -> Result<(M, usize)> {
    let field = d.field(offset)?;
    if field.tag != TypeTag::Map {
        return Err(field.mismatch(type_name::<M>()));
    }
    let child = ctx.descend()?;
    let mut map = M::with_capacity(capacity_hint(d, field.data, field.size));
    let mut cursor = field.data;

    for _ in 0..field.size {
        let key_offset = cursor;
        let (key, used) = d.read_key(cursor)?;
        cursor += used;
        let key = key.as_str().ok_or_else(|| {
            Error::invalid(format!("map key at offset {} is not UTF-8", key_offset))
        })?;

        match M::Value::decode(d, cursor, &child) {
            Ok((value, used)) => {
                map.insert_entry(key.to_owned(), value);
                cursor += used;
            }
            Err(Error::TypeMismatch { expected, found }) => {
                log::debug!(
                    "{}: dropping entry {:?}, expected {} but found {}",
                    type_name::<M>(),
                    key,
                    expected,
                    found
                );
                cursor += d.skip(cursor)?;
            }
            Err(e) => return Err(e),
        }
    }
    Ok((map, field.consumed(cursor)))
}

impl<T: Decode> Decode for Vec<T> {
    fn decode(d: &Decoder<'_>, offset: usize, ctx: &DecodeContext<'_>) -> Result<(Self, usize)> {
        decode_list(d, offset, ctx)
    }

    fn empty(_ctx: &DecodeContext<'_>) -> Result<Self> {
        Ok(Vec::new())
    }
}

impl<T: Decode> Decode for VecDeque<T> {
    fn decode(d: &Decoder<'_>, offset: usize, ctx: &DecodeContext<'_>) -> Result<(Self, usize)> {
        decode_list(d, offset, ctx)
    }

    fn empty(_ctx: &DecodeContext<'_>) -> Result<Self> {
        Ok(VecDeque::new())
    }
}

impl<V, S> Decode for HashMap<String, V, S>
where
    V: Decode,
    S: BuildHasher + Default + Send + 'static,
{
    fn decode(d: &Decoder<'_>, offset: usize, ctx: &DecodeContext<'_>) -> Result<(Self, usize)> {
        decode_dictionary(d, offset, ctx)
    }

    fn empty(_ctx: &DecodeContext<'_>) -> Result<Self> {
        Ok(HashMap::with_hasher(S::default()))
    }
}

impl<V: Decode> Decode for BTreeMap<String, V> {
    fn decode(d: &Decoder<'_>, offset: usize, ctx: &DecodeContext<'_>) -> Result<(Self, usize)> {
        decode_dictionary(d, offset, ctx)
    }

    fn empty(_ctx: &DecodeContext<'_>) -> Result<Self> {
        Ok(BTreeMap::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activator::ActivatorRegistry;
    use crate::buffer::Buffer;
    use crate::data_value::DataValue;
    use crate::test_writer::{encode_value, Value};
    use rustc_hash::FxHashMap;

    fn decode<T: Decode>(value: &Value) -> Result<(T, usize)> {
        let buffer = Buffer::from_vec(encode_value(value));
        let registry = ActivatorRegistry::new();
        let ctx = DecodeContext::new(&registry);
        Decoder::new(&buffer, 0).decode(0, &ctx)
    }

    #[test]
    fn test_list_types() {
        let input = Value::Array(vec![Value::string("a"), Value::string("b")]);
        let (v, used) = decode::<Vec<String>>(&input).unwrap();
        assert_eq!(v, vec!["a", "b"]);
        // extended array header (2 bytes) + two 2-byte strings
        assert_eq!(used, 6);

        let (d, _) = decode::<VecDeque<String>>(&input).unwrap();
        assert_eq!(d.front().map(String::as_str), Some("a"));
    }

    #[test]
    fn test_dictionary_types() {
        let input = Value::map([("en", Value::string("Germany")), ("de", Value::string("Deutschland"))]);

        let (m, _) = decode::<HashMap<String, String>>(&input).unwrap();
        assert_eq!(m["de"], "Deutschland");

        let (m, _) = decode::<FxHashMap<String, String>>(&input).unwrap();
        assert_eq!(m.len(), 2);

        let (m, _) = decode::<BTreeMap<String, DataValue>>(&input).unwrap();
        assert_eq!(m.keys().collect::<Vec<_>>(), vec!["de", "en"]);
    }

    #[test]
    fn test_mismatched_elements_dropped() {
        let input = Value::Array(vec![
            Value::Uint16(1),
            Value::string("two"),
            Value::Uint32(3),
        ]);
        let bytes_len = encode_value(&input).len();
        let (v, used) = decode::<Vec<u32>>(&input).unwrap();
        assert_eq!(v, vec![1, 3]);
        assert_eq!(used, bytes_len);

        let input = Value::map([("a", Value::Uint16(1)), ("b", Value::Bool(true))]);
        let (m, _) = decode::<BTreeMap<String, u16>>(&input).unwrap();
        assert_eq!(m.len(), 1);
        assert_eq!(m["a"], 1);
    }

    #[test]
    fn test_container_kind_mismatch() {
        let input = Value::map([("a", Value::Uint16(1))]);
        assert!(matches!(
            decode::<Vec<u16>>(&input),
            Err(Error::TypeMismatch { found: "map", .. })
        ));
    }

    #[test]
    fn test_huge_count_is_bounded() {
        // array claiming 16M elements in a 5 byte buffer
        let buffer = Buffer::from_vec(vec![0x1f, 0x04, 0xff, 0xff, 0xff]);
        let registry = ActivatorRegistry::new();
        let ctx = DecodeContext::new(&registry);
        let err = Decoder::new(&buffer, 0).decode::<Vec<u32>>(0, &ctx).unwrap_err();
        assert!(err.is_invalid_database());
    }

    #[test]
    fn test_capacity_hint_is_capped() {
        let mut bytes = vec![0x1f, 0x04, 0xff, 0xff, 0xff];
        bytes.resize(1 << 20, 0);
        let buffer = Buffer::from_vec(bytes);
        let d = Decoder::new(&buffer, 0);
        assert_eq!(capacity_hint(&d, 5, 16_843_036), PREALLOCATION_LIMIT);
        assert_eq!(capacity_hint(&d, 5, 3), 3);
        assert_eq!(capacity_hint(&d, (1 << 20) - 2, 100), 2);
    }

    #[test]
    fn test_huge_count_of_large_records() {
        // 16M claimed subdivisions followed by 20 MB of padding; the first
        // element is unreadable and nothing close to count * size is reserved
        let mut bytes = vec![0x1f, 0x04, 0xff, 0xff, 0xff];
        bytes.resize(20_000_000, 0);
        let buffer = Buffer::from_vec(bytes);
        let registry = ActivatorRegistry::new();
        let ctx = DecodeContext::new(&registry);

        let err = Decoder::new(&buffer, 0)
            .decode::<Vec<crate::location::Location>>(0, &ctx)
            .unwrap_err();
        assert!(err.is_invalid_database());
        let err = Decoder::new(&buffer, 0).decode::<DataValue>(0, &ctx).unwrap_err();
        assert!(err.is_invalid_database());
    }
}
