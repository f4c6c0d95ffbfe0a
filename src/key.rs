//! Zero-copy map keys.
//!
//! Decoded map keys are matched against declared field names without
//! allocating a `String`: a [`Key`] borrows the key's byte range straight
//! out of the [`Buffer`] and carries a hash computed once at construction.

use crate::buffer::Buffer;
use crate::error::Result;
use rustc_hash::FxHasher;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Hashable view of a byte range
#[derive(Clone, Copy)]
pub struct Key<'a> {
    bytes: &'a [u8],
    hash: u64,
}

impl<'a> Key<'a> {
    /// Build a key over raw bytes
    pub fn new(bytes: &'a [u8]) -> Self {
        let mut hasher = FxHasher::default();
        hasher.write(bytes);
        Self {
            bytes,
            hash: hasher.finish(),
        }
    }

    /// Build a key over `size` bytes of `buffer` starting at `offset`
    pub fn from_buffer(buffer: &'a Buffer, offset: usize, size: usize) -> Result<Self> {
        Ok(Self::new(buffer.read_bytes(offset, size)?))
    }

    /// The raw key bytes
    pub fn as_bytes(&self) -> &'a [u8] {
        self.bytes
    }

    /// The key as text, if it is valid UTF-8
    pub fn as_str(&self) -> Option<&'a str> {
        std::str::from_utf8(self.bytes).ok()
    }

    /// Length of the key in bytes
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// True for the empty key
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl Key<'static> {
    /// Key for a declared field name
    pub fn from_static(name: &'static str) -> Self {
        Self::new(name.as_bytes())
    }
}

impl PartialEq for Key<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash && self.bytes == other.bytes
    }
}

impl Eq for Key<'_> {}

impl Hash for Key<'_> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash);
    }
}

impl fmt::Debug for Key<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_str() {
            Some(s) => write!(f, "Key({:?})", s),
            None => write!(f, "Key({:02x?})", self.bytes),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustc_hash::FxHashMap;

    #[test]
    fn test_equal_bytes_equal_keys() {
        let buffer = Buffer::from_vec(b"xxcountryyy".to_vec());
        let from_buffer = Key::from_buffer(&buffer, 2, 7).unwrap();
        let declared = Key::from_static("country");

        assert_eq!(from_buffer, declared);
        assert_eq!(from_buffer.as_str(), Some("country"));
        assert_ne!(Key::from_static("countr"), declared);
    }

    #[test]
    fn test_lookup_in_declared_table() {
        let mut table: FxHashMap<Key<'static>, usize> = FxHashMap::default();
        table.insert(Key::from_static("city"), 0);
        table.insert(Key::from_static("country"), 1);

        let buffer = Buffer::from_vec(b"country".to_vec());
        let key = Key::from_buffer(&buffer, 0, 7).unwrap();
        assert_eq!(table.get(&key), Some(&1));
        assert_eq!(table.get(&Key::new(b"postal")), None);
    }

    #[test]
    fn test_out_of_range_key() {
        let buffer = Buffer::from_vec(b"abc".to_vec());
        assert!(Key::from_buffer(&buffer, 1, 5).is_err());
    }
}
