//! Random-access byte source backing a database.
//!
//! A [`Buffer`] is either the whole file loaded into memory or a read-only
//! memory-mapped view of it. Both backings expose the same bounds-checked
//! big-endian readers; an out-of-range read is reported as
//! [`Error::InvalidDatabase`] instead of panicking, because every offset
//! handed to a buffer is derived from untrusted file contents.
//!
//! # Example
//!
//! ```
//! use geolocations::buffer::Buffer;
//!
//! let buffer = Buffer::from_vec(vec![0x00, 0x01, 0x02, 0x03, 0xff]);
//! assert_eq!(buffer.read_var_uint(1, 3)?, 0x010203);
//! assert!(buffer.read_bytes(3, 4).is_err());
//! # Ok::<(), geolocations::Error>(())
//! ```

use crate::error::{Error, Result};
use memmap2::Mmap;
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// How a database file is brought into memory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AccessMode {
    /// Read the whole file into an owned byte vector
    Memory,
    /// Memory-map the file read-only (pages are loaded on demand)
    #[default]
    MemoryMapped,
}

/// Storage for database data - either owned or memory-mapped
enum Storage {
    Owned(Vec<u8>),
    Mmap(Mmap),
}

/// Read-only, fixed-length byte source.
///
/// Dropping the buffer releases the mapping (or the owned bytes).
pub struct Buffer {
    storage: Storage,
}

impl Buffer {
    /// Wrap bytes already in memory
    pub fn from_vec(bytes: Vec<u8>) -> Self {
        Self {
            storage: Storage::Owned(bytes),
        }
    }

    /// Open a file with the requested access mode
    pub fn open<P: AsRef<Path>>(path: P, mode: AccessMode) -> Result<Self> {
        let path = path.as_ref();
        match mode {
            AccessMode::Memory => Ok(Self::from_vec(std::fs::read(path)?)),
            AccessMode::MemoryMapped => {
                let file = File::open(path)?;
                // SAFETY: the mapping is read-only and every access goes through
                // the bounds-checked readers below. Truncating the file while it
                // is mapped is outside what this crate can defend against.
                let mmap = unsafe { Mmap::map(&file)? };
                Ok(Self {
                    storage: Storage::Mmap(mmap),
                })
            }
        }
    }

    /// Drain a stream into memory. An empty stream is not a database.
    pub fn from_reader<R: Read>(mut reader: R) -> Result<Self> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        if bytes.is_empty() {
            return Err(Error::invalid(
                "there are zero bytes left in the stream; was it already consumed?",
            ));
        }
        Ok(Self::from_vec(bytes))
    }

    /// Total length in bytes
    #[inline]
    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    /// True when the buffer holds no bytes
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True when the buffer is a memory-mapped view
    pub fn is_mapped(&self) -> bool {
        matches!(self.storage, Storage::Mmap(_))
    }

    /// The whole buffer as a slice
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        match &self.storage {
            Storage::Owned(v) => v.as_slice(),
            Storage::Mmap(m) => &m[..],
        }
    }

    /// Borrow `count` bytes starting at `offset`
    #[inline]
    pub fn read_bytes(&self, offset: usize, count: usize) -> Result<&[u8]> {
        let data = self.as_slice();
        offset
            .checked_add(count)
            .filter(|&end| end <= data.len())
            .map(|end| &data[offset..end])
            .ok_or_else(|| {
                Error::invalid(format!(
                    "read of {} bytes at offset {} exceeds buffer length {}",
                    count,
                    offset,
                    data.len()
                ))
            })
    }

    /// Read a single byte
    #[inline]
    pub fn read_byte(&self, offset: usize) -> Result<u8> {
        self.as_slice().get(offset).copied().ok_or_else(|| {
            Error::invalid(format!(
                "byte offset {} exceeds buffer length {}",
                offset,
                self.len()
            ))
        })
    }

    /// Borrow `count` bytes at `offset` as UTF-8 text
    pub fn read_utf8(&self, offset: usize, count: usize) -> Result<&str> {
        let bytes = self.read_bytes(offset, count)?;
        std::str::from_utf8(bytes)
            .map_err(|e| Error::invalid(format!("invalid UTF-8 at offset {}: {}", offset, e)))
    }

    /// Read a big-endian signed 32-bit integer
    #[inline]
    pub fn read_be_i32(&self, offset: usize) -> Result<i32> {
        let b = self.read_bytes(offset, 4)?;
        Ok(i32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Read a big-endian unsigned integer stored in `byte_count` (0..=4) bytes.
    /// Zero bytes read as 0.
    #[inline]
    pub fn read_var_uint(&self, offset: usize, byte_count: usize) -> Result<u32> {
        if byte_count > 4 {
            return Err(Error::invalid(format!(
                "unexpected 32-bit integer of {} bytes",
                byte_count
            )));
        }
        Ok(self
            .read_bytes(offset, byte_count)?
            .iter()
            .fold(0u32, |acc, &b| (acc << 8) | b as u32))
    }

    /// Read a big-endian unsigned integer of up to 8 bytes
    pub fn read_u64(&self, offset: usize, size: usize) -> Result<u64> {
        if size > 8 {
            return Err(Error::invalid(format!(
                "unexpected 64-bit integer of {} bytes",
                size
            )));
        }
        Ok(self
            .read_bytes(offset, size)?
            .iter()
            .fold(0u64, |acc, &b| (acc << 8) | b as u64))
    }

    /// Read a big-endian unsigned integer of up to 16 bytes
    pub fn read_u128(&self, offset: usize, size: usize) -> Result<u128> {
        if size > 16 {
            return Err(Error::invalid(format!(
                "unexpected 128-bit integer of {} bytes",
                size
            )));
        }
        Ok(self
            .read_bytes(offset, size)?
            .iter()
            .fold(0u128, |acc, &b| (acc << 8) | b as u128))
    }

    /// Read an IEEE 754 double (8 bytes, big-endian)
    pub fn read_f64(&self, offset: usize) -> Result<f64> {
        Ok(f64::from_bits(self.read_u64(offset, 8)?))
    }

    /// Read an IEEE 754 single (4 bytes, big-endian)
    pub fn read_f32(&self, offset: usize) -> Result<f32> {
        Ok(f32::from_bits(self.read_var_uint(offset, 4)?))
    }
}

impl fmt::Debug for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buffer")
            .field("len", &self.len())
            .field("mapped", &self.is_mapped())
            .finish()
    }
}
