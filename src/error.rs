//! Error types for the geolocations library

use thiserror::Error;

/// Result type alias for database operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for database operations
#[derive(Debug, Error)]
pub enum Error {
    /// The database bytes violate the format (missing marker, pointer out
    /// of range, unsupported record width, truncated value, ...)
    #[error("invalid database: {0}")]
    InvalidDatabase(String),

    /// A requested target type has an unusable schema (no constructor,
    /// several constructors, bad field name, wrong injectable type)
    #[error("deserialization configuration error: {0}")]
    Deserialization(String),

    /// A stored value cannot be converted into the requested Rust type
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        /// Requested Rust type
        expected: &'static str,
        /// Wire type found in the data section
        found: &'static str,
    },

    /// Address text that does not parse as IPv4 or IPv6
    #[error("invalid IP address: {0}")]
    InvalidAddress(String),

    /// I/O errors while opening or reading the database
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Error::InvalidDatabase(msg.into())
    }

    pub(crate) fn config(msg: impl Into<String>) -> Self {
        Error::Deserialization(msg.into())
    }

    /// True for structural corruption of the database bytes
    pub fn is_invalid_database(&self) -> bool {
        matches!(self, Error::InvalidDatabase(_))
    }
}
