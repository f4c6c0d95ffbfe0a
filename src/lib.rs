//! Geolocations - Read-only Geo-IP Database Reader
//!
//! Resolves IP addresses to structured location records stored in MaxMind DB
//! (MMDB) files, and exports a whole database as (network, record) pairs.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use geolocations::{InjectableValues, Location, Reader, LOCALES};
//!
//! let reader = Reader::open("GeoLite2-City.mmdb")?;
//!
//! // Point lookup; a miss is Ok(None)
//! if let Some(location) = reader.find::<Location>("81.2.69.160".parse()?)? {
//!     println!("{:?} / {:?}", location.country.iso_code, location.city.name("en"));
//! }
//!
//! // Preferred locales are handed to records that ask for them
//! let locales = InjectableValues::new().with_value(LOCALES, vec!["de".to_string()]);
//! let location = reader.find_with::<Location>("81.2.69.160".parse()?, &locales)?;
//! println!("{:?}", location.and_then(|l| l.country.localized_name().map(String::from)));
//!
//! // Full export
//! for record in reader.find_all::<Location>(Default::default(), None) {
//!     let record = record?;
//!     println!("{} {:?}", record.network, record.data.country.iso_code);
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────┐
//! │  Database File Format                │
//! ├──────────────────────────────────────┤
//! │  1. Search Tree (binary trie)        │
//! │  2. 16-byte zero separator           │
//! │  3. Data Section (deduplicated)      │
//! │  4. Metadata marker + metadata map   │
//! └──────────────────────────────────────┘
//! ```
//!
//! - [`buffer`]: in-memory or memory-mapped bytes, bounds-checked readers
//! - [`mmdb`]: search tree, metadata, format constants
//! - [`decoder`]: the self-describing data section format
//! - [`activator`]: declarative record schemas and their cached plans
//! - [`reader`]: lookups and full iteration
//! - [`location`]: typed city / country records
//!
//! Any type implementing [`Decode`] can be requested from a lookup:
//! [`DataValue`] for the raw tree, [`Location`], or your own [`Record`].

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Typed construction of decoded values
pub mod activator;
pub mod buffer;
/// Bounded decode cache for full iteration
pub mod cache;
pub mod data_value;
pub mod decoder;
/// Error types
pub mod error;
pub mod key;
pub mod location;
pub mod mmdb;
pub mod network;
pub mod reader;

#[cfg(test)]
#[allow(dead_code)]
#[path = "../tests/common/writer.rs"]
mod test_writer;

// Re-exports for Rust consumers

pub use crate::activator::{ActivatorRegistry, InjectableValues, Record, Schema, Slot};
pub use crate::buffer::{AccessMode, Buffer};
pub use crate::data_value::DataValue;
pub use crate::decoder::{Decode, DecodeContext, Decoder};
pub use crate::error::{Error, Result};
pub use crate::key::Key;
pub use crate::location::{
    City, Continent, Coordinates, Country, Location, Postal, RepresentedCountry, Subdivision,
    Traits, LOCALES,
};
pub use crate::mmdb::{IpVersion, Metadata, RecordSize};
pub use crate::network::Network;
pub use crate::reader::{
    FindAll, FindAllOptions, LookupResult, NetworkRecord, Reader, ReaderOpener, ReaderOptions,
};

/// Library version string
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
