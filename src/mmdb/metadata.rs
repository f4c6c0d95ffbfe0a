//! MMDB Metadata
//!
//! The metadata map follows the last occurrence of the marker
//! "\xAB\xCD\xEFMaxMind.com" near the end of the file. It is decoded like any
//! other record, with pointers relative to the first byte after the marker.

use super::types::{IpVersion, RecordSize, METADATA_MARKER};
use crate::activator::{ActivatorRegistry, Record, Schema};
use crate::buffer::Buffer;
use crate::decoder::{DecodeContext, Decoder};
use crate::error::{Error, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Database metadata
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Metadata {
    /// Major version of the binary format
    pub binary_format_major_version: u16,
    /// Minor version of the binary format
    pub binary_format_minor_version: u16,
    /// Build time, seconds since the Unix epoch
    pub build_epoch: u64,
    /// Database type, e.g. "GeoLite2-City"
    pub database_type: String,
    /// Locale code -> description
    pub description: BTreeMap<String, String>,
    /// IP version of the search tree
    pub ip_version: IpVersion,
    /// Locale codes the database has names for
    pub languages: Vec<String>,
    /// Number of nodes in the search tree
    pub node_count: u32,
    /// Bits per record
    pub record_size: RecordSize,
}

impl Record for Metadata {
    fn schema(schema: &mut Schema<Self>) {
        let major = schema.field("binary_format_major_version");
        let minor = schema.field("binary_format_minor_version");
        let build_epoch = schema.field("build_epoch");
        let database_type = schema.field("database_type");
        let description = schema.field("description");
        let ip_version = schema.field::<u16>("ip_version");
        let languages = schema.field("languages");
        let node_count = schema.field("node_count");
        let record_size = schema.field::<u16>("record_size");

        schema.constructor(move |args| {
            Ok(Metadata {
                binary_format_major_version: args.take(major)?,
                binary_format_minor_version: args.take(minor)?,
                build_epoch: args.take(build_epoch)?,
                database_type: args.take(database_type)?,
                description: args.take(description)?,
                ip_version: IpVersion::from_number(args.take(ip_version)?)?,
                languages: args.take(languages)?,
                node_count: args.take(node_count)?,
                record_size: RecordSize::from_bits(args.take(record_size)?)?,
            })
        });
    }
}

impl Metadata {
    /// Locate and decode the metadata of a database
    ///
    /// Returns the metadata and the offset where the metadata map starts.
    pub fn read(buffer: &Buffer, registry: &ActivatorRegistry) -> Result<(Self, usize)> {
        let start = find_metadata_start(buffer)?;
        let ctx = DecodeContext::new(registry);
        let (metadata, _) = Decoder::new(buffer, start)
            .decode::<Metadata>(start, &ctx)
            .map_err(|e| match e {
                Error::TypeMismatch { .. } => Error::invalid(format!("unreadable metadata: {}", e)),
                other => other,
            })?;
        Ok((metadata, start))
    }

    /// Build time
    pub fn build_date(&self) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(self.build_epoch)
    }

    /// Bytes per search tree node (record size / 4)
    pub fn node_byte_size(&self) -> usize {
        self.record_size.node_bytes()
    }

    /// Size of the search tree in bytes
    pub fn search_tree_size(&self) -> usize {
        self.node_count as usize * self.node_byte_size()
    }

    /// Description in `locale`, if present
    pub fn description_in(&self, locale: &str) -> Option<&str> {
        self.description.get(locale).map(String::as_str)
    }
}

/// Offset of the first byte after the last metadata marker
pub fn find_metadata_start(buffer: &Buffer) -> Result<usize> {
    memchr::memmem::rfind(buffer.as_slice(), METADATA_MARKER)
        .map(|pos| pos + METADATA_MARKER.len())
        .ok_or_else(|| {
            Error::invalid("could not find a metadata marker in this file; is this a valid database?")
        })
}
