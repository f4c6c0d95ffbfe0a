//! MaxMind DB (MMDB) file structure
//!
//! The file is laid out as
//! `[search tree][16 zero bytes][data section][metadata marker][metadata]`.
//!
//! - **types**: format constants, record sizes and data type tags
//! - **tree**: binary search tree traversal for IP lookups
//! - **metadata**: metadata marker search and decoding
//!
//! Values in the data section are decoded by [`crate::decoder`].

pub mod metadata;
pub mod tree;
pub mod types;

pub use metadata::{find_metadata_start, Metadata};
pub use tree::{SearchTree, TreeHit, TreeRecord};
pub use types::{
    IpVersion, RecordSize, TypeTag, DATA_SECTION_SEPARATOR_SIZE, IPV4_SUBTREE_DEPTH,
    METADATA_MARKER,
};
