//! Typed construction of decoded values
//!
//! - **schema**: [`Record`] declarations and their compiled [`RecordActivator`]
//! - **registry**: [`ActivatorRegistry`], the per-type activator cache
//! - **container**: list / dictionary activators for arrays and maps
//! - **inject**: [`InjectableValues`] supplied by the caller

pub mod container;
pub mod inject;
pub mod registry;
pub mod schema;

pub use container::{decode_dictionary, decode_list, DictionaryActivator, ListActivator};
pub use inject::InjectableValues;
pub use registry::ActivatorRegistry;
pub use schema::{Args, Record, RecordActivator, Schema, Slot};
