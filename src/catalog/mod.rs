//! Catalog Data Model
//!
//! The single record shape the system stores (`StarRecord`, grouped by galaxy) and
//! the wire protocol built around it.
//!
//! ## Keys
//! - **Partition key**: derived from the raw galaxy name (see `sharding`).
//! - **Composite key**: `upper(galaxy) + upper(star)`, unique within a partition.

pub mod protocol;
pub mod types;

pub use types::{InsertOutcome, Property, StarId, StarRecord, canonicalize, composite_key};
