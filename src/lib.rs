//! Galaxy Catalog
//!
//! A partitioned, replicated catalog of stars grouped by galaxy. Every galaxy name
//! hashes to exactly one partition; each partition is served by one primary and
//! any number of read-only secondaries.
//!
//! ## Modules
//! - **`sharding`**: partition key derivation and the fixed partition map.
//! - **`catalog`**: records, composite keys and the wire protocol.
//! - **`naming`**: who serves each partition, and which replica is primary.
//! - **`replica`**: per-partition stores and the replica host.
//! - **`routing`**: resolver cache, replica transports and the gateway.
//! - **`config`** / **`error`**: startup configuration and the error taxonomy.

pub mod catalog;
pub mod config;
pub mod error;
pub mod naming;
pub mod replica;
pub mod routing;
pub mod sharding;
