//! Sharding Module
//!
//! Decides which partition owns a galaxy. Both pieces are pure and must produce
//! identical answers on every node.
//!
//! ## Core Concepts
//! - **Partition key**: a signed 64-bit value derived from the galaxy name (`hasher`).
//! - **Partition map**: reduces a partition key to one of a fixed number of partitions (`map`).
//!   Two schemes exist: hash-modulo (default) and the legacy 26-letter table.

pub mod hasher;
pub mod map;

pub use hasher::partition_key;
pub use map::{
    KeyRange, LEGACY_PARTITION_COUNT, PartitionId, PartitionMap, PartitionScheme, Placement,
    legacy_partition, map_to_partition,
};
