//! Naming Module
//!
//! Publishes which replicas serve each partition and which of them is the primary.
//! The replication layer that actually elects primaries is external; this module
//! only records and serves its decisions.
//!
//! ## Submodules
//! - **`types`**: `PartitionDescriptor`, `ReplicaEndpoint`, `ReplicaRole`.
//! - **`service`**: the `NamingService` seam and the authoritative `TopologyRegistry`.
//! - **`client`**: HTTP client for a remote registry.
//! - **`handlers`**: HTTP surface of the registry.

pub mod client;
pub mod handlers;
pub mod service;
pub mod types;

pub use client::HttpNamingClient;
pub use service::{NamingService, TopologyRegistry};
pub use types::{PartitionDescriptor, ReplicaEndpoint, ReplicaRole};
