//! Routing Module
//!
//! The client-facing half of the catalog: find the partition, find its replicas,
//! send the request, recover once from a stale route.
//!
//! ## Submodules
//! - **`resolver`**: cached partition → descriptor lookups with coalesced misses.
//! - **`transport`**: HTTP and in-process clients for replica endpoints.
//! - **`gateway`**: `RoutingGateway`, validation, endpoint selection and the retry policy.
//! - **`tally`**: per-partition insert counts.
//! - **`handlers`**: the public HTTP surface.

pub mod gateway;
pub mod handlers;
pub mod resolver;
pub mod tally;
pub mod transport;

pub use gateway::RoutingGateway;
pub use resolver::PartitionResolver;
pub use tally::PartitionTally;
pub use transport::{HttpReplicaTransport, LocalTransport, ReplicaTransport};

#[cfg(test)]
mod tests;
