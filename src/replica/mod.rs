//! Replica Module
//!
//! Everything that runs on a node holding partition data.
//!
//! ## Submodules
//! - **`txn`**: the transactional store interface and its in-memory implementation.
//! - **`store`**: `ReplicaStore`, the per-partition state machine (Created → Active).
//! - **`host`**: `ReplicaHost`, primary checks, replication push and anti-entropy.
//! - **`handlers`**: HTTP surface of a replica host.

pub mod handlers;
pub mod host;
pub mod store;
pub mod txn;

pub use host::ReplicaHost;
pub use store::{ReplicaState, ReplicaStore, StoreFactory, memory_factory};
pub use txn::{MemoryStateStore, Transaction, TransactionalStore};
