//! Transactional Store Interface
//!
//! The narrow surface a `ReplicaStore` consumes from the replication layer:
//! begin a transaction, insert-if-absent, commit, and consistent reads. Dropping
//! an uncommitted [`Transaction`] aborts it and leaves committed state untouched.
//!
//! `MemoryStateStore` is the in-process implementation. Writers are serialized by
//! an owned writer guard held for the whole transaction; readers only take the
//! snapshot lock, and a commit publishes all staged writes under one write guard,
//! so no reader ever observes half a commit.

use crate::catalog::StarRecord;
use crate::error::TxError;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

/// A keyed store with transactional writes and snapshot reads.
#[async_trait]
pub trait TransactionalStore: Send + Sync {
    /// Opens a write transaction. Waits while another writer is active.
    async fn begin_transaction(&self) -> Result<Box<dyn Transaction>, TxError>;

    /// Point read against the committed state.
    async fn get(&self, key: &str) -> Result<Option<StarRecord>, TxError>;

    /// Every committed entry whose key starts with `prefix`, in no particular order.
    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, StarRecord)>, TxError>;

    /// Every committed entry.
    async fn scan(&self) -> Result<Vec<(String, StarRecord)>, TxError> {
        self.scan_prefix("").await
    }

    async fn len(&self) -> Result<usize, TxError>;
}

/// An open write transaction.
#[async_trait]
pub trait Transaction: Send {
    /// Stages `value` under `key` unless the key is already committed or staged.
    /// Returns whether the value was staged.
    async fn try_insert_if_absent(&mut self, key: String, value: StarRecord)
    -> Result<bool, TxError>;

    /// Publishes every staged write atomically.
    async fn commit(self: Box<Self>) -> Result<(), TxError>;
}

type Snapshot = Arc<RwLock<HashMap<String, StarRecord>>>;

/// In-memory [`TransactionalStore`].
pub struct MemoryStateStore {
    committed: Snapshot,
    writer: Arc<Mutex<()>>,
    commits: Arc<AtomicU64>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self {
            committed: Arc::new(RwLock::new(HashMap::new())),
            writer: Arc::new(Mutex::new(())),
            commits: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Number of transactions committed so far.
    pub fn commit_count(&self) -> u64 {
        self.commits.load(Ordering::Relaxed)
    }
}

impl Default for MemoryStateStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TransactionalStore for MemoryStateStore {
    async fn begin_transaction(&self) -> Result<Box<dyn Transaction>, TxError> {
        let guard = self.writer.clone().lock_owned().await;
        Ok(Box::new(MemoryTransaction {
            _writer: guard,
            committed: self.committed.clone(),
            commits: self.commits.clone(),
            staged: HashMap::new(),
        }))
    }

    async fn get(&self, key: &str) -> Result<Option<StarRecord>, TxError> {
        Ok(self.committed.read().await.get(key).cloned())
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, StarRecord)>, TxError> {
        let committed = self.committed.read().await;
        Ok(committed
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect())
    }

    async fn len(&self) -> Result<usize, TxError> {
        Ok(self.committed.read().await.len())
    }
}

/// Write transaction on a [`MemoryStateStore`]. Holds the writer guard until
/// committed or dropped.
struct MemoryTransaction {
    _writer: OwnedMutexGuard<()>,
    committed: Snapshot,
    commits: Arc<AtomicU64>,
    staged: HashMap<String, StarRecord>,
}

#[async_trait]
impl Transaction for MemoryTransaction {
    async fn try_insert_if_absent(
        &mut self,
        key: String,
        value: StarRecord,
    ) -> Result<bool, TxError> {
        if self.staged.contains_key(&key) {
            return Ok(false);
        }
        if self.committed.read().await.contains_key(&key) {
            return Ok(false);
        }
        self.staged.insert(key, value);
        Ok(true)
    }

    async fn commit(self: Box<Self>) -> Result<(), TxError> {
        let MemoryTransaction {
            _writer,
            committed,
            commits,
            staged,
        } = *self;

        if !staged.is_empty() {
            let mut committed = committed.write().await;
            committed.extend(staged);
        }
        commits.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}
