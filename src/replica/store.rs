use super::txn::{MemoryStateStore, TransactionalStore};
use crate::catalog::{InsertOutcome, StarRecord, canonicalize, composite_key};
use crate::error::{StoreError, TxError};
use crate::sharding::PartitionId;

use serde::Serialize;
use std::future::Future;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

/// Builds the backing store when a ReplicaStore activates.
pub type StoreFactory = Arc<dyn Fn() -> Arc<dyn TransactionalStore> + Send + Sync>;

/// Factory producing fresh [`MemoryStateStore`]s.
pub fn memory_factory() -> StoreFactory {
    Arc::new(|| Arc::new(MemoryStateStore::new()) as Arc<dyn TransactionalStore>)
}

/// Lifecycle of a ReplicaStore. There is no terminal state; teardown happens outside.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub enum ReplicaState {
    /// No backing map yet. Reads answer empty without creating one.
    Created,
    /// Backing map initialized by the first write.
    Active,
}

/// Authoritative key → record map of one partition on one replica.
///
/// Every operation runs inside a transaction boundary (writes) or against a
/// consistent snapshot (reads), bounded by `op_timeout`. A timed-out write drops
/// its transaction, which aborts it.
pub struct ReplicaStore {
    partition: PartitionId,
    backing: OnceLock<Arc<dyn TransactionalStore>>,
    factory: StoreFactory,
    op_timeout: Duration,
}

impl ReplicaStore {
    pub fn new(partition: PartitionId, op_timeout: Duration) -> Self {
        Self::with_factory(partition, op_timeout, memory_factory())
    }

    pub fn with_factory(partition: PartitionId, op_timeout: Duration, factory: StoreFactory) -> Self {
        Self {
            partition,
            backing: OnceLock::new(),
            factory,
            op_timeout,
        }
    }

    pub fn partition(&self) -> PartitionId {
        self.partition
    }

    pub fn state(&self) -> ReplicaState {
        if self.backing.get().is_some() {
            ReplicaState::Active
        } else {
            ReplicaState::Created
        }
    }

    fn activate(&self) -> Arc<dyn TransactionalStore> {
        self.backing
            .get_or_init(|| {
                tracing::info!("Activating replica store for partition {}", self.partition);
                (self.factory)()
            })
            .clone()
    }

    /// Inserts `record` under its composite key unless the key already exists.
    ///
    /// A duplicate yields `inserted = false`; it is not an error.
    pub async fn add_star(&self, record: &StarRecord) -> Result<InsertOutcome, StoreError> {
        let inserted = self
            .insert_if_absent(record.composite_key(), record.clone())
            .await?;

        if inserted {
            tracing::debug!(
                "Partition {}: added {}/{}",
                self.partition,
                record.galaxy_name,
                record.star_name
            );
        } else {
            tracing::debug!(
                "Partition {}: {}/{} already exists",
                self.partition,
                record.galaxy_name,
                record.star_name
            );
        }

        Ok(InsertOutcome::for_star(&record.star_name, inserted))
    }

    /// Applies a record committed elsewhere (primary → secondary), keyed as the primary keyed it.
    pub async fn apply_replicated(
        &self,
        key: String,
        record: StarRecord,
    ) -> Result<bool, StoreError> {
        self.insert_if_absent(key, record).await
    }

    async fn insert_if_absent(&self, key: String, record: StarRecord) -> Result<bool, StoreError> {
        let store = self.activate();
        self.bounded(async move {
            let mut tx = store.begin_transaction().await?;
            let inserted = tx.try_insert_if_absent(key, record).await?;
            tx.commit().await?;
            Ok(inserted)
        })
        .await
    }

    /// Every record of `galaxy_name` in this partition. Empty when there are none.
    pub async fn get_all(&self, galaxy_name: &str) -> Result<Vec<StarRecord>, StoreError> {
        let Some(store) = self.backing.get().cloned() else {
            return Ok(Vec::new());
        };

        let prefix = canonicalize(galaxy_name);
        let entries = self
            .bounded(async move { store.scan_prefix(&prefix).await })
            .await?;

        Ok(entries
            .into_iter()
            .map(|(_, record)| record)
            .filter(|record| record.in_galaxy(galaxy_name))
            .collect())
    }

    /// Point lookup by exact composite key.
    pub async fn get_one(
        &self,
        galaxy_name: &str,
        star_name: &str,
    ) -> Result<Option<StarRecord>, StoreError> {
        let Some(store) = self.backing.get().cloned() else {
            return Ok(None);
        };

        let key = composite_key(galaxy_name, star_name);
        self.bounded(async move { store.get(&key).await }).await
    }

    /// Every record in this partition.
    pub async fn dump(&self) -> Result<Vec<StarRecord>, StoreError> {
        let Some(store) = self.backing.get().cloned() else {
            return Ok(Vec::new());
        };

        let entries = self.bounded(async move { store.scan().await }).await?;
        Ok(entries.into_iter().map(|(_, record)| record).collect())
    }

    pub async fn len(&self) -> Result<usize, StoreError> {
        let Some(store) = self.backing.get().cloned() else {
            return Ok(0);
        };
        self.bounded(async move { store.len().await }).await
    }

    async fn bounded<T, F>(&self, operation: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, TxError>>,
    {
        match tokio::time::timeout(self.op_timeout, operation).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(source)) => {
                tracing::warn!("Partition {}: transaction failed: {}", self.partition, source);
                Err(StoreError::Transaction {
                    partition: self.partition,
                    source,
                })
            }
            Err(_) => {
                tracing::warn!(
                    "Partition {}: transaction timed out after {:?}",
                    self.partition,
                    self.op_timeout
                );
                Err(StoreError::Timeout {
                    partition: self.partition,
                })
            }
        }
    }
}
