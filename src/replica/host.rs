//! Replica Host
//!
//! One process serving a ReplicaStore for every partition it replicates. The host
//! accepts writes only for partitions where the naming service lists it as primary,
//! answers once the insert is committed locally, pushes it to the secondaries in
//! tracked background tasks, and, as a secondary, pulls whatever it missed from
//! the primary on every anti-entropy round.

use super::store::{ReplicaState, ReplicaStore, StoreFactory, memory_factory};
use crate::catalog::protocol::ReplicateRequest;
use crate::catalog::{InsertOutcome, StarRecord};
use crate::error::{ReplicaError, TransportError};
use crate::naming::{PartitionDescriptor, ReplicaRole};
use crate::routing::{PartitionResolver, ReplicaTransport};
use crate::sharding::{PartitionId, PartitionMap};

use anyhow::Result;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::Mutex;
use tokio::task::{JoinError, JoinSet};
use uuid::Uuid;

const PUSH_ATTEMPTS: usize = 3;
const MAX_TRACKED_OPS: usize = 10_000;

pub struct ReplicaHost {
    address: String,
    map: PartitionMap,
    stores: DashMap<PartitionId, Arc<ReplicaStore>>,
    processed_ops: DashMap<String, u64>,
    resolver: Arc<PartitionResolver>,
    transport: Arc<dyn ReplicaTransport>,
    factory: StoreFactory,
    commit_timeout: Duration,
    pushes: Mutex<JoinSet<()>>,
}

impl ReplicaHost {
    pub fn new(
        address: &str,
        map: PartitionMap,
        resolver: Arc<PartitionResolver>,
        transport: Arc<dyn ReplicaTransport>,
        commit_timeout: Duration,
    ) -> Arc<Self> {
        Self::with_factory(
            address,
            map,
            resolver,
            transport,
            commit_timeout,
            memory_factory(),
        )
    }

    pub fn with_factory(
        address: &str,
        map: PartitionMap,
        resolver: Arc<PartitionResolver>,
        transport: Arc<dyn ReplicaTransport>,
        commit_timeout: Duration,
        factory: StoreFactory,
    ) -> Arc<Self> {
        Arc::new(Self {
            address: address.trim_end_matches('/').to_string(),
            map,
            stores: DashMap::new(),
            processed_ops: DashMap::new(),
            resolver,
            transport,
            factory,
            commit_timeout,
            pushes: Mutex::new(JoinSet::new()),
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// The store for `partition`, created (not activated) on first access.
    pub fn store(&self, partition: PartitionId) -> Result<Arc<ReplicaStore>, ReplicaError> {
        if !self.map.contains(partition) {
            return Err(ReplicaError::UnknownPartition(partition));
        }
        Ok(self
            .stores
            .entry(partition)
            .or_insert_with(|| {
                Arc::new(ReplicaStore::with_factory(
                    partition,
                    self.commit_timeout,
                    self.factory.clone(),
                ))
            })
            .clone())
    }

    // ============================================================
    // WRITES
    // ============================================================

    /// Adds a star on this host as primary of `partition`.
    ///
    /// Returns as soon as the local commit is done. Secondaries receive the record
    /// from background pushes; see [`ReplicaHost::flush_replication`].
    pub async fn add_star(
        &self,
        partition: PartitionId,
        record: StarRecord,
    ) -> Result<InsertOutcome, ReplicaError> {
        self.validate(partition, &record)?;
        let store = self.store(partition)?;
        let descriptor = self.ensure_primary(partition).await?;

        let outcome = store.add_star(&record).await?;
        if outcome.inserted {
            self.replicate_to_secondaries(&descriptor, partition, record)
                .await;
        }
        Ok(outcome)
    }

    fn validate(&self, partition: PartitionId, record: &StarRecord) -> Result<(), ReplicaError> {
        if record.star_name.trim().is_empty() {
            return Err(ReplicaError::InvalidRecord(
                "starName must not be empty".to_string(),
            ));
        }
        let placement = self
            .map
            .locate(&record.galaxy_name)
            .map_err(|e| ReplicaError::InvalidRecord(e.to_string()))?;
        if placement.partition != partition {
            return Err(ReplicaError::InvalidRecord(format!(
                "galaxy {} belongs to partition {}, not {}",
                record.galaxy_name, placement.partition, partition
            )));
        }
        Ok(())
    }

    /// The current descriptor, provided it names this host as primary.
    ///
    /// A mismatch may be a stale cache entry, so it is re-resolved once before refusing.
    async fn ensure_primary(
        &self,
        partition: PartitionId,
    ) -> Result<Arc<PartitionDescriptor>, ReplicaError> {
        let descriptor = self.resolve(partition).await?;
        if descriptor.role_of(&self.address) == Some(ReplicaRole::Primary) {
            return Ok(descriptor);
        }

        self.resolver.invalidate(partition);
        let descriptor = self.resolve(partition).await?;
        if descriptor.role_of(&self.address) == Some(ReplicaRole::Primary) {
            return Ok(descriptor);
        }

        Err(ReplicaError::NotPrimary {
            partition,
            address: self.address.clone(),
        })
    }

    async fn resolve(
        &self,
        partition: PartitionId,
    ) -> Result<Arc<PartitionDescriptor>, ReplicaError> {
        self.resolver
            .resolve(partition)
            .await
            .map_err(|e| ReplicaError::Resolution {
                partition,
                reason: e.to_string(),
            })
    }

    async fn replicate_to_secondaries(
        &self,
        descriptor: &PartitionDescriptor,
        partition: PartitionId,
        record: StarRecord,
    ) {
        let request = Arc::new(ReplicateRequest {
            op_id: Uuid::new_v4().to_string(),
            composite_key: record.composite_key(),
            record,
        });

        let mut pushes = self.pushes.lock().await;
        while let Some(finished) = pushes.try_join_next() {
            log_push_failure(finished);
        }

        for secondary in descriptor.secondaries() {
            if secondary.address == self.address {
                continue;
            }
            let transport = self.transport.clone();
            let address = secondary.address.clone();
            let request = request.clone();
            pushes.spawn(async move {
                if let Err(e) =
                    push_with_retry(transport.as_ref(), &address, partition, &request).await
                {
                    tracing::warn!(
                        "Replication of {} to {} failed, left to anti-entropy: {}",
                        request.composite_key,
                        address,
                        e
                    );
                }
            });
        }
    }

    /// Waits for every replication push started so far.
    pub async fn flush_replication(&self) {
        let mut pushes = std::mem::take(&mut *self.pushes.lock().await);
        while let Some(finished) = pushes.join_next().await {
            log_push_failure(finished);
        }
    }

    fn should_process(&self, op_id: &str) -> bool {
        if self.processed_ops.contains_key(op_id) {
            return false;
        }
        if self.processed_ops.len() > MAX_TRACKED_OPS {
            self.processed_ops.clear();
        }
        self.processed_ops.insert(op_id.to_string(), now_ms());
        true
    }

    /// Applies a record pushed by the primary. Duplicate deliveries of one op are ignored.
    pub async fn apply_replica(
        &self,
        partition: PartitionId,
        request: ReplicateRequest,
    ) -> Result<bool, ReplicaError> {
        if request.composite_key != request.record.composite_key() {
            return Err(ReplicaError::InvalidRecord(format!(
                "composite key {} does not match the record",
                request.composite_key
            )));
        }
        let store = self.store(partition)?;
        if !self.should_process(&request.op_id) {
            return Ok(false);
        }

        match store
            .apply_replicated(request.composite_key, request.record)
            .await
        {
            Ok(applied) => Ok(applied),
            Err(e) => {
                // Let the primary's retry through.
                self.processed_ops.remove(&request.op_id);
                Err(e.into())
            }
        }
    }

    // ============================================================
    // READS
    // ============================================================

    pub async fn get_all(
        &self,
        partition: PartitionId,
        galaxy_name: &str,
    ) -> Result<Vec<StarRecord>, ReplicaError> {
        Ok(self.store(partition)?.get_all(galaxy_name).await?)
    }

    pub async fn get_one(
        &self,
        partition: PartitionId,
        galaxy_name: &str,
        star_name: &str,
    ) -> Result<Option<StarRecord>, ReplicaError> {
        Ok(self
            .store(partition)?
            .get_one(galaxy_name, star_name)
            .await?)
    }

    pub async fn dump(&self, partition: PartitionId) -> Result<Vec<StarRecord>, ReplicaError> {
        Ok(self.store(partition)?.dump().await?)
    }

    // ============================================================
    // ANTI-ENTROPY
    // ============================================================

    /// Pulls `partition` from its primary and applies whatever is missing here.
    ///
    /// Returns the number of records applied. Does nothing unless this host is a
    /// secondary of the partition.
    pub async fn sync_partition(&self, partition: PartitionId) -> Result<usize> {
        let descriptor = self.resolve(partition).await?;
        if descriptor.role_of(&self.address) != Some(ReplicaRole::Secondary) {
            return Ok(0);
        }
        let Some(primary) = descriptor.primary() else {
            return Ok(0);
        };

        let records = self
            .transport
            .get_partition(&primary.address, partition)
            .await?;

        let store = self.store(partition)?;
        let mut applied = 0;
        for record in records {
            if store
                .apply_replicated(record.composite_key(), record)
                .await?
            {
                applied += 1;
            }
        }

        if applied > 0 {
            tracing::info!(
                "Anti-entropy applied {} records to partition {} from {}",
                applied,
                partition,
                primary.address
            );
        }
        Ok(applied)
    }

    /// One sync pass over every partition. Failures are logged and skipped.
    pub async fn anti_entropy_round(&self) -> usize {
        let mut applied = 0;
        for partition in self.map.partitions() {
            match self.sync_partition(partition).await {
                Ok(count) => applied += count,
                Err(e) => {
                    tracing::warn!("Anti-entropy for partition {} failed: {}", partition, e);
                }
            }
        }
        applied
    }

    pub fn spawn_anti_entropy(self: &Arc<Self>, every: Duration) -> tokio::task::JoinHandle<()> {
        let host = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.tick().await;

            loop {
                interval.tick().await;
                let applied = host.anti_entropy_round().await;
                tracing::debug!("Anti-entropy round done ({} records applied)", applied);
            }
        })
    }

    /// Number of partitions with an activated store, and the records they hold.
    pub async fn local_stats(&self) -> (usize, usize) {
        let stores: Vec<Arc<ReplicaStore>> = self
            .stores
            .iter()
            .map(|entry| entry.value().clone())
            .collect();

        let mut active = 0;
        let mut records = 0;
        for store in stores {
            if store.state() == ReplicaState::Active {
                active += 1;
                records += store.len().await.unwrap_or(0);
            }
        }
        (active, records)
    }
}

async fn push_with_retry(
    transport: &dyn ReplicaTransport,
    address: &str,
    partition: PartitionId,
    request: &ReplicateRequest,
) -> Result<bool, TransportError> {
    let mut delay_ms = 150u64;

    for attempt in 0..PUSH_ATTEMPTS {
        match transport.replicate(address, partition, request).await {
            Ok(applied) => return Ok(applied),
            Err(e) if !e.is_retryable() || attempt + 1 == PUSH_ATTEMPTS => return Err(e),
            Err(e) => {
                tracing::debug!("Replicate to {} failed, retrying: {}", address, e);
                let jitter = rand::random::<u64>() % 50;
                tokio::time::sleep(Duration::from_millis(delay_ms + jitter)).await;
                delay_ms = (delay_ms * 2).min(1200);
            }
        }
    }

    Err(TransportError::Unreachable {
        address: address.to_string(),
        reason: "retry attempts exhausted".to_string(),
    })
}

fn log_push_failure(finished: Result<(), JoinError>) {
    if let Err(e) = finished {
        tracing::error!("Replication push task failed: {}", e);
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
