//! Partition Resolver
//!
//! Answers "which replicas serve partition N, and which one is primary?" from a
//! local cache backed by the naming collaborator. Concurrent misses for the same
//! partition share one lookup; a miss for another partition never waits on it.

use crate::error::RoutingError;
use crate::naming::{NamingService, PartitionDescriptor};
use crate::sharding::PartitionId;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

const INITIAL_BACKOFF_MS: u64 = 150;
const MAX_BACKOFF_MS: u64 = 1200;

pub struct PartitionResolver {
    naming: Arc<dyn NamingService>,
    cache: DashMap<PartitionId, Arc<PartitionDescriptor>>,
    inflight: DashMap<PartitionId, Arc<Mutex<()>>>,
    lookup_timeout: Duration,
    attempts: usize,
}

impl PartitionResolver {
    pub fn new(naming: Arc<dyn NamingService>, lookup_timeout: Duration, attempts: usize) -> Self {
        Self {
            naming,
            cache: DashMap::new(),
            inflight: DashMap::new(),
            lookup_timeout,
            attempts: attempts.max(1),
        }
    }

    /// Cached descriptor, without touching the naming service.
    pub fn cached(&self, partition: PartitionId) -> Option<Arc<PartitionDescriptor>> {
        self.cache
            .get(&partition)
            .map(|entry| entry.value().clone())
    }

    /// Drops the cached descriptor so the next `resolve` asks the naming service again.
    pub fn invalidate(&self, partition: PartitionId) {
        if let Some((_, descriptor)) = self.cache.remove(&partition) {
            tracing::debug!(
                "Invalidated partition {} (was v{})",
                partition,
                descriptor.topology_version
            );
        }
    }

    /// Cached descriptor, or a fresh one from the naming service on a miss.
    pub async fn resolve(
        &self,
        partition: PartitionId,
    ) -> Result<Arc<PartitionDescriptor>, RoutingError> {
        if let Some(descriptor) = self.cached(partition) {
            return Ok(descriptor);
        }

        let gate = self
            .inflight
            .entry(partition)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = gate.lock().await;

        // Another waiter may have filled the cache while we queued.
        if let Some(descriptor) = self.cached(partition) {
            return Ok(descriptor);
        }

        let descriptor = self.fetch(partition).await?;
        Ok(self.install(descriptor))
    }

    /// Caches `descriptor` unless a newer version is already cached.
    fn install(&self, descriptor: PartitionDescriptor) -> Arc<PartitionDescriptor> {
        let descriptor = Arc::new(descriptor);
        match self.cache.entry(descriptor.partition_id) {
            Entry::Occupied(mut entry) => {
                if entry.get().topology_version > descriptor.topology_version {
                    return entry.get().clone();
                }
                entry.insert(descriptor.clone());
            }
            Entry::Vacant(entry) => {
                entry.insert(descriptor.clone());
            }
        }
        tracing::debug!(
            "Resolved partition {} (v{}, {} endpoints)",
            descriptor.partition_id,
            descriptor.topology_version,
            descriptor.endpoints.len()
        );
        descriptor
    }

    async fn fetch(&self, partition: PartitionId) -> Result<PartitionDescriptor, RoutingError> {
        let mut delay_ms = INITIAL_BACKOFF_MS;
        let mut last_error = String::new();

        for attempt in 0..self.attempts {
            match tokio::time::timeout(self.lookup_timeout, self.naming.lookup(partition)).await {
                Ok(Ok(Some(descriptor))) => return Ok(descriptor),
                Ok(Ok(None)) => {
                    return Err(RoutingError::ResolutionFailed {
                        partition,
                        reason: "partition is unknown to the naming service".to_string(),
                    });
                }
                Ok(Err(e)) => last_error = e.to_string(),
                Err(_) => last_error = format!("lookup timed out after {:?}", self.lookup_timeout),
            }

            tracing::warn!(
                "Resolving partition {} failed (attempt {}/{}): {}",
                partition,
                attempt + 1,
                self.attempts,
                last_error
            );

            if attempt + 1 < self.attempts {
                let jitter = rand::random::<u64>() % 50;
                tokio::time::sleep(Duration::from_millis(delay_ms + jitter)).await;
                delay_ms = (delay_ms * 2).min(MAX_BACKOFF_MS);
            }
        }

        Err(RoutingError::ResolutionFailed {
            partition,
            reason: last_error,
        })
    }
}
