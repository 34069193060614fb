//! Routing Gateway
//!
//! Stateless apart from the resolver cache and the insert tally. Every request is
//! validated, hashed to its partition, and sent to the primary (writes) or a
//! random secondary (reads). A failure that smells of a stale route invalidates
//! the cached descriptor and gets exactly one more attempt; a retried read skips
//! the replica that just failed.

use super::resolver::PartitionResolver;
use super::tally::PartitionTally;
use super::transport::ReplicaTransport;
use crate::catalog::StarRecord;
use crate::catalog::protocol::{StarInsertResult, StarsInfo, StatsResponse};
use crate::error::{RoutingError, TransportError};
use crate::naming::{PartitionDescriptor, ReplicaEndpoint};
use crate::sharding::{PartitionId, PartitionMap};

use std::future::Future;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    Primary,
    AnyReader,
}

pub struct RoutingGateway {
    map: PartitionMap,
    resolver: Arc<PartitionResolver>,
    transport: Arc<dyn ReplicaTransport>,
    tally: PartitionTally,
}

impl RoutingGateway {
    pub fn new(
        map: PartitionMap,
        resolver: Arc<PartitionResolver>,
        transport: Arc<dyn ReplicaTransport>,
    ) -> Self {
        Self {
            map,
            resolver,
            transport,
            tally: PartitionTally::new(),
        }
    }

    pub fn partition_map(&self) -> PartitionMap {
        self.map
    }

    /// Routes a new star to the primary of its galaxy's partition.
    ///
    /// Resubmitting the same star is safe: the replica answers `inserted = false`.
    pub async fn submit(&self, record: StarRecord) -> Result<StarInsertResult, RoutingError> {
        if record.star_name.trim().is_empty() {
            return Err(RoutingError::Validation(
                "starName must not be empty".to_string(),
            ));
        }
        let placement = self.map.locate(&record.galaxy_name)?;
        let partition = placement.partition;

        let transport = self.transport.as_ref();
        let record_ref = &record;
        let (endpoint, outcome) = self
            .route(partition, Target::Primary, |endpoint| async move {
                transport
                    .add_star(&endpoint.address, partition, record_ref)
                    .await
            })
            .await?;

        if outcome.inserted {
            self.tally.record(partition);
        }
        tracing::debug!(
            "{} -> partition {} via {}: {}",
            record.galaxy_name,
            partition,
            endpoint.address,
            outcome.message
        );

        Ok(StarInsertResult {
            result: outcome.message,
            partition_key: placement.partition_key.to_string(),
            input_value: record.galaxy_name,
            service_partition_id: partition.to_string(),
            service_replica_address: endpoint.address,
            inserted: outcome.inserted,
        })
    }

    /// Stars of one galaxy, or only `star_name` when it is given and non-empty.
    pub async fn query(
        &self,
        galaxy_name: &str,
        star_name: Option<&str>,
    ) -> Result<StarsInfo, RoutingError> {
        let placement = self.map.locate(galaxy_name)?;
        let partition = placement.partition;
        let star_name = star_name.filter(|name| !name.trim().is_empty());

        let transport = self.transport.as_ref();
        let (endpoint, stars) = self
            .route(partition, Target::AnyReader, |endpoint| async move {
                match star_name {
                    Some(star) => {
                        transport
                            .get_star(&endpoint.address, partition, galaxy_name, star)
                            .await
                    }
                    None => {
                        transport
                            .get_galaxy(&endpoint.address, partition, galaxy_name)
                            .await
                    }
                }
            })
            .await?;

        Ok(StarsInfo {
            partition_id: partition,
            endpoint_role: endpoint.role,
            endpoint_address: endpoint.address,
            stars,
        })
    }

    /// Every star stored in `partition`.
    pub async fn partition_contents(&self, partition: PartitionId) -> Result<StarsInfo, RoutingError> {
        if !self.map.contains(partition) {
            return Err(RoutingError::UnknownPartition(partition));
        }

        let transport = self.transport.as_ref();
        let (endpoint, stars) = self
            .route(partition, Target::AnyReader, |endpoint| async move {
                transport.get_partition(&endpoint.address, partition).await
            })
            .await?;

        Ok(StarsInfo {
            partition_id: partition,
            endpoint_role: endpoint.role,
            endpoint_address: endpoint.address,
            stars,
        })
    }

    pub fn stats(&self) -> StatsResponse {
        self.tally.snapshot()
    }

    /// Runs `call` against the selected endpoint. A retryable failure invalidates
    /// the route and runs it once more against a freshly resolved endpoint.
    async fn route<T, F, Fut>(
        &self,
        partition: PartitionId,
        target: Target,
        call: F,
    ) -> Result<(ReplicaEndpoint, T), RoutingError>
    where
        F: Fn(ReplicaEndpoint) -> Fut,
        Fut: Future<Output = Result<T, TransportError>>,
    {
        let endpoint = self.select(partition, target, None).await?;
        match call(endpoint.clone()).await {
            Ok(value) => return Ok((endpoint, value)),
            Err(e) if e.is_retryable() => {
                tracing::warn!(
                    "Partition {} via {} failed, re-resolving: {}",
                    partition,
                    endpoint.address,
                    e
                );
                self.resolver.invalidate(partition);
            }
            Err(e) => return Err(RoutingError::from_transport(partition, e)),
        }

        let failed = endpoint.address;
        let endpoint = self.select(partition, target, Some(&failed)).await?;
        match call(endpoint.clone()).await {
            Ok(value) => Ok((endpoint, value)),
            Err(e) => Err(RoutingError::from_transport(partition, e)),
        }
    }

    /// Picks an endpoint from the cached descriptor, refreshing it once when the
    /// group has nobody suitable. Reads never pick `avoid` while another secondary
    /// or the primary is available.
    async fn select(
        &self,
        partition: PartitionId,
        target: Target,
        avoid: Option<&str>,
    ) -> Result<ReplicaEndpoint, RoutingError> {
        let descriptor = self.resolver.resolve(partition).await?;
        if let Some(endpoint) = pick(&descriptor, target, avoid) {
            return Ok(endpoint);
        }

        self.resolver.invalidate(partition);
        let descriptor = self.resolver.resolve(partition).await?;
        pick(&descriptor, target, avoid).ok_or(match target {
            Target::Primary => RoutingError::NoPrimary { partition },
            Target::AnyReader => RoutingError::NoEndpoints { partition },
        })
    }
}

fn pick(
    descriptor: &PartitionDescriptor,
    target: Target,
    avoid: Option<&str>,
) -> Option<ReplicaEndpoint> {
    match target {
        Target::Primary => descriptor.primary().cloned(),
        Target::AnyReader => descriptor
            .read_endpoint(&mut rand::thread_rng(), avoid)
            .cloned(),
    }
}
