//! Naming Service
//!
//! The collaborator the resolver asks "who serves partition N right now?".
//! `TopologyRegistry` is the authoritative table, held in memory by the naming
//! node (or by a standalone process); [`super::client::HttpNamingClient`] reaches
//! a remote registry over HTTP. Both implement [`NamingService`].

use super::types::{PartitionDescriptor, ReplicaEndpoint, ReplicaRole};
use crate::error::NamingError;
use crate::sharding::{PartitionId, PartitionMap};

use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;

/// Source of partition descriptors.
#[async_trait]
pub trait NamingService: Send + Sync {
    /// Current descriptor for `partition`, or `None` if the partition is unknown.
    async fn lookup(&self, partition: PartitionId) -> Result<Option<PartitionDescriptor>>;
}

/// Authoritative partition → replica group table.
pub struct TopologyRegistry {
    map: PartitionMap,
    partitions: DashMap<PartitionId, PartitionDescriptor>,
}

impl TopologyRegistry {
    pub fn new(map: PartitionMap) -> Arc<Self> {
        Arc::new(Self {
            map,
            partitions: DashMap::new(),
        })
    }

    /// Spreads every partition over `nodes`: the primary of partition `p` lives on
    /// `nodes[p % len]`, its secondaries on the nodes that follow it.
    ///
    /// `replicas_per_partition` is capped by the node count and raised to at least 1.
    pub fn round_robin(
        map: PartitionMap,
        nodes: &[String],
        replicas_per_partition: usize,
    ) -> Arc<Self> {
        let registry = Self::new(map);
        if nodes.is_empty() {
            tracing::warn!("No replica nodes configured, topology is empty");
            return registry;
        }

        let replicas = replicas_per_partition.clamp(1, nodes.len());
        for partition in map.partitions() {
            let primary_idx = partition.0 as usize % nodes.len();
            let endpoints = (0..replicas)
                .map(|offset| {
                    let address = nodes[(primary_idx + offset) % nodes.len()].clone();
                    if offset == 0 {
                        ReplicaEndpoint::primary(address)
                    } else {
                        ReplicaEndpoint::secondary(address)
                    }
                })
                .collect();

            registry.partitions.insert(
                partition,
                PartitionDescriptor {
                    partition_id: partition,
                    key_range: map.key_range(partition),
                    endpoints,
                    topology_version: 1,
                },
            );
        }

        tracing::info!(
            "Placed {} partitions on {} nodes ({} replicas each)",
            map.partition_count(),
            nodes.len(),
            replicas
        );
        registry
    }

    pub fn partition_map(&self) -> PartitionMap {
        self.map
    }

    pub fn descriptor(&self, partition: PartitionId) -> Option<PartitionDescriptor> {
        self.partitions
            .get(&partition)
            .map(|entry| entry.value().clone())
    }

    /// All descriptors, ordered by partition.
    pub fn snapshot(&self) -> Vec<PartitionDescriptor> {
        let mut descriptors: Vec<PartitionDescriptor> = self
            .partitions
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        descriptors.sort_by_key(|descriptor| descriptor.partition_id);
        descriptors
    }

    /// Stores `descriptor` unless the registry already holds a newer version.
    pub fn register(&self, descriptor: PartitionDescriptor) -> bool {
        let partition = descriptor.partition_id;
        match self.partitions.get_mut(&partition) {
            Some(mut existing) => {
                if descriptor.topology_version <= existing.topology_version {
                    tracing::debug!(
                        "Ignoring descriptor v{} for partition {} (have v{})",
                        descriptor.topology_version,
                        partition,
                        existing.topology_version
                    );
                    return false;
                }
                *existing = descriptor;
            }
            None => {
                self.partitions.insert(partition, descriptor);
            }
        }
        true
    }

    /// Makes `address` the primary of `partition`, demoting the previous primary.
    pub fn promote(
        &self,
        partition: PartitionId,
        address: &str,
    ) -> Result<PartitionDescriptor, NamingError> {
        let mut entry = self
            .partitions
            .get_mut(&partition)
            .ok_or(NamingError::UnknownPartition(partition))?;
        let descriptor = entry.value_mut();

        match descriptor.role_of(address) {
            None => {
                return Err(NamingError::UnknownEndpoint {
                    partition,
                    address: address.to_string(),
                });
            }
            Some(ReplicaRole::Primary) => return Ok(descriptor.clone()),
            Some(ReplicaRole::Secondary) => {}
        }

        for endpoint in descriptor.endpoints.iter_mut() {
            endpoint.role = if endpoint.address == address {
                ReplicaRole::Primary
            } else {
                ReplicaRole::Secondary
            };
        }
        descriptor.topology_version += 1;

        tracing::info!(
            "Partition {} primary moved to {} (v{})",
            partition,
            address,
            descriptor.topology_version
        );
        Ok(descriptor.clone())
    }

    /// Drops `address` from the replica group of `partition`.
    ///
    /// Removing the primary leaves the group without one until a secondary is promoted.
    pub fn remove_endpoint(
        &self,
        partition: PartitionId,
        address: &str,
    ) -> Result<PartitionDescriptor, NamingError> {
        let mut entry = self
            .partitions
            .get_mut(&partition)
            .ok_or(NamingError::UnknownPartition(partition))?;
        let descriptor = entry.value_mut();

        let before = descriptor.endpoints.len();
        descriptor
            .endpoints
            .retain(|endpoint| endpoint.address != address);
        if descriptor.endpoints.len() == before {
            return Err(NamingError::UnknownEndpoint {
                partition,
                address: address.to_string(),
            });
        }
        descriptor.topology_version += 1;

        tracing::info!(
            "Removed {} from partition {} (v{})",
            address,
            partition,
            descriptor.topology_version
        );
        Ok(descriptor.clone())
    }
}

#[async_trait]
impl NamingService for TopologyRegistry {
    async fn lookup(&self, partition: PartitionId) -> Result<Option<PartitionDescriptor>> {
        Ok(self.descriptor(partition))
    }
}
