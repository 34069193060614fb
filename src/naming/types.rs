use crate::sharding::{KeyRange, PartitionId};

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Role of a replica within its partition's replica group.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ReplicaRole {
    /// Accepts writes. At most one per partition.
    Primary,
    /// Serves reads only.
    Secondary,
}

impl fmt::Display for ReplicaRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReplicaRole::Primary => f.write_str("Primary"),
            ReplicaRole::Secondary => f.write_str("Secondary"),
        }
    }
}

/// A replica's base URL and its current role.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReplicaEndpoint {
    pub address: String,
    pub role: ReplicaRole,
}

impl ReplicaEndpoint {
    pub fn primary(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            role: ReplicaRole::Primary,
        }
    }

    pub fn secondary(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            role: ReplicaRole::Secondary,
        }
    }
}

/// Routing metadata for one partition, as published by the naming service.
///
/// Ephemeral on the client side: cached by the resolver and rebuilt after an
/// invalidation. `topology_version` only ever grows, so a cache can always keep
/// the newer of two descriptors.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PartitionDescriptor {
    pub partition_id: PartitionId,
    pub key_range: KeyRange,
    pub endpoints: Vec<ReplicaEndpoint>,
    pub topology_version: u64,
}

impl PartitionDescriptor {
    /// The writable replica, if the group currently has one.
    pub fn primary(&self) -> Option<&ReplicaEndpoint> {
        self.endpoints
            .iter()
            .find(|endpoint| endpoint.role == ReplicaRole::Primary)
    }

    pub fn secondaries(&self) -> impl Iterator<Item = &ReplicaEndpoint> {
        self.endpoints
            .iter()
            .filter(|endpoint| endpoint.role == ReplicaRole::Secondary)
    }

    pub fn role_of(&self, address: &str) -> Option<ReplicaRole> {
        self.endpoints
            .iter()
            .find(|endpoint| endpoint.address == address)
            .map(|endpoint| endpoint.role)
    }

    /// Picks a replica for a read: a uniformly random secondary other than
    /// `avoid`, or the primary when no such secondary is left.
    pub fn read_endpoint<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        avoid: Option<&str>,
    ) -> Option<&ReplicaEndpoint> {
        let secondaries: Vec<&ReplicaEndpoint> = self
            .secondaries()
            .filter(|endpoint| Some(endpoint.address.as_str()) != avoid)
            .collect();
        if secondaries.is_empty() {
            return self.primary();
        }
        let idx = rng.gen_range(0..secondaries.len());
        Some(secondaries[idx])
    }
}
