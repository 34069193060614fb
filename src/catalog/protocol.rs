//! Catalog Network Protocol
//!
//! Endpoint paths and Data Transfer Objects exchanged between clients, the routing
//! gateway, replica hosts and the naming service. Everything travels as JSON with
//! camelCase field names.

use super::types::StarRecord;
use crate::naming::types::ReplicaRole;
use crate::sharding::PartitionId;

use serde::{Deserialize, Serialize};

// --- Gateway (public) endpoints ---

/// Write a star (`POST`) or read a galaxy / a single star (`GET ?galaxyName=&starName=`).
pub const ENDPOINT_STARS: &str = "/api/stars";
/// Read every star stored in one partition.
pub const ROUTE_PARTITION_STARS: &str = "/api/partitions/:partition/stars";
/// Per-partition insert tally.
pub const ENDPOINT_STATS: &str = "/api/stats";
/// Liveness probe, served by every node.
pub const ENDPOINT_HEALTH: &str = "/health";

// --- Replica (internal) endpoints ---

/// Prefix of the per-partition replica endpoints.
pub const ENDPOINT_REPLICAS: &str = "/replicas";
/// `GET` dumps the partition, `POST` adds a star.
pub const ROUTE_REPLICA_PARTITION: &str = "/replicas/:partition";
/// `GET` every star of one galaxy.
pub const ROUTE_REPLICA_GALAXY: &str = "/replicas/:partition/galaxies/:galaxy";
/// `GET` one star by name.
pub const ROUTE_REPLICA_STAR: &str = "/replicas/:partition/galaxies/:galaxy/stars/:star";
/// Prefix of the primary → secondary push endpoint.
pub const ENDPOINT_REPLICATE: &str = "/internal/replicate";
pub const ROUTE_REPLICATE: &str = "/internal/replicate/:partition";

// --- Naming endpoints ---

pub const ENDPOINT_NAMING_PARTITIONS: &str = "/naming/partitions";
pub const ROUTE_NAMING_PARTITION: &str = "/naming/partitions/:partition";
pub const ROUTE_NAMING_PROMOTE: &str = "/naming/partitions/:partition/promote";

// --- Data Transfer Objects ---

/// Response to a routed write.
///
/// `partition_key` is the signed partition key rendered as a decimal string.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StarInsertResult {
    /// Outcome text produced by the replica ("Star S_1 successfully added").
    pub result: String,
    pub partition_key: String,
    /// The galaxy name that was hashed.
    pub input_value: String,
    pub service_partition_id: String,
    pub service_replica_address: String,
    pub inserted: bool,
}

/// Response to a routed read.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StarsInfo {
    pub partition_id: PartitionId,
    pub endpoint_role: ReplicaRole,
    pub endpoint_address: String,
    pub stars: Vec<StarRecord>,
}

/// Query string of `GET /api/stars`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StarQuery {
    pub galaxy_name: Option<String>,
    pub star_name: Option<String>,
}

/// Primary → secondary push of one committed record.
///
/// `op_id` lets the secondary drop duplicate deliveries caused by retries.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ReplicateRequest {
    pub op_id: String,
    pub composite_key: String,
    pub record: StarRecord,
}

/// Acknowledgment of a replicated record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReplicateResponse {
    /// `false` when the record was already present (or the op was a duplicate).
    pub applied: bool,
}

/// Body of `POST /naming/partitions/:partition/promote`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromoteRequest {
    pub address: String,
}

/// Error body returned by every node.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partition_id: Option<PartitionId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    pub retryable: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PartitionCount {
    pub partition_id: PartitionId,
    pub inserted: u64,
}

/// Body of `GET /api/stats`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    pub total_inserted: u64,
    pub partitions: Vec<PartitionCount>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub role: String,
}
