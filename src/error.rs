//! Error Taxonomy
//!
//! Classified failures for the routing path. Each layer has its own enum and the
//! gateway folds everything into [`RoutingError`], which decides what the caller
//! sees and whether a retry is worthwhile.
//!
//! - **Validation**: rejected before routing, never forwarded.
//! - **Resolution**: the naming collaborator could not produce a descriptor.
//! - **Stale route**: the chosen endpoint refused or vanished; retried once after invalidation.
//! - **Transient replica failure**: a replica transaction aborted or timed out.
//!
//! Duplicate inserts are not errors and never appear here.

use crate::catalog::protocol::ErrorResponse;
use crate::sharding::PartitionId;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Invalid deployment configuration. Reported at startup.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("partition count must be at least 1")]
    ZeroPartitions,
    #[error("the legacy partition scheme requires 26 partitions, got {0}")]
    LegacyPartitionCount(u32),
    #[error("invalid value {value:?} for {key}: {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },
    #[error("{0} must list at least one replica node")]
    NoReplicaNodes(String),
}

/// Rejected topology change on the naming registry.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NamingError {
    #[error("unknown partition {0}")]
    UnknownPartition(PartitionId),
    #[error("{address} is not a replica of partition {partition}")]
    UnknownEndpoint {
        partition: PartitionId,
        address: String,
    },
}

/// Failure raised by a transactional store implementation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TxError {
    #[error("transaction aborted: {0}")]
    Aborted(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Failure of a single ReplicaStore operation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("transaction on partition {partition} timed out")]
    Timeout { partition: PartitionId },
    #[error("transaction on partition {partition} failed: {source}")]
    Transaction {
        partition: PartitionId,
        source: TxError,
    },
}

/// Failure of a replica host request (the process serving one or more ReplicaStores).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ReplicaError {
    #[error("invalid record: {0}")]
    InvalidRecord(String),
    #[error("partition {0} is not served here")]
    UnknownPartition(PartitionId),
    #[error("{address} is not the primary for partition {partition}")]
    NotPrimary {
        partition: PartitionId,
        address: String,
    },
    #[error("partition {partition} could not be resolved: {reason}")]
    Resolution {
        partition: PartitionId,
        reason: String,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ReplicaError {
    pub fn status(&self) -> StatusCode {
        match self {
            ReplicaError::InvalidRecord(_) => StatusCode::BAD_REQUEST,
            ReplicaError::UnknownPartition(_) => StatusCode::NOT_FOUND,
            ReplicaError::NotPrimary { .. } => StatusCode::CONFLICT,
            ReplicaError::Resolution { .. } | ReplicaError::Store(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
        }
    }
}

/// Replica endpoints answer with plain text, errors included.
impl IntoResponse for ReplicaError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!("Replica request failed: {}", self);
        } else {
            tracing::debug!("Replica request rejected: {}", self);
        }
        (status, self.to_string()).into_response()
    }
}

/// Failure of one call from the gateway (or a replica) to a replica endpoint.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("endpoint {address} unreachable: {reason}")]
    Unreachable { address: String, reason: String },
    #[error("endpoint {address} is not the primary")]
    NotPrimary { address: String },
    #[error("call to {address} timed out")]
    Timeout { address: String },
    #[error("replica {address} failed the transaction: {reason}")]
    Transaction { address: String, reason: String },
    #[error("unexpected response from {address}: {reason}")]
    Protocol { address: String, reason: String },
}

impl TransportError {
    pub fn address(&self) -> &str {
        match self {
            TransportError::Unreachable { address, .. }
            | TransportError::NotPrimary { address }
            | TransportError::Timeout { address }
            | TransportError::Transaction { address, .. }
            | TransportError::Protocol { address, .. } => address,
        }
    }

    /// Whether invalidating the route and trying once more can help.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, TransportError::Protocol { .. })
    }
}

/// Everything the gateway can report to its caller.
#[derive(Debug, Error)]
pub enum RoutingError {
    #[error("invalid request: {0}")]
    Validation(String),
    #[error("partition {partition} could not be resolved: {reason}")]
    ResolutionFailed {
        partition: PartitionId,
        reason: String,
    },
    #[error("partition {partition} has no primary replica")]
    NoPrimary { partition: PartitionId },
    #[error("partition {partition} has no replicas")]
    NoEndpoints { partition: PartitionId },
    #[error("route to partition {partition} via {endpoint} failed: {reason}")]
    StaleRoute {
        partition: PartitionId,
        endpoint: String,
        reason: String,
    },
    #[error("call to partition {partition} via {endpoint} timed out")]
    Timeout {
        partition: PartitionId,
        endpoint: String,
    },
    #[error("replica {endpoint} for partition {partition} failed: {reason}")]
    ReplicaTransient {
        partition: PartitionId,
        endpoint: String,
        reason: String,
    },
    #[error("replica {endpoint} for partition {partition} returned an invalid response: {reason}")]
    Protocol {
        partition: PartitionId,
        endpoint: String,
        reason: String,
    },
    #[error("unknown partition {0}")]
    UnknownPartition(PartitionId),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl RoutingError {
    /// Classifies a transport failure against the partition it was routed for.
    pub fn from_transport(partition: PartitionId, error: TransportError) -> Self {
        match error {
            TransportError::Unreachable { address, reason } => RoutingError::StaleRoute {
                partition,
                endpoint: address,
                reason,
            },
            TransportError::NotPrimary { address } => RoutingError::StaleRoute {
                partition,
                endpoint: address,
                reason: "endpoint is no longer the primary".to_string(),
            },
            TransportError::Timeout { address } => RoutingError::Timeout {
                partition,
                endpoint: address,
            },
            TransportError::Transaction { address, reason } => RoutingError::ReplicaTransient {
                partition,
                endpoint: address,
                reason,
            },
            TransportError::Protocol { address, reason } => RoutingError::Protocol {
                partition,
                endpoint: address,
                reason,
            },
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            RoutingError::Validation(_) | RoutingError::UnknownPartition(_) => {
                StatusCode::BAD_REQUEST
            }
            RoutingError::ResolutionFailed { .. }
            | RoutingError::NoPrimary { .. }
            | RoutingError::NoEndpoints { .. }
            | RoutingError::ReplicaTransient { .. } => StatusCode::SERVICE_UNAVAILABLE,
            RoutingError::StaleRoute { .. } => StatusCode::BAD_GATEWAY,
            RoutingError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            RoutingError::Protocol { .. } | RoutingError::Config(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Whether the caller may resubmit. Writes are idempotent, so this holds for them too.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RoutingError::ResolutionFailed { .. }
                | RoutingError::NoPrimary { .. }
                | RoutingError::NoEndpoints { .. }
                | RoutingError::StaleRoute { .. }
                | RoutingError::Timeout { .. }
                | RoutingError::ReplicaTransient { .. }
        )
    }

    pub fn partition(&self) -> Option<PartitionId> {
        match self {
            RoutingError::ResolutionFailed { partition, .. }
            | RoutingError::NoPrimary { partition }
            | RoutingError::NoEndpoints { partition }
            | RoutingError::StaleRoute { partition, .. }
            | RoutingError::Timeout { partition, .. }
            | RoutingError::ReplicaTransient { partition, .. }
            | RoutingError::Protocol { partition, .. } => Some(*partition),
            RoutingError::UnknownPartition(partition) => Some(*partition),
            RoutingError::Validation(_) | RoutingError::Config(_) => None,
        }
    }

    pub fn endpoint(&self) -> Option<&str> {
        match self {
            RoutingError::StaleRoute { endpoint, .. }
            | RoutingError::Timeout { endpoint, .. }
            | RoutingError::ReplicaTransient { endpoint, .. }
            | RoutingError::Protocol { endpoint, .. } => Some(endpoint),
            _ => None,
        }
    }
}

impl IntoResponse for RoutingError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        } else {
            tracing::debug!("Request rejected: {}", self);
        }

        let body = ErrorResponse {
            error: self.to_string(),
            partition_id: self.partition(),
            endpoint: self.endpoint().map(str::to_string),
            retryable: self.is_retryable(),
        };

        (status, Json(body)).into_response()
    }
}
