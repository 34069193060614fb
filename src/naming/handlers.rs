use super::service::TopologyRegistry;
use super::types::PartitionDescriptor;
use crate::catalog::protocol::{ErrorResponse, PromoteRequest};
use crate::error::NamingError;
use crate::sharding::PartitionId;

use axum::response::{IntoResponse, Response};
use axum::{
    Json,
    extract::{Extension, Path},
    http::StatusCode,
};
use std::sync::Arc;

pub async fn handle_list_partitions(
    Extension(registry): Extension<Arc<TopologyRegistry>>,
) -> Json<Vec<PartitionDescriptor>> {
    Json(registry.snapshot())
}

pub async fn handle_get_partition(
    Extension(registry): Extension<Arc<TopologyRegistry>>,
    Path(partition): Path<u32>,
) -> (StatusCode, Json<Option<PartitionDescriptor>>) {
    match registry.descriptor(PartitionId(partition)) {
        Some(descriptor) => (StatusCode::OK, Json(Some(descriptor))),
        None => {
            tracing::debug!("Lookup for unknown partition {}", partition);
            (StatusCode::NOT_FOUND, Json(None))
        }
    }
}

pub async fn handle_promote(
    Extension(registry): Extension<Arc<TopologyRegistry>>,
    Path(partition): Path<u32>,
    Json(req): Json<PromoteRequest>,
) -> Response {
    match registry.promote(PartitionId(partition), &req.address) {
        Ok(descriptor) => (StatusCode::OK, Json(descriptor)).into_response(),
        Err(e) => {
            tracing::warn!("Rejected promotion on partition {}: {}", partition, e);
            let status = match e {
                NamingError::UnknownPartition(_) => StatusCode::NOT_FOUND,
                NamingError::UnknownEndpoint { .. } => StatusCode::BAD_REQUEST,
            };
            (
                status,
                Json(ErrorResponse {
                    error: e.to_string(),
                    partition_id: Some(PartitionId(partition)),
                    endpoint: Some(req.address),
                    retryable: false,
                }),
            )
                .into_response()
        }
    }
}
