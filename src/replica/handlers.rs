use super::host::ReplicaHost;
use crate::catalog::StarRecord;
use crate::catalog::protocol::{ReplicateRequest, ReplicateResponse};
use crate::error::ReplicaError;
use crate::sharding::PartitionId;

use axum::{
    Json,
    extract::{Extension, Path},
    http::StatusCode,
};
use std::sync::Arc;

pub async fn handle_dump_partition(
    Extension(host): Extension<Arc<ReplicaHost>>,
    Path(partition): Path<u32>,
) -> Result<Json<Vec<StarRecord>>, ReplicaError> {
    Ok(Json(host.dump(PartitionId(partition)).await?))
}

/// `201` with the outcome text when inserted, `200` when the star already existed.
pub async fn handle_add_star(
    Extension(host): Extension<Arc<ReplicaHost>>,
    Path(partition): Path<u32>,
    Json(record): Json<StarRecord>,
) -> Result<(StatusCode, String), ReplicaError> {
    let outcome = host.add_star(PartitionId(partition), record).await?;
    let status = if outcome.inserted {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, outcome.message))
}

pub async fn handle_get_galaxy(
    Extension(host): Extension<Arc<ReplicaHost>>,
    Path((partition, galaxy)): Path<(u32, String)>,
) -> Result<Json<Vec<StarRecord>>, ReplicaError> {
    Ok(Json(host.get_all(PartitionId(partition), &galaxy).await?))
}

pub async fn handle_get_star(
    Extension(host): Extension<Arc<ReplicaHost>>,
    Path((partition, galaxy, star)): Path<(u32, String, String)>,
) -> Result<Json<Vec<StarRecord>>, ReplicaError> {
    let found = host.get_one(PartitionId(partition), &galaxy, &star).await?;
    Ok(Json(found.into_iter().collect()))
}

pub async fn handle_replicate(
    Extension(host): Extension<Arc<ReplicaHost>>,
    Path(partition): Path<u32>,
    Json(req): Json<ReplicateRequest>,
) -> Result<Json<ReplicateResponse>, ReplicaError> {
    let applied = host.apply_replica(PartitionId(partition), req).await?;
    if applied {
        tracing::debug!("Applied replicated record on partition {}", partition);
    }
    Ok(Json(ReplicateResponse { applied }))
}
