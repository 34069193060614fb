use super::gateway::RoutingGateway;
use crate::catalog::StarRecord;
use crate::catalog::protocol::{StarInsertResult, StarQuery, StarsInfo, StatsResponse};
use crate::error::RoutingError;
use crate::sharding::PartitionId;

use axum::{
    Json,
    extract::{Extension, Path, Query},
};
use std::sync::Arc;

pub async fn handle_submit_star(
    Extension(gateway): Extension<Arc<RoutingGateway>>,
    Json(record): Json<StarRecord>,
) -> Result<Json<StarInsertResult>, RoutingError> {
    Ok(Json(gateway.submit(record).await?))
}

pub async fn handle_query_stars(
    Extension(gateway): Extension<Arc<RoutingGateway>>,
    Query(query): Query<StarQuery>,
) -> Result<Json<StarsInfo>, RoutingError> {
    let galaxy_name = query
        .galaxy_name
        .ok_or_else(|| RoutingError::Validation("galaxyName is required".to_string()))?;
    let info = gateway
        .query(&galaxy_name, query.star_name.as_deref())
        .await?;
    Ok(Json(info))
}

pub async fn handle_partition_stars(
    Extension(gateway): Extension<Arc<RoutingGateway>>,
    Path(partition): Path<u32>,
) -> Result<Json<StarsInfo>, RoutingError> {
    Ok(Json(
        gateway.partition_contents(PartitionId(partition)).await?,
    ))
}

pub async fn handle_stats(
    Extension(gateway): Extension<Arc<RoutingGateway>>,
) -> Json<StatsResponse> {
    Json(gateway.stats())
}
