use axum::Json;
use axum::{
    Router,
    extract::Extension,
    routing::{get, post},
};
use galaxy_catalog::catalog::protocol::*;
use galaxy_catalog::config::{Config, NodeMode};
use galaxy_catalog::naming::handlers::{
    handle_get_partition, handle_list_partitions, handle_promote,
};
use galaxy_catalog::naming::{HttpNamingClient, NamingService, TopologyRegistry};
use galaxy_catalog::replica::ReplicaHost;
use galaxy_catalog::replica::handlers::{
    handle_add_star, handle_dump_partition, handle_get_galaxy, handle_get_star, handle_replicate,
};
use galaxy_catalog::routing::handlers::{
    handle_partition_stars, handle_query_stars, handle_stats, handle_submit_star,
};
use galaxy_catalog::routing::{
    HttpReplicaTransport, LocalTransport, PartitionResolver, ReplicaTransport, RoutingGateway,
};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .init();

    let map = config.partition_map()?;
    tracing::info!(
        "Starting {} node on {} ({:?} scheme, {} partitions)",
        config.mode.as_str(),
        config.bind_addr,
        map.scheme(),
        map.partition_count()
    );

    let app = match config.mode {
        NodeMode::Naming => {
            let registry =
                TopologyRegistry::round_robin(map, &config.replica_nodes, config.replicas_per_partition);
            naming_routes(registry)
        }
        NodeMode::Replica => {
            let naming: Arc<dyn NamingService> =
                Arc::new(HttpNamingClient::new(&config.naming_url, config.resolve_timeout));
            let resolver = Arc::new(PartitionResolver::new(
                naming,
                config.resolve_timeout,
                config.resolve_attempts,
            ));
            let transport: Arc<dyn ReplicaTransport> =
                Arc::new(HttpReplicaTransport::new(config.replica_timeout));

            let host = ReplicaHost::new(
                &config.advertise_url,
                map,
                resolver,
                transport,
                config.commit_timeout,
            );
            tracing::info!("Serving replicas as {}", host.address());

            host.spawn_anti_entropy(config.anti_entropy_interval);
            spawn_replica_stats(vec![host.clone()], &config);
            replica_routes(host)
        }
        NodeMode::Gateway => {
            let naming: Arc<dyn NamingService> =
                Arc::new(HttpNamingClient::new(&config.naming_url, config.resolve_timeout));
            let resolver = Arc::new(PartitionResolver::new(
                naming,
                config.resolve_timeout,
                config.resolve_attempts,
            ));
            let transport: Arc<dyn ReplicaTransport> =
                Arc::new(HttpReplicaTransport::new(config.replica_timeout));

            let gateway = Arc::new(RoutingGateway::new(map, resolver, transport));
            spawn_gateway_stats(gateway.clone(), &config);
            gateway_routes(gateway)
        }
        NodeMode::Standalone => {
            let registry =
                TopologyRegistry::round_robin(map, &config.replica_nodes, config.replicas_per_partition);
            let naming: Arc<dyn NamingService> = registry.clone();
            let resolver = Arc::new(PartitionResolver::new(
                naming,
                config.resolve_timeout,
                config.resolve_attempts,
            ));
            let local = LocalTransport::new(config.replica_timeout);
            let transport: Arc<dyn ReplicaTransport> = local.clone();

            let mut hosts = Vec::new();
            for address in &config.replica_nodes {
                let host = ReplicaHost::new(
                    address,
                    map,
                    resolver.clone(),
                    transport.clone(),
                    config.commit_timeout,
                );
                local.register(&host);
                host.spawn_anti_entropy(config.anti_entropy_interval);
                hosts.push(host);
            }
            tracing::info!("Started {} in-process replica hosts", hosts.len());
            spawn_replica_stats(hosts, &config);

            let gateway = Arc::new(RoutingGateway::new(map, resolver, transport));
            spawn_gateway_stats(gateway.clone(), &config);
            gateway_routes(gateway).merge(naming_routes(registry))
        }
    };

    let role = config.mode.as_str();
    let app = app.route(
        ENDPOINT_HEALTH,
        get(move || async move {
            Json(HealthResponse {
                status: "ok".to_string(),
                role: role.to_string(),
            })
        }),
    );

    tracing::info!("HTTP server listening on {}", config.bind_addr);
    tracing::info!("Press Ctrl+C to shutdown");

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn naming_routes(registry: Arc<TopologyRegistry>) -> Router {
    Router::new()
        .route(ENDPOINT_NAMING_PARTITIONS, get(handle_list_partitions))
        .route(ROUTE_NAMING_PARTITION, get(handle_get_partition))
        .route(ROUTE_NAMING_PROMOTE, post(handle_promote))
        .layer(Extension(registry))
}

fn replica_routes(host: Arc<ReplicaHost>) -> Router {
    Router::new()
        .route(
            ROUTE_REPLICA_PARTITION,
            get(handle_dump_partition).post(handle_add_star),
        )
        .route(ROUTE_REPLICA_GALAXY, get(handle_get_galaxy))
        .route(ROUTE_REPLICA_STAR, get(handle_get_star))
        .route(ROUTE_REPLICATE, post(handle_replicate))
        .layer(Extension(host))
}

fn gateway_routes(gateway: Arc<RoutingGateway>) -> Router {
    Router::new()
        .route(
            ENDPOINT_STARS,
            get(handle_query_stars).post(handle_submit_star),
        )
        .route(ROUTE_PARTITION_STARS, get(handle_partition_stars))
        .route(ENDPOINT_STATS, get(handle_stats))
        .layer(Extension(gateway))
}

fn spawn_gateway_stats(gateway: Arc<RoutingGateway>, config: &Config) {
    let every = config.stats_interval;
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);

        loop {
            interval.tick().await;
            let stats = gateway.stats();
            if stats.total_inserted == 0 {
                continue;
            }
            tracing::info!("Inserted {} stars so far", stats.total_inserted);
            for count in stats.partitions {
                tracing::info!("  - partition {}: {}", count.partition_id, count.inserted);
            }
        }
    });
}

fn spawn_replica_stats(hosts: Vec<Arc<ReplicaHost>>, config: &Config) {
    let every = config.stats_interval;
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);

        loop {
            interval.tick().await;
            for host in &hosts {
                let (partitions, records) = host.local_stats().await;
                tracing::info!(
                    "Replica {}: {} active partitions, {} records",
                    host.address(),
                    partitions,
                    records
                );
            }
        }
    });
}
