//! Routing Module Tests
//!
//! ## Test Scopes
//! - **Resolver**: caching, invalidation, coalesced misses, bounded retries.
//! - **Gateway**: write/read routing, validation, stale-route recovery, failover, tally.
//! - **HTTP**: one replica host served over a real socket and reached through reqwest.
//!
//! Cluster tests run replica hosts in-process behind `LocalTransport`.

#[cfg(test)]
mod tests {
    use crate::catalog::protocol::{
        ROUTE_REPLICA_GALAXY, ROUTE_REPLICA_PARTITION, ROUTE_REPLICA_STAR, ROUTE_REPLICATE,
        ReplicateRequest, StarQuery,
    };
    use crate::catalog::{InsertOutcome, StarRecord};
    use crate::error::{RoutingError, TransportError};
    use crate::naming::{NamingService, PartitionDescriptor, ReplicaRole, TopologyRegistry};
    use crate::replica::ReplicaHost;
    use crate::replica::handlers::{
        handle_add_star, handle_dump_partition, handle_get_galaxy, handle_get_star,
        handle_replicate,
    };
    use crate::routing::handlers::handle_query_stars;
    use crate::routing::{
        HttpReplicaTransport, LocalTransport, PartitionResolver, ReplicaTransport, RoutingGateway,
    };
    use crate::sharding::{PartitionId, PartitionMap};

    use async_trait::async_trait;
    use axum::extract::{Extension, Query};
    use axum::http::StatusCode;
    use axum::routing::{get, post};
    use axum::Router;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    // "Andromeda" hashes to partition 2 of 26; with three nodes its primary is replica-3.
    const ANDROMEDA_PARTITION: PartitionId = PartitionId(2);
    const ANDROMEDA_PRIMARY: &str = "local://replica-3";

    // ============================================================
    // TEST DOUBLES
    // ============================================================

    /// Naming service that fails its first `failures` lookups and counts every call.
    struct ScriptedNaming {
        registry: Arc<TopologyRegistry>,
        failures: AtomicUsize,
        delay: Duration,
        lookups: AtomicUsize,
    }

    impl ScriptedNaming {
        fn new(failures: usize, delay: Duration) -> Arc<Self> {
            let map = PartitionMap::hash_modulo(4).unwrap();
            let nodes = vec!["local://a".to_string(), "local://b".to_string()];
            Arc::new(Self {
                registry: TopologyRegistry::round_robin(map, &nodes, 2),
                failures: AtomicUsize::new(failures),
                delay,
                lookups: AtomicUsize::new(0),
            })
        }

        fn lookups(&self) -> usize {
            self.lookups.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl NamingService for ScriptedNaming {
        async fn lookup(&self, partition: PartitionId) -> anyhow::Result<Option<PartitionDescriptor>> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            let remaining = self.failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures.store(remaining - 1, Ordering::SeqCst);
                return Err(anyhow::anyhow!("naming node restarting"));
            }
            self.registry.lookup(partition).await
        }
    }

    fn resolver_over(naming: Arc<ScriptedNaming>, timeout: Duration, attempts: usize) -> PartitionResolver {
        let naming: Arc<dyn NamingService> = naming;
        PartitionResolver::new(naming, timeout, attempts)
    }

    /// Transport that answers every call with a scripted sequence of failures, then succeeds.
    struct FlakyTransport {
        failures: std::sync::Mutex<Vec<TransportError>>,
        calls: AtomicUsize,
    }

    impl FlakyTransport {
        fn new(failures: Vec<TransportError>) -> Arc<Self> {
            Arc::new(Self {
                failures: std::sync::Mutex::new(failures),
                calls: AtomicUsize::new(0),
            })
        }

        fn next(&self) -> Result<(), TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut failures = self.failures.lock().unwrap();
            if failures.is_empty() {
                Ok(())
            } else {
                Err(failures.remove(0))
            }
        }
    }

    #[async_trait]
    impl ReplicaTransport for FlakyTransport {
        async fn add_star(
            &self,
            _address: &str,
            _partition: PartitionId,
            record: &StarRecord,
        ) -> Result<InsertOutcome, TransportError> {
            self.next()?;
            Ok(InsertOutcome::for_star(&record.star_name, true))
        }

        async fn get_galaxy(
            &self,
            _address: &str,
            _partition: PartitionId,
            _galaxy_name: &str,
        ) -> Result<Vec<StarRecord>, TransportError> {
            self.next()?;
            Ok(Vec::new())
        }

        async fn get_star(
            &self,
            _address: &str,
            _partition: PartitionId,
            _galaxy_name: &str,
            _star_name: &str,
        ) -> Result<Vec<StarRecord>, TransportError> {
            self.next()?;
            Ok(Vec::new())
        }

        async fn get_partition(
            &self,
            _address: &str,
            _partition: PartitionId,
        ) -> Result<Vec<StarRecord>, TransportError> {
            self.next()?;
            Ok(Vec::new())
        }

        async fn replicate(
            &self,
            _address: &str,
            _partition: PartitionId,
            _request: &ReplicateRequest,
        ) -> Result<bool, TransportError> {
            self.next()?;
            Ok(true)
        }
    }

    /// Naming registry, three replica hosts behind `LocalTransport`, and a gateway.
    ///
    /// Every host and the gateway have their own resolver cache, as separate
    /// processes would.
    struct Cluster {
        registry: Arc<TopologyRegistry>,
        transport: Arc<LocalTransport>,
        hosts: Vec<Arc<ReplicaHost>>,
        gateway: RoutingGateway,
    }

    impl Cluster {
        fn new(replicas_per_partition: usize) -> Self {
            let map = PartitionMap::hash_modulo(26).unwrap();
            let addresses: Vec<String> = (1..=3).map(|i| format!("local://replica-{}", i)).collect();
            let registry = TopologyRegistry::round_robin(map, &addresses, replicas_per_partition);
            let transport = LocalTransport::new(Duration::from_secs(2));
            let dyn_transport: Arc<dyn ReplicaTransport> = transport.clone();

            let hosts = addresses
                .iter()
                .map(|address| {
                    let host = ReplicaHost::new(
                        address,
                        map,
                        Self::resolver(&registry),
                        dyn_transport.clone(),
                        Duration::from_secs(2),
                    );
                    transport.register(&host);
                    host
                })
                .collect();

            let gateway = RoutingGateway::new(map, Self::resolver(&registry), dyn_transport);
            Self {
                registry,
                transport,
                hosts,
                gateway,
            }
        }

        fn resolver(registry: &Arc<TopologyRegistry>) -> Arc<PartitionResolver> {
            let naming: Arc<dyn NamingService> = registry.clone();
            Arc::new(PartitionResolver::new(naming, Duration::from_millis(200), 2))
        }

        fn host(&self, address: &str) -> Arc<ReplicaHost> {
            self.hosts
                .iter()
                .find(|host| host.address() == address)
                .unwrap()
                .clone()
        }

        /// Waits until every primary has pushed its writes to the secondaries.
        async fn settle(&self) {
            for host in &self.hosts {
                host.flush_replication().await;
            }
        }
    }

    fn flaky_gateway(transport: Arc<FlakyTransport>) -> RoutingGateway {
        let map = PartitionMap::hash_modulo(26).unwrap();
        let nodes = vec!["local://a".to_string(), "local://b".to_string()];
        let naming: Arc<dyn NamingService> = TopologyRegistry::round_robin(map, &nodes, 2);
        let resolver = Arc::new(PartitionResolver::new(naming, Duration::from_millis(200), 2));
        RoutingGateway::new(map, resolver, transport)
    }

    // ============================================================
    // RESOLVER TESTS
    // ============================================================

    #[tokio::test]
    async fn test_resolve_caches_until_invalidated() {
        let naming = ScriptedNaming::new(0, Duration::ZERO);
        let resolver = resolver_over(naming.clone(), Duration::from_millis(200), 3);

        let first = resolver.resolve(PartitionId(1)).await.unwrap();
        let second = resolver.resolve(PartitionId(1)).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(naming.lookups(), 1);
        assert!(resolver.cached(PartitionId(1)).is_some());

        resolver.invalidate(PartitionId(1));
        assert!(resolver.cached(PartitionId(1)).is_none());
        resolver.resolve(PartitionId(1)).await.unwrap();
        assert_eq!(naming.lookups(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_misses_share_one_lookup() {
        let naming = ScriptedNaming::new(0, Duration::from_millis(50));
        let resolver = Arc::new(resolver_over(naming.clone(), Duration::from_millis(500), 3));

        let mut tasks = tokio::task::JoinSet::new();
        for _ in 0..10 {
            let resolver = resolver.clone();
            tasks.spawn(async move { resolver.resolve(PartitionId(3)).await.unwrap() });
        }
        while let Some(result) = tasks.join_next().await {
            assert_eq!(result.unwrap().partition_id, PartitionId(3));
        }

        assert_eq!(naming.lookups(), 1);
    }

    #[tokio::test]
    async fn test_resolve_retries_transient_failures() {
        let naming = ScriptedNaming::new(2, Duration::ZERO);
        let resolver = resolver_over(naming.clone(), Duration::from_millis(200), 3);

        let descriptor = resolver.resolve(PartitionId(0)).await.unwrap();
        assert_eq!(descriptor.partition_id, PartitionId(0));
        assert_eq!(naming.lookups(), 3);
    }

    #[tokio::test]
    async fn test_resolve_gives_up_after_bounded_attempts() {
        let naming = ScriptedNaming::new(10, Duration::ZERO);
        let resolver = resolver_over(naming.clone(), Duration::from_millis(200), 2);

        let err = resolver.resolve(PartitionId(0)).await.unwrap_err();
        assert!(matches!(err, RoutingError::ResolutionFailed { .. }));
        assert!(err.is_retryable());
        assert_eq!(naming.lookups(), 2);
        assert!(resolver.cached(PartitionId(0)).is_none());
    }

    #[tokio::test]
    async fn test_resolve_times_out_slow_naming() {
        let naming = ScriptedNaming::new(0, Duration::from_millis(500));
        let resolver = resolver_over(naming, Duration::from_millis(20), 1);

        let err = resolver.resolve(PartitionId(0)).await.unwrap_err();
        assert!(err.to_string().contains("timed out"), "got: {}", err);
    }

    #[tokio::test]
    async fn test_unknown_partition_is_not_retried() {
        let naming = ScriptedNaming::new(0, Duration::ZERO);
        let resolver = resolver_over(naming.clone(), Duration::from_millis(200), 3);

        let err = resolver.resolve(PartitionId(40)).await.unwrap_err();
        assert!(matches!(err, RoutingError::ResolutionFailed { .. }));
        assert_eq!(naming.lookups(), 1);
    }

    // ============================================================
    // GATEWAY TESTS
    // ============================================================

    #[tokio::test]
    async fn test_submit_reports_partition_and_outcome() {
        let cluster = Cluster::new(3);

        let result = cluster
            .gateway
            .submit(StarRecord::new("Andromeda", "S_1"))
            .await
            .unwrap();
        assert_eq!(result.result, "Star S_1 successfully added");
        assert_eq!(result.partition_key, "-1027690160980010474");
        assert_eq!(result.input_value, "Andromeda");
        assert_eq!(result.service_partition_id, "2");
        assert_eq!(result.service_replica_address, ANDROMEDA_PRIMARY);
        assert!(result.inserted);

        let again = cluster
            .gateway
            .submit(StarRecord::new("Andromeda", "S_1"))
            .await
            .unwrap();
        assert!(!again.inserted);
        assert_eq!(again.result, "Star S_1 already exists");

        let stats = cluster.gateway.stats();
        assert_eq!(stats.total_inserted, 1);
        assert_eq!(stats.partitions.len(), 1);
        assert_eq!(stats.partitions[0].partition_id, ANDROMEDA_PARTITION);
    }

    #[tokio::test]
    async fn test_reads_go_to_secondaries() {
        let cluster = Cluster::new(3);
        cluster
            .gateway
            .submit(StarRecord::new("Andromeda", "S_1"))
            .await
            .unwrap();
        cluster
            .gateway
            .submit(StarRecord::new("Andromeda", "S_2"))
            .await
            .unwrap();
        cluster.settle().await;

        let info = cluster.gateway.query("Andromeda", None).await.unwrap();
        assert_eq!(info.partition_id, ANDROMEDA_PARTITION);
        assert_eq!(info.endpoint_role, ReplicaRole::Secondary);
        assert_ne!(info.endpoint_address, ANDROMEDA_PRIMARY);
        assert_eq!(info.stars.len(), 2);

        let one = cluster
            .gateway
            .query("Andromeda", Some("s_2"))
            .await
            .unwrap();
        assert_eq!(one.stars.len(), 1);
        assert_eq!(one.stars[0].star_name, "S_2");

        let blank = cluster.gateway.query("Andromeda", Some("")).await.unwrap();
        assert_eq!(blank.stars.len(), 2, "An empty star name reads the whole galaxy");
    }

    #[tokio::test]
    async fn test_reads_fall_back_to_primary() {
        let cluster = Cluster::new(1);
        cluster
            .gateway
            .submit(StarRecord::new("Andromeda", "S_1"))
            .await
            .unwrap();

        let info = cluster.gateway.query("Andromeda", None).await.unwrap();
        assert_eq!(info.endpoint_role, ReplicaRole::Primary);
        assert_eq!(info.endpoint_address, ANDROMEDA_PRIMARY);
        assert_eq!(info.stars.len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_galaxy_reads_empty() {
        let cluster = Cluster::new(3);
        let info = cluster.gateway.query("Zeta", None).await.unwrap();
        assert_eq!(info.partition_id, PartitionId(1));
        assert!(info.stars.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_requests_are_not_forwarded() {
        let transport = FlakyTransport::new(vec![]);
        let gateway = flaky_gateway(transport.clone());

        let err = gateway.submit(StarRecord::new("", "S_1")).await.unwrap_err();
        assert!(matches!(err, RoutingError::Validation(_)));
        let err = gateway.submit(StarRecord::new("Andromeda", "")).await.unwrap_err();
        assert!(matches!(err, RoutingError::Validation(_)));
        let err = gateway.query("", None).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);

        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried_once() {
        let transport = FlakyTransport::new(vec![TransportError::Transaction {
            address: "local://b".to_string(),
            reason: "commit timed out".to_string(),
        }]);
        let gateway = flaky_gateway(transport.clone());

        let result = gateway
            .submit(StarRecord::new("Andromeda", "S_1"))
            .await
            .unwrap();
        assert!(result.inserted);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_second_failure_surfaces_with_endpoint() {
        let timeout = |address: &str| TransportError::Timeout {
            address: address.to_string(),
        };
        let transport = FlakyTransport::new(vec![timeout("local://a"), timeout("local://a")]);
        let gateway = flaky_gateway(transport.clone());

        let err = gateway
            .submit(StarRecord::new("Andromeda", "S_1"))
            .await
            .unwrap_err();
        assert!(matches!(err, RoutingError::Timeout { .. }));
        assert_eq!(err.partition(), Some(ANDROMEDA_PARTITION));
        assert_eq!(err.endpoint(), Some("local://a"));
        assert_eq!(err.status(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_protocol_errors_are_not_retried() {
        let transport = FlakyTransport::new(vec![TransportError::Protocol {
            address: "local://a".to_string(),
            reason: "status 418".to_string(),
        }]);
        let gateway = flaky_gateway(transport.clone());

        let err = gateway.query("Andromeda", None).await.unwrap_err();
        assert!(matches!(err, RoutingError::Protocol { .. }));
        assert!(!err.is_retryable());
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_not_primary_triggers_reresolution() {
        let cluster = Cluster::new(3);
        // Warm the gateway cache without touching the primary.
        cluster.gateway.query("Andromeda", None).await.unwrap();

        cluster
            .registry
            .promote(ANDROMEDA_PARTITION, "local://replica-1")
            .unwrap();

        let result = cluster
            .gateway
            .submit(StarRecord::new("Andromeda", "S_1"))
            .await
            .unwrap();
        assert!(result.inserted);
        assert_eq!(result.service_replica_address, "local://replica-1");
    }

    #[tokio::test]
    async fn test_failover_after_primary_loss() {
        let cluster = Cluster::new(3);
        cluster
            .gateway
            .submit(StarRecord::new("Andromeda", "S_1"))
            .await
            .unwrap();
        cluster.settle().await;

        let replicated = cluster
            .host("local://replica-1")
            .get_all(ANDROMEDA_PARTITION, "Andromeda")
            .await
            .unwrap();
        assert_eq!(replicated.len(), 1);

        // The old primary disappears and the replication layer elects replica-1.
        cluster.transport.deregister(ANDROMEDA_PRIMARY);
        cluster
            .registry
            .promote(ANDROMEDA_PARTITION, "local://replica-1")
            .unwrap();

        let result = cluster
            .gateway
            .submit(StarRecord::new("Andromeda", "S_2"))
            .await
            .unwrap();
        assert!(result.inserted);
        assert_eq!(result.service_replica_address, "local://replica-1");

        // S_1 was replicated before the loss, so the new primary still rejects it.
        let again = cluster
            .gateway
            .submit(StarRecord::new("Andromeda", "S_1"))
            .await
            .unwrap();
        assert!(!again.inserted);
    }

    #[tokio::test]
    async fn test_read_retry_skips_failed_secondary() {
        let cluster = Cluster::new(3);
        cluster
            .gateway
            .submit(StarRecord::new("Andromeda", "S_1"))
            .await
            .unwrap();
        cluster.settle().await;

        // replica-1 is one of partition 2's two secondaries.
        cluster.transport.deregister("local://replica-1");

        for _ in 0..100 {
            let info = cluster.gateway.query("Andromeda", None).await.unwrap();
            assert_ne!(info.endpoint_address, "local://replica-1");
            assert_eq!(info.stars.len(), 1);
        }
    }

    #[tokio::test]
    async fn test_read_retry_falls_back_to_primary() {
        let cluster = Cluster::new(2);
        cluster
            .gateway
            .submit(StarRecord::new("Andromeda", "S_1"))
            .await
            .unwrap();

        // With two replicas per partition, replica-1 is partition 2's only secondary.
        cluster.transport.deregister("local://replica-1");

        let info = cluster.gateway.query("Andromeda", None).await.unwrap();
        assert_eq!(info.endpoint_role, ReplicaRole::Primary);
        assert_eq!(info.endpoint_address, ANDROMEDA_PRIMARY);
        assert_eq!(info.stars.len(), 1);
    }

    #[tokio::test]
    async fn test_unreachable_primary_without_failover() {
        let cluster = Cluster::new(3);
        cluster.transport.deregister(ANDROMEDA_PRIMARY);

        let err = cluster
            .gateway
            .submit(StarRecord::new("Andromeda", "S_1"))
            .await
            .unwrap_err();
        assert!(matches!(err, RoutingError::StaleRoute { .. }));
        assert_eq!(err.endpoint(), Some(ANDROMEDA_PRIMARY));
        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
        assert!(cluster.gateway.stats().partitions.is_empty());
    }

    #[tokio::test]
    async fn test_missing_primary_is_retryable() {
        let cluster = Cluster::new(3);
        cluster
            .registry
            .remove_endpoint(ANDROMEDA_PARTITION, ANDROMEDA_PRIMARY)
            .unwrap();

        let err = cluster
            .gateway
            .submit(StarRecord::new("Andromeda", "S_1"))
            .await
            .unwrap_err();
        assert!(matches!(err, RoutingError::NoPrimary { .. }));
        assert!(err.is_retryable());
        assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);

        // Reads still work from the remaining secondaries.
        assert!(cluster.gateway.query("Andromeda", None).await.is_ok());
    }

    #[tokio::test]
    async fn test_partition_contents() {
        let cluster = Cluster::new(3);
        cluster
            .gateway
            .submit(StarRecord::new("Andromeda", "S_1"))
            .await
            .unwrap();
        cluster.settle().await;

        let info = cluster
            .gateway
            .partition_contents(ANDROMEDA_PARTITION)
            .await
            .unwrap();
        assert_eq!(info.stars.len(), 1);

        let err = cluster
            .gateway
            .partition_contents(PartitionId(26))
            .await
            .unwrap_err();
        assert!(matches!(err, RoutingError::UnknownPartition(_)));
    }

    #[tokio::test]
    async fn test_query_handler_requires_galaxy() {
        let cluster = Cluster::new(1);
        let gateway = Arc::new(cluster.gateway);

        let err = handle_query_stars(Extension(gateway), Query(StarQuery::default()))
            .await
            .unwrap_err();
        assert!(matches!(err, RoutingError::Validation(_)));
    }

    // ============================================================
    // HTTP TRANSPORT TESTS
    // ============================================================

    #[tokio::test]
    async fn test_http_transport_against_live_replica() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = format!("http://{}", listener.local_addr().unwrap());

        // Single-node deployment: this host is primary everywhere.
        let map = PartitionMap::hash_modulo(26).unwrap();
        let registry = TopologyRegistry::round_robin(map, &[address.clone()], 1);
        let naming: Arc<dyn NamingService> = registry.clone();
        let resolver = Arc::new(PartitionResolver::new(naming, Duration::from_millis(200), 2));
        let transport = Arc::new(HttpReplicaTransport::new(Duration::from_secs(2)));
        let dyn_transport: Arc<dyn ReplicaTransport> = transport.clone();
        let host = ReplicaHost::new(&address, map, resolver, dyn_transport, Duration::from_secs(2));

        let app = Router::new()
            .route(
                ROUTE_REPLICA_PARTITION,
                get(handle_dump_partition).post(handle_add_star),
            )
            .route(ROUTE_REPLICA_GALAXY, get(handle_get_galaxy))
            .route(ROUTE_REPLICA_STAR, get(handle_get_star))
            .route(ROUTE_REPLICATE, post(handle_replicate))
            .layer(Extension(host));
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let milky_way = map.locate("Milky Way").unwrap().partition;
        let star = StarRecord::new("Milky Way", "Sol").with_property("type", "G2V");

        let outcome = transport.add_star(&address, milky_way, &star).await.unwrap();
        assert!(outcome.inserted);
        assert_eq!(outcome.message, "Star Sol successfully added");
        let outcome = transport.add_star(&address, milky_way, &star).await.unwrap();
        assert!(!outcome.inserted);

        let galaxy = transport
            .get_galaxy(&address, milky_way, "Milky Way")
            .await
            .unwrap();
        assert_eq!(galaxy, vec![star.clone()]);

        let one = transport
            .get_star(&address, milky_way, "milky way", "SOL")
            .await
            .unwrap();
        assert_eq!(one.len(), 1);
        assert!(
            transport
                .get_star(&address, milky_way, "Milky Way", "Vega")
                .await
                .unwrap()
                .is_empty()
        );

        assert_eq!(
            transport.get_partition(&address, milky_way).await.unwrap().len(),
            1
        );

        // Writing into the wrong partition is a client error, not a stale route.
        let wrong = PartitionId((milky_way.0 + 1) % 26);
        let err = transport.add_star(&address, wrong, &star).await.unwrap_err();
        assert!(matches!(err, TransportError::Protocol { .. }));
    }

    #[tokio::test]
    async fn test_http_transport_maps_not_primary() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = format!("http://{}", listener.local_addr().unwrap());

        // The registry names some other node as the only replica.
        let map = PartitionMap::hash_modulo(4).unwrap();
        let registry =
            TopologyRegistry::round_robin(map, &["http://127.0.0.1:1".to_string()], 1);
        let naming: Arc<dyn NamingService> = registry;
        let resolver = Arc::new(PartitionResolver::new(naming, Duration::from_millis(200), 1));
        let transport = Arc::new(HttpReplicaTransport::new(Duration::from_secs(2)));
        let dyn_transport: Arc<dyn ReplicaTransport> = transport.clone();
        let host = ReplicaHost::new(&address, map, resolver, dyn_transport, Duration::from_secs(2));

        let app = Router::new()
            .route(ROUTE_REPLICA_PARTITION, post(handle_add_star))
            .layer(Extension(host));
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let star = StarRecord::new("Andromeda", "S_1");
        let partition = map.locate("Andromeda").unwrap().partition;
        let err = transport.add_star(&address, partition, &star).await.unwrap_err();
        assert_eq!(
            err,
            TransportError::NotPrimary {
                address: address.clone()
            }
        );
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_first_insert_survives_hung_secondary() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let primary = format!("http://{}", listener.local_addr().unwrap());

        // Accepts connections and never answers.
        let hung = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let secondary = format!("http://{}", hung.local_addr().unwrap());
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = hung.accept().await {
                held.push(socket);
            }
        });

        // Partition 2 of 26 over two nodes: primary on the first.
        let map = PartitionMap::hash_modulo(26).unwrap();
        let registry =
            TopologyRegistry::round_robin(map, &[primary.clone(), secondary.clone()], 2);
        let timeout = Duration::from_millis(300);

        let naming: Arc<dyn NamingService> = registry.clone();
        let host_resolver = Arc::new(PartitionResolver::new(naming, Duration::from_millis(200), 2));
        let host_transport: Arc<dyn ReplicaTransport> = Arc::new(HttpReplicaTransport::new(timeout));
        let host = ReplicaHost::new(&primary, map, host_resolver, host_transport, Duration::from_secs(2));
        let app = Router::new()
            .route(ROUTE_REPLICA_PARTITION, post(handle_add_star))
            .layer(Extension(host));
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let naming: Arc<dyn NamingService> = registry;
        let resolver = Arc::new(PartitionResolver::new(naming, Duration::from_millis(200), 2));
        let gateway =
            RoutingGateway::new(map, resolver, Arc::new(HttpReplicaTransport::new(timeout)));

        let result = gateway
            .submit(StarRecord::new("Andromeda", "S_1"))
            .await
            .unwrap();
        assert!(result.inserted);
        assert_eq!(result.result, "Star S_1 successfully added");
        assert_eq!(result.service_replica_address, primary);
        assert_eq!(gateway.stats().total_inserted, 1);
    }

    #[tokio::test]
    async fn test_http_transport_unreachable() {
        let transport = HttpReplicaTransport::new(Duration::from_millis(500));
        let err = transport
            .get_partition("http://127.0.0.1:1", PartitionId(0))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TransportError::Unreachable { .. } | TransportError::Timeout { .. }
        ));
    }
}
