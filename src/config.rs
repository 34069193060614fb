//! Node Configuration
//!
//! Read once at startup from `GALAXY_*` environment variables. Every value has a
//! default except the replica node list in `naming` mode; anything unparsable is a
//! [`ConfigError`] and the node refuses to start.

use crate::error::ConfigError;
use crate::sharding::{PartitionMap, PartitionScheme};

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

/// Replica addresses used by `standalone` when `GALAXY_REPLICA_NODES` is unset.
const STANDALONE_NODES: [&str; 3] = ["local://replica-1", "local://replica-2", "local://replica-3"];

/// What a `galaxy-node` process runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeMode {
    Naming,
    Replica,
    Gateway,
    /// Naming registry, in-process replica hosts and the gateway in one process.
    Standalone,
}

impl NodeMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeMode::Naming => "naming",
            NodeMode::Replica => "replica",
            NodeMode::Gateway => "gateway",
            NodeMode::Standalone => "standalone",
        }
    }
}

impl FromStr for NodeMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "naming" => Ok(NodeMode::Naming),
            "replica" => Ok(NodeMode::Replica),
            "gateway" => Ok(NodeMode::Gateway),
            "standalone" => Ok(NodeMode::Standalone),
            other => Err(ConfigError::InvalidValue {
                key: "GALAXY_MODE".to_string(),
                value: other.to_string(),
                reason: "expected naming, replica, gateway or standalone".to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub mode: NodeMode,
    pub bind_addr: SocketAddr,
    pub advertise_url: String,
    pub naming_url: String,
    pub partition_scheme: PartitionScheme,
    pub partition_count: u32,
    pub replica_nodes: Vec<String>,
    pub replicas_per_partition: usize,
    pub resolve_timeout: Duration,
    pub resolve_attempts: usize,
    pub replica_timeout: Duration,
    pub commit_timeout: Duration,
    pub anti_entropy_interval: Duration,
    pub stats_interval: Duration,
    pub log_level: tracing::Level,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from any key → value source. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let mode = match get("GALAXY_MODE") {
            Some(value) => value.parse()?,
            None => NodeMode::Standalone,
        };
        let bind_addr: SocketAddr = parse_or(&get, "GALAXY_BIND", "127.0.0.1:8080".parse().ok())?;
        let advertise_url = get("GALAXY_ADVERTISE_URL")
            .unwrap_or_else(|| format!("http://{}", bind_addr))
            .trim_end_matches('/')
            .to_string();
        let naming_url = get("GALAXY_NAMING_URL")
            .unwrap_or_else(|| "http://127.0.0.1:7000".to_string())
            .trim_end_matches('/')
            .to_string();
        let partition_scheme = match get("GALAXY_PARTITION_SCHEME") {
            Some(value) => value.parse()?,
            None => PartitionScheme::HashModulo,
        };
        let partition_count: u32 = parse_or(&get, "GALAXY_PARTITION_COUNT", Some(26))?;

        let mut replica_nodes: Vec<String> = get("GALAXY_REPLICA_NODES")
            .map(|value| {
                value
                    .split(',')
                    .map(|node| node.trim().trim_end_matches('/').to_string())
                    .filter(|node| !node.is_empty())
                    .collect()
            })
            .unwrap_or_default();
        if replica_nodes.is_empty() {
            match mode {
                NodeMode::Naming => {
                    return Err(ConfigError::NoReplicaNodes(
                        "GALAXY_REPLICA_NODES".to_string(),
                    ));
                }
                NodeMode::Standalone => {
                    replica_nodes = STANDALONE_NODES.iter().map(|s| s.to_string()).collect();
                }
                NodeMode::Replica | NodeMode::Gateway => {}
            }
        }

        let config = Self {
            mode,
            bind_addr,
            advertise_url,
            naming_url,
            partition_scheme,
            partition_count,
            replica_nodes,
            replicas_per_partition: parse_or(&get, "GALAXY_REPLICAS_PER_PARTITION", Some(3))?,
            resolve_timeout: millis(&get, "GALAXY_RESOLVE_TIMEOUT_MS", 2000)?,
            resolve_attempts: parse_or(&get, "GALAXY_RESOLVE_ATTEMPTS", Some(3))?,
            replica_timeout: millis(&get, "GALAXY_REPLICA_TIMEOUT_MS", 5000)?,
            commit_timeout: millis(&get, "GALAXY_COMMIT_TIMEOUT_MS", 2000)?,
            anti_entropy_interval: millis(&get, "GALAXY_ANTI_ENTROPY_MS", 10_000)?,
            stats_interval: millis(&get, "GALAXY_STATS_MS", 30_000)?,
            log_level: parse_or(&get, "GALAXY_LOG", Some(tracing::Level::INFO))?,
        };

        // Fail at startup rather than on the first request.
        config.partition_map()?;
        Ok(config)
    }

    pub fn partition_map(&self) -> Result<PartitionMap, ConfigError> {
        PartitionMap::new(self.partition_scheme, self.partition_count)
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: Option<T>) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(value) => value.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            value,
            reason: e.to_string(),
        }),
        None => default.ok_or_else(|| ConfigError::InvalidValue {
            key: key.to_string(),
            value: String::new(),
            reason: "no value and no default".to_string(),
        }),
    }
}

fn millis<G>(get: &G, key: &str, default_ms: u64) -> Result<Duration, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    let ms: u64 = parse_or(get, key, Some(default_ms))?;
    if ms == 0 {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: "0".to_string(),
            reason: "must be greater than zero".to_string(),
        });
    }
    Ok(Duration::from_millis(ms))
}
