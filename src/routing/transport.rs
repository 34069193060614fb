//! Replica Transport
//!
//! How the gateway (and a primary pushing to its secondaries) talks to a replica
//! endpoint. [`HttpReplicaTransport`] speaks the replica wire contract over
//! reqwest; [`LocalTransport`] calls in-process hosts directly and backs the
//! standalone mode and the cluster tests.

use crate::catalog::protocol::{
    ENDPOINT_REPLICAS, ENDPOINT_REPLICATE, ReplicateRequest, ReplicateResponse,
};
use crate::catalog::{InsertOutcome, StarRecord};
use crate::error::{ReplicaError, TransportError};
use crate::replica::ReplicaHost;
use crate::sharding::PartitionId;

use async_trait::async_trait;
use dashmap::DashMap;
use reqwest::{StatusCode, Url};
use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::Duration;

/// Calls against one replica endpoint, addressed by its base URL.
#[async_trait]
pub trait ReplicaTransport: Send + Sync {
    async fn add_star(
        &self,
        address: &str,
        partition: PartitionId,
        record: &StarRecord,
    ) -> Result<InsertOutcome, TransportError>;

    async fn get_galaxy(
        &self,
        address: &str,
        partition: PartitionId,
        galaxy_name: &str,
    ) -> Result<Vec<StarRecord>, TransportError>;

    /// Zero or one record.
    async fn get_star(
        &self,
        address: &str,
        partition: PartitionId,
        galaxy_name: &str,
        star_name: &str,
    ) -> Result<Vec<StarRecord>, TransportError>;

    async fn get_partition(
        &self,
        address: &str,
        partition: PartitionId,
    ) -> Result<Vec<StarRecord>, TransportError>;

    /// Returns whether the receiver applied the record.
    async fn replicate(
        &self,
        address: &str,
        partition: PartitionId,
        request: &ReplicateRequest,
    ) -> Result<bool, TransportError>;
}

// ============================================================
// HTTP
// ============================================================

pub struct HttpReplicaTransport {
    http_client: reqwest::Client,
    timeout: Duration,
}

impl HttpReplicaTransport {
    pub fn new(timeout: Duration) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            timeout,
        }
    }

    /// `address` joined with percent-encoded path segments.
    fn url(&self, address: &str, segments: &[&str]) -> Result<Url, TransportError> {
        let mut url = Url::parse(address).map_err(|e| TransportError::Protocol {
            address: address.to_string(),
            reason: format!("invalid endpoint address: {}", e),
        })?;
        {
            let mut path = url.path_segments_mut().map_err(|_| TransportError::Protocol {
                address: address.to_string(),
                reason: "endpoint address cannot carry a path".to_string(),
            })?;
            path.pop_if_empty().extend(segments);
        }
        Ok(url)
    }

    async fn send(
        &self,
        address: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, TransportError> {
        let response = request
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| classify_send_error(address, e))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(match status {
            StatusCode::CONFLICT => TransportError::NotPrimary {
                address: address.to_string(),
            },
            StatusCode::SERVICE_UNAVAILABLE => TransportError::Transaction {
                address: address.to_string(),
                reason: body,
            },
            other => TransportError::Protocol {
                address: address.to_string(),
                reason: format!("status {}: {}", other, body),
            },
        })
    }

    async fn get_records(&self, address: &str, url: Url) -> Result<Vec<StarRecord>, TransportError> {
        let response = self.send(address, self.http_client.get(url)).await?;
        response
            .json::<Vec<StarRecord>>()
            .await
            .map_err(|e| TransportError::Protocol {
                address: address.to_string(),
                reason: format!("invalid record list: {}", e),
            })
    }
}

fn classify_send_error(address: &str, error: reqwest::Error) -> TransportError {
    if error.is_timeout() {
        TransportError::Timeout {
            address: address.to_string(),
        }
    } else {
        TransportError::Unreachable {
            address: address.to_string(),
            reason: error.to_string(),
        }
    }
}

/// Strips the leading `/` of an endpoint constant so it can be split into segments.
fn segments_of(endpoint: &str) -> impl Iterator<Item = &str> {
    endpoint.split('/').filter(|segment| !segment.is_empty())
}

#[async_trait]
impl ReplicaTransport for HttpReplicaTransport {
    async fn add_star(
        &self,
        address: &str,
        partition: PartitionId,
        record: &StarRecord,
    ) -> Result<InsertOutcome, TransportError> {
        let partition = partition.to_string();
        let mut segments: Vec<&str> = segments_of(ENDPOINT_REPLICAS).collect();
        segments.push(&partition);
        let url = self.url(address, &segments)?;

        let response = self
            .send(address, self.http_client.post(url).json(record))
            .await?;
        let inserted = match response.status() {
            StatusCode::CREATED => true,
            StatusCode::OK => false,
            other => {
                return Err(TransportError::Protocol {
                    address: address.to_string(),
                    reason: format!("unexpected status {}", other),
                });
            }
        };
        let message = response
            .text()
            .await
            .map_err(|e| TransportError::Protocol {
                address: address.to_string(),
                reason: e.to_string(),
            })?;

        Ok(InsertOutcome { inserted, message })
    }

    async fn get_galaxy(
        &self,
        address: &str,
        partition: PartitionId,
        galaxy_name: &str,
    ) -> Result<Vec<StarRecord>, TransportError> {
        let partition = partition.to_string();
        let mut segments: Vec<&str> = segments_of(ENDPOINT_REPLICAS).collect();
        segments.extend([partition.as_str(), "galaxies", galaxy_name]);
        let url = self.url(address, &segments)?;
        self.get_records(address, url).await
    }

    async fn get_star(
        &self,
        address: &str,
        partition: PartitionId,
        galaxy_name: &str,
        star_name: &str,
    ) -> Result<Vec<StarRecord>, TransportError> {
        let partition = partition.to_string();
        let mut segments: Vec<&str> = segments_of(ENDPOINT_REPLICAS).collect();
        segments.extend([
            partition.as_str(),
            "galaxies",
            galaxy_name,
            "stars",
            star_name,
        ]);
        let url = self.url(address, &segments)?;
        self.get_records(address, url).await
    }

    async fn get_partition(
        &self,
        address: &str,
        partition: PartitionId,
    ) -> Result<Vec<StarRecord>, TransportError> {
        let partition = partition.to_string();
        let mut segments: Vec<&str> = segments_of(ENDPOINT_REPLICAS).collect();
        segments.push(&partition);
        let url = self.url(address, &segments)?;
        self.get_records(address, url).await
    }

    async fn replicate(
        &self,
        address: &str,
        partition: PartitionId,
        request: &ReplicateRequest,
    ) -> Result<bool, TransportError> {
        let partition = partition.to_string();
        let mut segments: Vec<&str> = segments_of(ENDPOINT_REPLICATE).collect();
        segments.push(&partition);
        let url = self.url(address, &segments)?;

        let response = self
            .send(address, self.http_client.post(url).json(request))
            .await?;
        let ack: ReplicateResponse = response.json().await.map_err(|e| TransportError::Protocol {
            address: address.to_string(),
            reason: format!("invalid replicate ack: {}", e),
        })?;
        Ok(ack.applied)
    }
}

// ============================================================
// IN-PROCESS
// ============================================================

/// Routes calls to [`ReplicaHost`]s living in this process.
///
/// Hosts are held weakly; a host that was dropped or deregistered reads as unreachable.
/// Every call is bounded by the transport's timeout, as an HTTP request would be.
pub struct LocalTransport {
    hosts: DashMap<String, Weak<ReplicaHost>>,
    timeout: Duration,
}

impl LocalTransport {
    pub fn new(timeout: Duration) -> Arc<Self> {
        Arc::new(Self {
            hosts: DashMap::new(),
            timeout,
        })
    }

    pub fn register(&self, host: &Arc<ReplicaHost>) {
        self.hosts
            .insert(host.address().to_string(), Arc::downgrade(host));
    }

    /// Makes `address` unreachable, as if its process had stopped.
    pub fn deregister(&self, address: &str) -> bool {
        self.hosts.remove(address).is_some()
    }

    fn host(&self, address: &str) -> Result<Arc<ReplicaHost>, TransportError> {
        self.hosts
            .get(address)
            .and_then(|entry| entry.value().upgrade())
            .ok_or_else(|| TransportError::Unreachable {
                address: address.to_string(),
                reason: "no replica host registered at this address".to_string(),
            })
    }

    async fn bounded<T, Fut>(&self, address: &str, call: Fut) -> Result<T, TransportError>
    where
        Fut: Future<Output = Result<T, ReplicaError>>,
    {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result.map_err(|e| replica_failure(address, e)),
            Err(_) => Err(TransportError::Timeout {
                address: address.to_string(),
            }),
        }
    }
}

/// The classification an HTTP caller would derive from the replica's status code.
fn replica_failure(address: &str, error: ReplicaError) -> TransportError {
    let address = address.to_string();
    match error {
        ReplicaError::NotPrimary { .. } => TransportError::NotPrimary { address },
        ReplicaError::Resolution { .. } | ReplicaError::Store(_) => TransportError::Transaction {
            address,
            reason: error.to_string(),
        },
        ReplicaError::InvalidRecord(_) | ReplicaError::UnknownPartition(_) => {
            TransportError::Protocol {
                address,
                reason: error.to_string(),
            }
        }
    }
}

#[async_trait]
impl ReplicaTransport for LocalTransport {
    async fn add_star(
        &self,
        address: &str,
        partition: PartitionId,
        record: &StarRecord,
    ) -> Result<InsertOutcome, TransportError> {
        let host = self.host(address)?;
        self.bounded(address, host.add_star(partition, record.clone()))
            .await
    }

    async fn get_galaxy(
        &self,
        address: &str,
        partition: PartitionId,
        galaxy_name: &str,
    ) -> Result<Vec<StarRecord>, TransportError> {
        let host = self.host(address)?;
        self.bounded(address, host.get_all(partition, galaxy_name))
            .await
    }

    async fn get_star(
        &self,
        address: &str,
        partition: PartitionId,
        galaxy_name: &str,
        star_name: &str,
    ) -> Result<Vec<StarRecord>, TransportError> {
        let host = self.host(address)?;
        let found = self
            .bounded(address, host.get_one(partition, galaxy_name, star_name))
            .await?;
        Ok(found.into_iter().collect())
    }

    async fn get_partition(
        &self,
        address: &str,
        partition: PartitionId,
    ) -> Result<Vec<StarRecord>, TransportError> {
        let host = self.host(address)?;
        self.bounded(address, host.dump(partition)).await
    }

    async fn replicate(
        &self,
        address: &str,
        partition: PartitionId,
        request: &ReplicateRequest,
    ) -> Result<bool, TransportError> {
        let host = self.host(address)?;
        self.bounded(address, host.apply_replica(partition, request.clone()))
            .await
    }
}
