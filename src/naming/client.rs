use super::service::NamingService;
use super::types::PartitionDescriptor;
use crate::catalog::protocol::ENDPOINT_NAMING_PARTITIONS;
use crate::sharding::PartitionId;

use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;

/// Reaches a remote [`super::service::TopologyRegistry`] through its HTTP surface.
pub struct HttpNamingClient {
    base_url: String,
    http_client: reqwest::Client,
    timeout: Duration,
}

impl HttpNamingClient {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http_client: reqwest::Client::new(),
            timeout,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl NamingService for HttpNamingClient {
    async fn lookup(&self, partition: PartitionId) -> Result<Option<PartitionDescriptor>> {
        let url = format!(
            "{}{}/{}",
            self.base_url, ENDPOINT_NAMING_PARTITIONS, partition
        );

        let response = self
            .http_client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(anyhow::anyhow!(
                "Naming lookup for partition {} failed {}",
                partition,
                response.status()
            ));
        }

        let descriptor: Option<PartitionDescriptor> = response.json().await?;
        Ok(descriptor)
    }
}
