use crate::catalog::protocol::{PartitionCount, StatsResponse};
use crate::sharding::PartitionId;

use dashmap::DashMap;

/// Accepted inserts per partition, as seen by one gateway.
#[derive(Default)]
pub struct PartitionTally {
    counts: DashMap<PartitionId, u64>,
}

impl PartitionTally {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, partition: PartitionId) {
        *self.counts.entry(partition).or_insert(0) += 1;
    }

    pub fn count(&self, partition: PartitionId) -> u64 {
        self.counts
            .get(&partition)
            .map(|entry| *entry.value())
            .unwrap_or(0)
    }

    pub fn snapshot(&self) -> StatsResponse {
        let mut partitions: Vec<PartitionCount> = self
            .counts
            .iter()
            .map(|entry| PartitionCount {
                partition_id: *entry.key(),
                inserted: *entry.value(),
            })
            .collect();
        partitions.sort_by_key(|count| count.partition_id);

        StatsResponse {
            total_inserted: partitions.iter().map(|count| count.inserted).sum(),
            partitions,
        }
    }
}
