use super::hasher::partition_key;
use crate::error::{ConfigError, RoutingError};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Partition count the legacy first-letter scheme was built for.
pub const LEGACY_PARTITION_COUNT: u32 = 26;

/// Stable identifier of a partition. Partitions are numbered `0..partition_count`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct PartitionId(pub u32);

impl fmt::Display for PartitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How grouping names are turned into partitions.
///
/// The two schemes are not compatible with each other; a deployment picks one.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum PartitionScheme {
    /// MD5-derived key reduced modulo the partition count.
    HashModulo,
    /// First letter of the name, `'A'..='Z'` onto 26 fixed partitions.
    Legacy,
}

impl FromStr for PartitionScheme {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hash" | "hash-modulo" | "hash_modulo" => Ok(PartitionScheme::HashModulo),
            "legacy" | "letter" => Ok(PartitionScheme::Legacy),
            other => Err(ConfigError::InvalidValue {
                key: "GALAXY_PARTITION_SCHEME".to_string(),
                value: other.to_string(),
                reason: "expected `hash` or `legacy`".to_string(),
            }),
        }
    }
}

/// The slice of the partition-key space a partition owns.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum KeyRange {
    /// Keys congruent to `residue` modulo `modulus`.
    Residue { modulus: u32, residue: u32 },
    /// Keys in `low..=high`.
    Span { low: i64, high: i64 },
}

impl KeyRange {
    pub fn contains(&self, key: i64) -> bool {
        match *self {
            KeyRange::Residue { modulus, residue } => {
                map_to_partition(key, modulus) == PartitionId(residue)
            }
            KeyRange::Span { low, high } => low <= key && key <= high,
        }
    }
}

/// General scheme: reduces any signed key, negative ones included, into `[0, partition_count)`.
///
/// `partition_count` must be at least 1; [`PartitionMap::new`] rejects 0 up front.
pub fn map_to_partition(key: i64, partition_count: u32) -> PartitionId {
    let count = i64::from(partition_count.max(1));
    PartitionId((((key % count) + count) % count) as u32)
}

/// Legacy scheme: `upper(first char) - 'A'`. `None` when the name does not start with an ASCII letter.
pub fn legacy_partition(name: &str) -> Option<PartitionId> {
    let first = name.chars().next()?;
    if !first.is_ascii_alphabetic() {
        return None;
    }
    Some(PartitionId(u32::from(first.to_ascii_uppercase() as u8 - b'A')))
}

/// Where a grouping name lands: its partition key and the owning partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub partition_key: i64,
    pub partition: PartitionId,
}

/// Fixed partition table shared by every client and server in a deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionMap {
    scheme: PartitionScheme,
    partition_count: u32,
}

impl PartitionMap {
    pub fn new(scheme: PartitionScheme, partition_count: u32) -> Result<Self, ConfigError> {
        if partition_count == 0 {
            return Err(ConfigError::ZeroPartitions);
        }
        if scheme == PartitionScheme::Legacy && partition_count != LEGACY_PARTITION_COUNT {
            return Err(ConfigError::LegacyPartitionCount(partition_count));
        }
        Ok(Self {
            scheme,
            partition_count,
        })
    }

    pub fn hash_modulo(partition_count: u32) -> Result<Self, ConfigError> {
        Self::new(PartitionScheme::HashModulo, partition_count)
    }

    pub fn legacy() -> Self {
        Self {
            scheme: PartitionScheme::Legacy,
            partition_count: LEGACY_PARTITION_COUNT,
        }
    }

    pub fn scheme(&self) -> PartitionScheme {
        self.scheme
    }

    pub fn partition_count(&self) -> u32 {
        self.partition_count
    }

    pub fn partitions(&self) -> impl Iterator<Item = PartitionId> {
        (0..self.partition_count).map(PartitionId)
    }

    /// Computes the partition key and owning partition for a grouping name.
    ///
    /// Empty names, and names without a leading letter under the legacy scheme,
    /// are validation errors.
    pub fn locate(&self, galaxy_name: &str) -> Result<Placement, RoutingError> {
        if galaxy_name.is_empty() {
            return Err(RoutingError::Validation(
                "galaxyName must not be empty".to_string(),
            ));
        }

        match self.scheme {
            PartitionScheme::HashModulo => {
                let key = partition_key(galaxy_name);
                Ok(Placement {
                    partition_key: key,
                    partition: map_to_partition(key, self.partition_count),
                })
            }
            PartitionScheme::Legacy => {
                let partition = legacy_partition(galaxy_name).ok_or_else(|| {
                    RoutingError::Validation(format!(
                        "galaxyName {:?} must start with a letter under the legacy partition scheme",
                        galaxy_name
                    ))
                })?;
                Ok(Placement {
                    partition_key: i64::from(partition.0),
                    partition,
                })
            }
        }
    }

    pub fn key_range(&self, partition: PartitionId) -> KeyRange {
        match self.scheme {
            PartitionScheme::HashModulo => KeyRange::Residue {
                modulus: self.partition_count,
                residue: partition.0,
            },
            PartitionScheme::Legacy => KeyRange::Span {
                low: i64::from(partition.0),
                high: i64::from(partition.0),
            },
        }
    }

    pub fn contains(&self, partition: PartitionId) -> bool {
        partition.0 < self.partition_count
    }
}
