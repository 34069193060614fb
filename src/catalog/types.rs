use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier of a star record, assigned once at creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct StarId(pub String);

impl StarId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl Default for StarId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for StarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One `(key, value)` pair of a star's properties. Keys may repeat.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Property {
    #[serde(alias = "Key")]
    pub key: String,
    #[serde(alias = "Value")]
    pub value: String,
}

impl Property {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// A catalog entry: one star inside one galaxy.
///
/// Immutable once stored. `(galaxy_name, star_name)`, case-folded, is unique within
/// the partition that owns the galaxy; see [`StarRecord::composite_key`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StarRecord {
    #[serde(default)]
    pub id: StarId,
    #[serde(default)]
    pub galaxy_id: String,
    pub galaxy_name: String,
    pub star_name: String,
    #[serde(default, alias = "data")]
    pub properties: Vec<Property>,
}

impl StarRecord {
    pub fn new(galaxy_name: impl Into<String>, star_name: impl Into<String>) -> Self {
        Self {
            id: StarId::new(),
            galaxy_id: String::new(),
            galaxy_name: galaxy_name.into(),
            star_name: star_name.into(),
            properties: Vec::new(),
        }
    }

    pub fn with_galaxy_id(mut self, galaxy_id: impl Into<String>) -> Self {
        self.galaxy_id = galaxy_id.into();
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.push(Property::new(key, value));
        self
    }

    pub fn composite_key(&self) -> String {
        composite_key(&self.galaxy_name, &self.star_name)
    }

    /// Whether the record belongs to `galaxy_name`, compared in canonical form.
    pub fn in_galaxy(&self, galaxy_name: &str) -> bool {
        canonicalize(&self.galaxy_name) == canonicalize(galaxy_name)
    }
}

/// Canonical (upper-case) form used for composite keys and galaxy matching.
pub fn canonicalize(name: &str) -> String {
    name.to_uppercase()
}

/// `canonicalize(galaxy) + canonicalize(star)`, with no separator.
pub fn composite_key(galaxy_name: &str, star_name: &str) -> String {
    let mut key = canonicalize(galaxy_name);
    key.push_str(&canonicalize(star_name));
    key
}

/// Outcome of an idempotent insert. A duplicate is a normal outcome, not an error.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InsertOutcome {
    pub inserted: bool,
    pub message: String,
}

impl InsertOutcome {
    pub fn for_star(star_name: &str, inserted: bool) -> Self {
        let message = if inserted {
            format!("Star {} successfully added", star_name)
        } else {
            format!("Star {} already exists", star_name)
        };
        Self { inserted, message }
    }
}
