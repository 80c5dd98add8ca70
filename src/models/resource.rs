//! Catalog-owned references consumed by the archiver.

use serde::{Deserialize, Serialize};

/// A downloadable file referenced by a dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub id: String,
    pub url: String,
    #[serde(default)]
    pub format: Option<String>,
    /// Owning dataset. Filled in by the catalog when resources are nested.
    #[serde(default)]
    pub dataset_id: String,
}

/// A named collection of resources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dataset {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub resources: Vec<Resource>,
}

impl Dataset {
    /// Name used in job ids and log lines; falls back to the id.
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.id
        } else {
            &self.name
        }
    }
}
