//! Catalog access: where resources and datasets come from.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::models::{Dataset, Resource};

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    #[error("Dataset not found: {0}")]
    DatasetNotFound(String),

    #[error("Failed to read catalog {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse catalog {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Search index update failed: {0}")]
    Index(String),
}

/// Source of resource and dataset records.
#[async_trait]
pub trait Catalog: Send + Sync {
    async fn get_resource(&self, resource_id: &str) -> Result<Resource, CatalogError>;

    /// Look a dataset up by id or name.
    async fn get_dataset(&self, dataset_id: &str) -> Result<Dataset, CatalogError>;

    /// Refresh the search index entry for a dataset after its archivals
    /// changed. Catalogs without a search index do nothing.
    async fn update_search_index(&self, _dataset_id: &str) -> Result<(), CatalogError> {
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    datasets: Vec<Dataset>,
}

/// Catalog backed by a JSON document:
/// `{"datasets": [{"id", "name", "resources": [{"id", "url", "format"}]}]}`.
#[derive(Debug, Clone, Default)]
pub struct JsonCatalog {
    datasets: Vec<Dataset>,
    resource_index: HashMap<String, (usize, usize)>,
}

impl JsonCatalog {
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let display = path.display().to_string();
        let content = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: display.clone(),
            source,
        })?;
        let file: CatalogFile =
            serde_json::from_str(&content).map_err(|source| CatalogError::Parse {
                path: display,
                source,
            })?;
        debug!("Loaded {} datasets from {}", file.datasets.len(), path.display());
        Ok(Self::from_datasets(file.datasets))
    }

    pub fn from_datasets(mut datasets: Vec<Dataset>) -> Self {
        let mut resource_index = HashMap::new();
        for (d, dataset) in datasets.iter_mut().enumerate() {
            for (r, resource) in dataset.resources.iter_mut().enumerate() {
                resource.dataset_id = dataset.id.clone();
                resource_index.insert(resource.id.clone(), (d, r));
            }
        }
        Self {
            datasets,
            resource_index,
        }
    }

    pub fn datasets(&self) -> &[Dataset] {
        &self.datasets
    }
}

#[async_trait]
impl Catalog for JsonCatalog {
    async fn get_resource(&self, resource_id: &str) -> Result<Resource, CatalogError> {
        self.resource_index
            .get(resource_id)
            .map(|&(d, r)| self.datasets[d].resources[r].clone())
            .ok_or_else(|| CatalogError::ResourceNotFound(resource_id.to_string()))
    }

    async fn get_dataset(&self, dataset_id: &str) -> Result<Dataset, CatalogError> {
        self.datasets
            .iter()
            .find(|d| d.id == dataset_id || d.name == dataset_id)
            .cloned()
            .ok_or_else(|| CatalogError::DatasetNotFound(dataset_id.to_string()))
    }

    async fn update_search_index(&self, dataset_id: &str) -> Result<(), CatalogError> {
        info!("No search index for JSON catalog; skipping reindex of {}", dataset_id);
        Ok(())
    }
}
