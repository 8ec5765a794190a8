//! Project metadata lookup.
//!
//! `ProjectStore` is the seam to the project-metadata collaborator. Two
//! implementations: JSON files on disk, and an in-memory map.

use super::model::{LayerMeta, LayersData, ProjectInfo, ProjectSettings};
use crate::config::OwsError;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

const META_DIR: &str = ".gisquick";
const PROJECT_FILE: &str = "project.json";
const SETTINGS_FILE: &str = "settings.json";
const QGIS_META_FILE: &str = "qgis.json";

/// Project store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("project does not exist: {0}")]
    NotFound(String),

    #[error("project metadata missing: {}", .0.display())]
    MissingMetadata(PathBuf),

    #[error("reading {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("decoding {}: {source}", .path.display())]
    Decode {
        path: PathBuf,
        source: serde_json::Error,
    },
}

impl From<StoreError> for OwsError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(name) => Self::NotFound(name),
            other => Self::Store(other.to_string()),
        }
    }
}

/// Read-only access to project metadata, keyed by `<user>/<project>`.
#[async_trait]
pub trait ProjectStore: Send + Sync {
    async fn project_info(&self, name: &str) -> Result<ProjectInfo, StoreError>;

    /// Access-control settings. A project without saved settings yields defaults.
    async fn settings(&self, name: &str) -> Result<ProjectSettings, StoreError>;

    async fn layers_data(&self, name: &str) -> Result<LayersData, StoreError>;
}

#[derive(Deserialize)]
struct QgisMeta {
    #[serde(default)]
    layers: HashMap<String, LayerMeta>,
}

/// Reads `<root>/<user>/<project>/.gisquick/*.json`.
#[derive(Debug, Clone)]
pub struct FsProjectStore {
    root: PathBuf,
}

impl FsProjectStore {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn meta_path(&self, name: &str, file: &str) -> PathBuf {
        self.root.join(name).join(META_DIR).join(file)
    }

    async fn read(path: &Path) -> Result<Option<Vec<u8>>, StoreError> {
        match tokio::fs::read(path).await {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StoreError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    fn decode<T: serde::de::DeserializeOwned>(path: &Path, data: &[u8]) -> Result<T, StoreError> {
        serde_json::from_slice(data).map_err(|source| StoreError::Decode {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[async_trait]
impl ProjectStore for FsProjectStore {
    async fn project_info(&self, name: &str) -> Result<ProjectInfo, StoreError> {
        let path = self.meta_path(name, PROJECT_FILE);
        let data = Self::read(&path)
            .await?
            .ok_or_else(|| StoreError::NotFound(name.to_string()))?;
        Self::decode(&path, &data)
    }

    async fn settings(&self, name: &str) -> Result<ProjectSettings, StoreError> {
        let path = self.meta_path(name, SETTINGS_FILE);
        match Self::read(&path).await? {
            Some(data) => Self::decode(&path, &data),
            None => {
                debug!(project = %name, "No saved settings, using defaults");
                Ok(ProjectSettings::default())
            }
        }
    }

    async fn layers_data(&self, name: &str) -> Result<LayersData, StoreError> {
        let path = self.meta_path(name, QGIS_META_FILE);
        let data = Self::read(&path)
            .await?
            .ok_or_else(|| StoreError::MissingMetadata(path.clone()))?;
        let meta: QgisMeta = Self::decode(&path, &data)?;
        Ok(LayersData::new(meta.layers))
    }
}

/// Everything the gateway needs to know about one project.
#[derive(Debug, Clone)]
pub struct ProjectRecord {
    pub info: ProjectInfo,
    pub settings: ProjectSettings,
    pub layers: LayersData,
}

/// Concurrent in-memory store, for embedding and tests.
#[derive(Default)]
pub struct MemoryProjectStore {
    projects: papaya::HashMap<String, ProjectRecord>,
}

impl MemoryProjectStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, name: &str, record: ProjectRecord) {
        self.projects.pin().insert(name.to_string(), record);
    }

    fn get(&self, name: &str) -> Result<ProjectRecord, StoreError> {
        self.projects
            .pin()
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(name.to_string()))
    }
}

#[async_trait]
impl ProjectStore for MemoryProjectStore {
    async fn project_info(&self, name: &str) -> Result<ProjectInfo, StoreError> {
        self.get(name).map(|p| p.info)
    }

    async fn settings(&self, name: &str) -> Result<ProjectSettings, StoreError> {
        self.get(name).map(|p| p.settings)
    }

    async fn layers_data(&self, name: &str) -> Result<LayersData, StoreError> {
        self.get(name).map(|p| p.layers)
    }
}
