//! Legacy `docker save` metadata
//!
//! Models for the files a `docker load` reads besides the layer tarballs: the per-layer
//! `json`, the `manifest.json` package list and the `repositories` map.

use crate::error::{RegistryError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Timestamp carried by every layer except the top one
pub const EMPTY_CREATED: &str = "0001-01-01T00:00:00Z";

/// Content of `<id>/VERSION`
pub const LAYER_VERSION: &str = "1.0";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ContainerConfig {
    pub hostname: String,
    pub domainname: String,
    pub user: String,
    pub attach_stdin: bool,
    pub attach_stdout: bool,
    pub attach_stderr: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exposed_ports: Option<HashMap<String, serde_json::Value>>,
    pub tty: bool,
    pub open_stdin: bool,
    pub stdin_once: bool,
    pub env: Option<Vec<String>>,
    pub cmd: Option<Vec<String>>,
    pub image: String,
    pub volumes: Option<HashMap<String, serde_json::Value>>,
    pub working_dir: String,
    pub entrypoint: Option<Vec<String>>,
    pub on_build: Option<Vec<String>>,
    pub labels: Option<HashMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_signal: Option<String>,
}

/// The fields of an image config blob that end up in the top layer's `json`
#[derive(Debug, Clone, Default, Deserialize)]
struct ImageConfigBlob {
    #[serde(default)]
    created: Option<String>,
    #[serde(default)]
    container_config: Option<ContainerConfig>,
    #[serde(default)]
    config: Option<ContainerConfig>,
}

/// Content of `<id>/json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegacyLayerMetadata {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    pub created: String,
    pub container_config: ContainerConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<ContainerConfig>,
}

impl Default for LegacyLayerMetadata {
    fn default() -> Self {
        Self {
            id: String::new(),
            parent: None,
            created: EMPTY_CREATED.to_string(),
            container_config: ContainerConfig::default(),
            config: None,
        }
    }
}

impl LegacyLayerMetadata {
    /// Top-layer metadata carrying `created` and the container configs of the image
    pub fn from_config_blob(blob: &[u8]) -> Result<Self> {
        let config: ImageConfigBlob = serde_json::from_slice(blob)
            .map_err(|e| RegistryError::Decode(format!("Invalid image config: {}", e)))?;

        Ok(Self {
            created: config.created.unwrap_or_else(|| EMPTY_CREATED.to_string()),
            container_config: config.container_config.unwrap_or_default(),
            config: config.config,
            ..Self::default()
        })
    }

    pub fn with_ids(mut self, id: &str, parent: Option<&str>) -> Self {
        self.id = id.to_string();
        self.parent = parent.filter(|p| !p.is_empty()).map(str::to_string);
        self
    }

    /// Serialized `json` file content
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut bytes = serde_json::to_vec(self)?;
        bytes.push(b'\n');
        Ok(bytes)
    }
}

/// One `manifest.json` entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PackageConfig {
    pub config: String,
    pub repo_tags: Vec<String>,
    pub layers: Vec<String>,
}

/// `repositories`: repository → tag → top layer ID
pub type Repositories = BTreeMap<String, BTreeMap<String, String>>;

pub fn repositories(repository: &str, tag: &str, top_layer_id: &str) -> Repositories {
    let mut tags = BTreeMap::new();
    tags.insert(tag.to_string(), top_layer_id.to_string());
    let mut repositories = BTreeMap::new();
    repositories.insert(repository.to_string(), tags);
    repositories
}
