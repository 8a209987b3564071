//! Manifest and manifest-list models
//!
//! Covers the Docker v2 / OCI media types a pull can encounter: indexes (manifest
//! lists) that fan out per platform, single image manifests, and legacy signed v1
//! manifests which are only recognized so they can be re-requested as v2.

use crate::error::{RegistryError, Result};
use crate::image::digest::DigestUtils;
use serde::{Deserialize, Serialize};

pub mod media_types {
    pub const DOCKER_MANIFEST_LIST: &str =
        "application/vnd.docker.distribution.manifest.list.v2+json";
    pub const DOCKER_MANIFEST_V2: &str = "application/vnd.docker.distribution.manifest.v2+json";
    pub const DOCKER_MANIFEST_V1: &str = "application/vnd.docker.distribution.manifest.v1+json";
    pub const DOCKER_MANIFEST_V1_SIGNED: &str =
        "application/vnd.docker.distribution.manifest.v1+prettyjws";
    pub const OCI_INDEX: &str = "application/vnd.oci.image.index.v1+json";
    pub const OCI_MANIFEST: &str = "application/vnd.oci.image.manifest.v1+json";
}

/// `Accept` value offered on the first manifest request
pub fn default_accept() -> String {
    [
        media_types::DOCKER_MANIFEST_LIST,
        media_types::OCI_INDEX,
        media_types::DOCKER_MANIFEST_V2,
        media_types::OCI_MANIFEST,
    ]
    .join(", ")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestType {
    DockerList,
    OciIndex,
    DockerV2,
    OciManifest,
    LegacySigned,
    Unknown(String),
}

impl ManifestType {
    pub fn from_media_type(media_type: &str) -> Self {
        let media_type = media_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        match media_type.as_str() {
            media_types::DOCKER_MANIFEST_LIST => ManifestType::DockerList,
            media_types::OCI_INDEX => ManifestType::OciIndex,
            media_types::DOCKER_MANIFEST_V2 => ManifestType::DockerV2,
            media_types::OCI_MANIFEST => ManifestType::OciManifest,
            media_types::DOCKER_MANIFEST_V1 | media_types::DOCKER_MANIFEST_V1_SIGNED => {
                ManifestType::LegacySigned
            }
            _ => ManifestType::Unknown(media_type),
        }
    }

    /// Classify a manifest response.
    ///
    /// The `Content-Type` header wins; when it is missing or generic (`application/json`)
    /// the body's `mediaType` field, then its shape, decide.
    pub fn detect(content_type: Option<&str>, body: &[u8]) -> Self {
        if let Some(content_type) = content_type {
            let kind = Self::from_media_type(content_type);
            if !matches!(kind, ManifestType::Unknown(_)) {
                return kind;
            }
        }

        let Ok(value) = serde_json::from_slice::<serde_json::Value>(body) else {
            return ManifestType::Unknown(content_type.unwrap_or_default().to_string());
        };

        if let Some(media_type) = value.get("mediaType").and_then(|m| m.as_str()) {
            let kind = Self::from_media_type(media_type);
            if !matches!(kind, ManifestType::Unknown(_)) {
                return kind;
            }
        }

        if value.get("manifests").is_some() {
            ManifestType::OciIndex
        } else if value.get("layers").is_some() && value.get("config").is_some() {
            ManifestType::OciManifest
        } else if value.get("fsLayers").is_some() {
            ManifestType::LegacySigned
        } else {
            ManifestType::Unknown(content_type.unwrap_or_default().to_string())
        }
    }

    pub fn is_index(&self) -> bool {
        matches!(self, ManifestType::DockerList | ManifestType::OciIndex)
    }

    pub fn is_image_manifest(&self) -> bool {
        matches!(self, ManifestType::DockerV2 | ManifestType::OciManifest)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Platform {
    pub os: String,
    pub architecture: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
}

impl Platform {
    /// `os/architecture`, the form used for matching
    pub fn os_arch(&self) -> String {
        format!("{}/{}", self.os, self.architecture)
    }

    /// Matches `os/architecture`, or `os/architecture/variant` when a variant is requested
    pub fn matches(&self, target: &str) -> bool {
        if target == self.os_arch() {
            return true;
        }
        match &self.variant {
            Some(variant) => target == format!("{}/{}", self.os_arch(), variant),
            None => false,
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.variant {
            Some(variant) => write!(f, "{}/{}", self.os_arch(), variant),
            None => write!(f, "{}", self.os_arch()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestDescriptor {
    #[serde(default)]
    pub media_type: String,
    pub digest: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub platform: Option<Platform>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestList {
    #[serde(default)]
    pub schema_version: u32,
    #[serde(default)]
    pub media_type: Option<String>,
    pub manifests: Vec<ManifestDescriptor>,
}

impl ManifestList {
    pub fn from_slice(body: &[u8]) -> Result<Self> {
        serde_json::from_slice(body)
            .map_err(|e| RegistryError::Decode(format!("Invalid manifest list: {}", e)))
    }

    /// First descriptor, in index order, whose platform matches `target`
    pub fn select(&self, target: &str) -> Option<&ManifestDescriptor> {
        self.manifests
            .iter()
            .find(|m| m.platform.as_ref().is_some_and(|p| p.matches(target)))
    }

    pub fn platforms(&self) -> Vec<String> {
        self.manifests
            .iter()
            .filter_map(|m| m.platform.as_ref().map(|p| p.to_string()))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Descriptor {
    #[serde(default)]
    pub media_type: String,
    pub digest: String,
    #[serde(default)]
    pub size: u64,
    /// Foreign-layer download locations
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub urls: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageManifest {
    #[serde(default)]
    pub schema_version: u32,
    #[serde(default)]
    pub media_type: Option<String>,
    pub config: Descriptor,
    pub layers: Vec<Descriptor>,
}

impl ImageManifest {
    pub fn from_slice(body: &[u8]) -> Result<Self> {
        let manifest: Self = serde_json::from_slice(body)
            .map_err(|e| RegistryError::Decode(format!("Invalid image manifest: {}", e)))?;
        manifest.validate()?;
        Ok(manifest)
    }

    pub fn validate(&self) -> Result<()> {
        if self.config.digest.is_empty() {
            return Err(RegistryError::Decode(
                "Image manifest has no config digest".to_string(),
            ));
        }
        if let Some(layer) = self.layers.iter().find(|l| l.digest.is_empty()) {
            return Err(RegistryError::Decode(format!(
                "Image manifest has a layer without digest ({} bytes)",
                layer.size
            )));
        }
        for descriptor in std::iter::once(&self.config).chain(&self.layers) {
            DigestUtils::validate(&descriptor.digest)
                .map_err(|e| RegistryError::Decode(format!("Invalid image manifest: {}", e)))?;
        }
        Ok(())
    }

    pub fn total_size(&self) -> u64 {
        self.layers.iter().map(|l| l.size).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIST: &str = r#"{
        "schemaVersion": 2,
        "mediaType": "application/vnd.docker.distribution.manifest.list.v2+json",
        "manifests": [
            {"mediaType": "application/vnd.docker.distribution.manifest.v2+json",
             "digest": "sha256:aaa", "size": 1,
             "platform": {"os": "linux", "architecture": "arm", "variant": "v7"}},
            {"mediaType": "application/vnd.docker.distribution.manifest.v2+json",
             "digest": "sha256:bbb", "size": 1,
             "platform": {"os": "linux", "architecture": "amd64"}},
            {"mediaType": "application/vnd.docker.distribution.manifest.v2+json",
             "digest": "sha256:ccc", "size": 1,
             "platform": {"os": "linux", "architecture": "amd64"}},
            {"mediaType": "application/vnd.oci.image.manifest.v1+json",
             "digest": "sha256:ddd", "size": 1}
        ]
    }"#;

    #[test]
    fn content_type_parameters_are_ignored() {
        assert_eq!(
            ManifestType::from_media_type(
                "application/vnd.docker.distribution.manifest.v2+json; charset=utf-8"
            ),
            ManifestType::DockerV2
        );
        assert!(ManifestType::from_media_type(media_types::OCI_INDEX).is_index());
        assert_eq!(
            ManifestType::from_media_type(media_types::DOCKER_MANIFEST_V1_SIGNED),
            ManifestType::LegacySigned
        );
    }

    #[test]
    fn generic_content_type_falls_back_to_body() {
        assert_eq!(
            ManifestType::detect(Some("application/json"), LIST.as_bytes()),
            ManifestType::DockerList
        );
        assert_eq!(
            ManifestType::detect(None, br#"{"manifests": []}"#),
            ManifestType::OciIndex
        );
        assert_eq!(
            ManifestType::detect(None, br#"{"config": {"digest": "x"}, "layers": []}"#),
            ManifestType::OciManifest
        );
        assert!(matches!(
            ManifestType::detect(Some("text/plain"), b"not json"),
            ManifestType::Unknown(_)
        ));
    }

    #[test]
    fn first_matching_platform_wins() {
        let list = ManifestList::from_slice(LIST.as_bytes()).unwrap();
        assert_eq!(list.select("linux/amd64").unwrap().digest, "sha256:bbb");
        assert_eq!(list.select("linux/arm/v7").unwrap().digest, "sha256:aaa");
        assert_eq!(list.select("linux/arm").unwrap().digest, "sha256:aaa");
        assert!(list.select("linux/s390x").is_none());
        assert_eq!(
            list.platforms(),
            vec!["linux/arm/v7", "linux/amd64", "linux/amd64"]
        );
    }

    const CONFIG: &str = "sha256:cccccccccccccccccccccccccccccccccccccccccccccccccccccccccccccccc";
    const FIRST: &str = "sha256:1111111111111111111111111111111111111111111111111111111111111111";
    const SECOND: &str = "sha256:2222222222222222222222222222222222222222222222222222222222222222";

    fn manifest_body(layer_digest: &str) -> String {
        format!(
            r#"{{
            "schemaVersion": 2,
            "config": {{"mediaType": "application/vnd.docker.container.image.v1+json", "digest": "{}", "size": 7}},
            "layers": [
                {{"digest": "{}", "size": 10}},
                {{"digest": "{}", "size": 5, "urls": ["https://cdn.example.com/l2"]}}
            ]
        }}"#,
            CONFIG, layer_digest, SECOND
        )
    }

    #[test]
    fn image_manifest_requires_config_digest() {
        let body = br#"{"schemaVersion": 2, "config": {"digest": ""}, "layers": []}"#;
        assert!(ImageManifest::from_slice(body).is_err());

        let manifest = ImageManifest::from_slice(manifest_body(FIRST).as_bytes()).unwrap();
        assert_eq!(manifest.config.digest, CONFIG);
        assert_eq!(manifest.layers.len(), 2);
        assert_eq!(manifest.layers[1].urls, vec!["https://cdn.example.com/l2"]);
        assert_eq!(manifest.total_size(), 15);
    }

    #[test]
    fn malformed_layer_digests_are_rejected() {
        for digest in ["sha256:l1", "sha256:ééééééééééééé", "sha256:../../tags/list", "nodigest"] {
            let err = ImageManifest::from_slice(manifest_body(digest).as_bytes()).unwrap_err();
            assert!(matches!(err, RegistryError::Decode(_)), "{} accepted", digest);
        }
    }

    #[test]
    fn default_accept_offers_index_types() {
        let accept = default_accept();
        assert!(accept.contains(media_types::DOCKER_MANIFEST_LIST));
        assert!(accept.contains(media_types::OCI_INDEX));
    }
}
