//! Manifest operations for registry client
//!
//! Resolves `GET /v2/{name}/manifests/{reference}` down to a single image manifest:
//! - manifest lists and OCI indexes are narrowed to the requested platform
//! - legacy signed v1 manifests are re-requested as Docker v2
//! - a 404 is retried once asking only for a manifest list

use crate::error::handlers::HttpErrorHandler;
use crate::error::{RegistryError, Result};
use crate::image::manifest::{
    ImageManifest, ManifestList, ManifestType, default_accept, media_types,
};
use crate::logging::Logger;
use crate::registry::auth::AuthToken;
use crate::registry::client::RegistryClient;
use reqwest::StatusCode;
use reqwest::header::{CONTENT_TYPE, HeaderMap};

/// Outcome of manifest resolution
#[derive(Debug, Clone)]
pub enum Resolution {
    /// The platform-specific image manifest plus headers for blob requests
    Resolved {
        manifest: ImageManifest,
        headers: HeaderMap,
    },
    /// Print-only mode: the raw body that was printed instead of downloading
    Printed(String),
}

struct ManifestResponse {
    kind: ManifestType,
    body: Vec<u8>,
}

#[derive(Clone)]
pub struct ManifestOperations {
    client: RegistryClient,
    output: Logger,
}

impl ManifestOperations {
    pub fn new(client: RegistryClient, output: Logger) -> Self {
        Self { client, output }
    }

    pub async fn resolve(
        &self,
        repository: &str,
        tag: &str,
        platform: &str,
        token: &AuthToken,
        print_only: bool,
    ) -> Result<Resolution> {
        self.output
            .step(&format!("Fetching manifest for {}:{}", repository, tag));
        let headers = token.headers()?;

        let mut current = self.fetch_tag(repository, tag, &headers).await?;

        if current.kind == ManifestType::LegacySigned {
            self.output
                .info("Registry answered with a legacy signed manifest, requesting Docker v2");
            current = self
                .fetch(repository, tag, media_types::DOCKER_MANIFEST_V2, &headers)
                .await?;
        }

        if current.kind.is_index() {
            let list = ManifestList::from_slice(&current.body)?;
            for descriptor in &list.manifests {
                match &descriptor.platform {
                    Some(p) => self
                        .output
                        .info(&format!("Platform {} -> {}", p, descriptor.digest)),
                    None => self
                        .output
                        .detail(&format!("Descriptor without platform: {}", descriptor.digest)),
                }
            }

            if print_only {
                return Ok(Resolution::Printed(body_text(&current.body)));
            }

            let descriptor = list.select(platform).ok_or_else(|| {
                RegistryError::ArchitectureNotFound {
                    platform: platform.to_string(),
                    available: list.platforms(),
                }
            })?;
            self.output.success(&format!(
                "Selected {} for platform {}",
                descriptor.digest, platform
            ));

            let accept = if descriptor.media_type.is_empty() {
                format!(
                    "{}, {}",
                    media_types::DOCKER_MANIFEST_V2,
                    media_types::OCI_MANIFEST
                )
            } else {
                descriptor.media_type.clone()
            };
            current = self
                .fetch(repository, &descriptor.digest, &accept, &headers)
                .await?;
        }

        if !current.kind.is_image_manifest() {
            return Err(RegistryError::Decode(format!(
                "Unsupported manifest type for {}:{}: {:?}",
                repository, tag, current.kind
            )));
        }

        if print_only {
            return Ok(Resolution::Printed(body_text(&current.body)));
        }

        let manifest = ImageManifest::from_slice(&current.body)?;
        self.output.success(&format!(
            "Manifest resolved: {} layers, {}",
            manifest.layers.len(),
            self.output.format_size(manifest.total_size())
        ));

        Ok(Resolution::Resolved { manifest, headers })
    }

    /// First request for the tag, with the one-off manifest-list retry on 404
    async fn fetch_tag(
        &self,
        repository: &str,
        tag: &str,
        headers: &HeaderMap,
    ) -> Result<ManifestResponse> {
        let response = self
            .client
            .get_manifest(repository, tag, &default_accept(), headers)
            .await?;

        if response.status() != StatusCode::NOT_FOUND {
            return self.read(response, repository, tag).await;
        }

        let text = response.text().await.unwrap_or_default();
        self.output.error(&format!(
            "Manifest {}:{} not found: {}",
            repository,
            tag,
            text.trim()
        ));
        self.output
            .info("Retrying once with the manifest list media type");

        let retry = self
            .client
            .get_manifest(repository, tag, media_types::DOCKER_MANIFEST_LIST, headers)
            .await?;
        let status = retry.status();
        if status == StatusCode::OK {
            self.output.info("Manifest list retry answered HTTP 200");
            return self.read(retry, repository, tag).await;
        }

        let retry_text = retry.text().await.unwrap_or_default();
        self.output.error(&format!(
            "Manifest list retry answered HTTP {}: {}",
            status.as_u16(),
            retry_text.trim()
        ));
        Err(HttpErrorHandler::handle_manifest_error(
            StatusCode::NOT_FOUND,
            &text,
            &format!("{}:{}", repository, tag),
        ))
    }

    async fn fetch(
        &self,
        repository: &str,
        reference: &str,
        accept: &str,
        headers: &HeaderMap,
    ) -> Result<ManifestResponse> {
        let response = self
            .client
            .get_manifest(repository, reference, accept, headers)
            .await?;
        self.read(response, repository, reference).await
    }

    async fn read(
        &self,
        response: reqwest::Response,
        repository: &str,
        reference: &str,
    ) -> Result<ManifestResponse> {
        let status = response.status();
        if status != StatusCode::OK {
            let text = response.text().await.unwrap_or_default();
            self.output.error(&format!(
                "Manifest request for {}:{} failed with HTTP {}",
                repository,
                reference,
                status.as_u16()
            ));
            return Err(HttpErrorHandler::handle_manifest_error(
                status,
                &text,
                &format!("{}:{}", repository, reference),
            ));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.bytes().await?.to_vec();
        let kind = ManifestType::detect(content_type.as_deref(), &body);
        self.output.detail(&format!(
            "Manifest {}:{} is {:?} ({} bytes)",
            repository,
            reference,
            kind,
            body.len()
        ));

        Ok(ManifestResponse { kind, body })
    }
}

fn body_text(body: &[u8]) -> String {
    String::from_utf8_lossy(body).into_owned()
}
