//! Blob operations for registry client
//!
//! `GET /v2/{name}/blobs/{digest}` for the image config and for layers. A layer that
//! the registry refuses is retried once from the first foreign URL of its descriptor.

use crate::error::handlers::HttpErrorHandler;
use crate::error::{RegistryError, Result};
use crate::image::manifest::Descriptor;
use crate::logging::Logger;
use crate::registry::client::RegistryClient;
use reqwest::header::HeaderMap;
use reqwest::{Response, StatusCode};

#[derive(Debug, Clone)]
pub struct BlobOperations {
    client: RegistryClient,
    repository: String,
    output: Logger,
}

impl BlobOperations {
    pub fn new(client: RegistryClient, repository: String, output: Logger) -> Self {
        Self {
            client,
            repository,
            output,
        }
    }

    /// Download a small blob (the image config) into memory
    pub async fn pull_blob(&self, digest: &str, headers: &HeaderMap) -> Result<Vec<u8>> {
        self.output.detail(&format!("Pulling blob {}", digest));
        let response = self
            .client
            .get_blob(&self.repository, digest, headers)
            .await?;

        let status = response.status();
        if status != StatusCode::OK {
            let text = response.text().await.unwrap_or_default();
            return Err(RegistryError::BlobFetch {
                digest: digest.to_string(),
                status: status.as_u16(),
                message: text,
            });
        }

        Ok(response.bytes().await?.to_vec())
    }

    /// Open the response stream of layer `index`, falling back to its first URL
    pub async fn open_layer(
        &self,
        index: usize,
        layer: &Descriptor,
        headers: &HeaderMap,
    ) -> Result<Response> {
        let to_layer_error = |e: RegistryError| RegistryError::LayerDownload {
            index,
            digest: layer.digest.clone(),
            message: e.to_string(),
        };

        let response = self
            .client
            .get_blob(&self.repository, &layer.digest, headers)
            .await
            .map_err(to_layer_error)?;

        let status = response.status();
        if status == StatusCode::OK {
            return Ok(response);
        }

        let Some(url) = layer.urls.first() else {
            let text = response.text().await.unwrap_or_default();
            return Err(HttpErrorHandler::handle_blob_error(
                status,
                text.trim(),
                index,
                &layer.digest,
            ));
        };

        self.output.warning(&format!(
            "Layer {} answered HTTP {}, trying {}",
            index + 1,
            status.as_u16(),
            url
        ));

        // Foreign URLs point outside the registry; the bearer token stays behind.
        let fallback = self
            .client
            .get(url, &HeaderMap::new())
            .await
            .map_err(to_layer_error)?;
        let fallback_status = fallback.status();
        if fallback_status != StatusCode::OK {
            return Err(RegistryError::LayerDownload {
                index,
                digest: layer.digest.clone(),
                message: format!(
                    "registry answered HTTP {}, fallback {} answered HTTP {}",
                    status.as_u16(),
                    url,
                    fallback_status.as_u16()
                ),
            });
        }

        Ok(fallback)
    }
}
