//! Repository operations for registry client
//!
//! Tag listing (`GET /v2/{name}/tags/list`).

use crate::error::{RegistryError, Result};
use crate::logging::Logger;
use crate::registry::auth::AuthToken;
use crate::registry::client::RegistryClient;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct TagList {
    #[serde(default)]
    tags: Option<Vec<String>>,
}

#[derive(Clone)]
pub struct RepositoryOperations {
    client: RegistryClient,
    output: Logger,
}

impl RepositoryOperations {
    pub fn new(client: RegistryClient, output: Logger) -> Self {
        Self { client, output }
    }

    /// List all tags in repository; an empty list is reported as [`RegistryError::NoTags`]
    pub async fn list_tags(&self, repository: &str, token: &AuthToken) -> Result<Vec<String>> {
        self.output
            .step(&format!("Listing tags for repository: {}", repository));

        let response = self
            .client
            .get(&self.client.tags_url(repository), &token.headers()?)
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            self.output
                .error(&format!("Failed to list tags (HTTP {})", status.as_u16()));
            return Err(RegistryError::ManifestFetch {
                reference: format!("{} tags", repository),
                status: status.as_u16(),
                message: text,
            });
        }

        let body = response.bytes().await?;
        let list: TagList = serde_json::from_slice(&body)
            .map_err(|e| RegistryError::Decode(format!("Failed to parse tags response: {}", e)))?;

        let tags = list.tags.unwrap_or_default();
        if tags.is_empty() {
            return Err(RegistryError::NoTags(repository.to_string()));
        }

        self.output.success(&format!(
            "Found {} tags for repository {}",
            tags.len(),
            repository
        ));
        Ok(tags)
    }
}
