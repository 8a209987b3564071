//! Image manager
//!
//! Drives one install run: authenticate, resolve the manifest, fetch the layers into
//! the working directory and build the archive. Also hosts the tag listing mode,
//! which shares the authentication step.

use crate::config::{ClientConfig, PullConfig};
use crate::error::Result;
use crate::image::archive::ArchiveBuilder;
use crate::image::fetcher::{FetchOutcome, LayerFetcher};
use crate::logging::Logger;
use crate::reference::Reference;
use crate::registry::{
    Auth, AuthToken, ManifestOperations, RegistryClient, RepositoryOperations, Resolution,
};
use std::path::PathBuf;

/// What an install run produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallOutcome {
    /// Path of the `docker load`-compatible archive
    Archived(PathBuf),
    /// Print-only mode: the manifest (list) body
    Printed(String),
}

pub struct ImageManager {
    client_config: ClientConfig,
    pull_config: PullConfig,
    output: Logger,
}

impl ImageManager {
    pub fn new(client_config: ClientConfig, pull_config: PullConfig, output: Logger) -> Self {
        Self {
            client_config,
            pull_config,
            output,
        }
    }

    /// Registry settings for `reference`; a registry named in the reference wins
    fn client_config_for(&self, reference: &Reference) -> ClientConfig {
        match &reference.registry {
            Some(registry) => self.client_config.clone().with_registry(registry.clone()),
            None => self.client_config.clone(),
        }
    }

    async fn connect(&self, reference: &Reference) -> Result<(RegistryClient, AuthToken)> {
        let config = self.client_config_for(reference);
        let client = RegistryClient::from_config(&config, self.output.clone())?;
        self.output
            .info(&format!("Registry: {}", client.address()));

        let token = Auth::new(client.clone(), self.output.clone())
            .with_fallback(config.fallback_realm.clone(), config.fallback_service.clone())
            .authenticate(&reference.repository, config.auth.as_ref())
            .await?;
        Ok((client, token))
    }

    /// Download `reference` and package it as `<output_dir>/tmp_<repo>_<tag>-img.tar.gz`
    pub async fn install(&self, reference: &Reference) -> Result<InstallOutcome> {
        self.pull_config.validate()?;
        self.output.section(&format!("Pulling {}", reference));

        let (client, token) = self.connect(reference).await?;

        let resolution = ManifestOperations::new(client.clone(), self.output.clone())
            .resolve(
                &reference.repository,
                &reference.tag,
                &self.pull_config.platform,
                &token,
                self.pull_config.print_only,
            )
            .await?;

        let (manifest, headers) = match resolution {
            Resolution::Printed(body) => return Ok(InstallOutcome::Printed(body)),
            Resolution::Resolved { manifest, headers } => (manifest, headers),
        };

        let work_dir = self
            .pull_config
            .output_dir
            .join(reference.working_dir_name());
        let fetcher = LayerFetcher::new(
            client,
            reference.repository.clone(),
            work_dir.clone(),
            self.output.clone(),
        )
        .with_concurrency(self.pull_config.concurrency);
        let archive = ArchiveBuilder::new(work_dir, reference.clone(), self.output.clone());

        let path = match fetcher.fetch(&manifest, &headers).await? {
            FetchOutcome::AlreadyMaterialized => archive.package().await?,
            FetchOutcome::Fetched(image) => archive.build(&image).await?,
        };

        self.output.success(&format!(
            "Pulled {} in {}",
            reference,
            self.output.elapsed_time()
        ));
        Ok(InstallOutcome::Archived(path))
    }

    /// Tags of `reference`'s repository
    pub async fn list_tags(&self, reference: &Reference) -> Result<Vec<String>> {
        self.output
            .section(&format!("Tags of {}", reference.repository));
        let (client, token) = self.connect(reference).await?;
        RepositoryOperations::new(client, self.output.clone())
            .list_tags(&reference.repository, &token)
            .await
    }
}
