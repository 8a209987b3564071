//! Archive builder
//!
//! Writes `manifest.json` and `repositories` for a fetched chain, then packs the
//! working directory into `<workdir>-img.tar.gz`. The archive is written next to its
//! final name and renamed once complete.

use crate::error::{RegistryError, Result};
use crate::image::fetcher::{FetchedImage, MANIFEST_FILE, REPOSITORIES_FILE};
use crate::image::legacy::{PackageConfig, repositories};
use crate::logging::Logger;
use crate::reference::Reference;
use flate2::Compression;
use flate2::write::GzEncoder;
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub const ARCHIVE_SUFFIX: &str = "-img.tar.gz";

fn archive_error(context: &str, path: &Path, e: impl std::fmt::Display) -> RegistryError {
    RegistryError::ArchiveWrite(format!("{} {}: {}", context, path.display(), e))
}

pub struct ArchiveBuilder {
    work_dir: PathBuf,
    reference: Reference,
    output: Logger,
}

impl ArchiveBuilder {
    pub fn new(work_dir: PathBuf, reference: Reference, output: Logger) -> Self {
        Self {
            work_dir,
            reference,
            output,
        }
    }

    /// `<workdir>-img.tar.gz`
    pub fn archive_path(&self) -> PathBuf {
        let mut name = self.work_dir.as_os_str().to_owned();
        name.push(ARCHIVE_SUFFIX);
        PathBuf::from(name)
    }

    /// Write the package metadata for `image` and pack the working directory
    pub async fn build(&self, image: &FetchedImage) -> Result<PathBuf> {
        self.write_metadata(image).await?;
        self.package().await
    }

    pub async fn write_metadata(&self, image: &FetchedImage) -> Result<()> {
        let top_layer_id = image.top_layer_id().ok_or_else(|| {
            RegistryError::ArchiveWrite("Cannot describe an image without layers".to_string())
        })?;

        let package = vec![PackageConfig {
            config: image.config_file.clone(),
            repo_tags: vec![self.reference.repo_tag()],
            layers: image.chain.iter().map(|l| l.layer_path()).collect(),
        }];
        let mut manifest = serde_json::to_vec(&package)?;
        manifest.push(b'\n');
        let manifest_path = self.work_dir.join(MANIFEST_FILE);
        tokio::fs::write(&manifest_path, manifest)
            .await
            .map_err(|e| archive_error("Cannot write", &manifest_path, e))?;

        let mut repos =
            serde_json::to_vec(&repositories(
            &self.reference.repository,
            &self.reference.tag,
            top_layer_id,
        ))?;
        repos.push(b'\n');
        let repos_path = self.work_dir.join(REPOSITORIES_FILE);
        tokio::fs::write(&repos_path, repos)
            .await
            .map_err(|e| archive_error("Cannot write", &repos_path, e))?;

        self.output.detail(&format!(
            "Wrote {} and {} ({} layers, top {})",
            MANIFEST_FILE,
            REPOSITORIES_FILE,
            image.chain.len(),
            top_layer_id
        ));
        Ok(())
    }

    /// Pack the working directory as it is on disk
    pub async fn package(&self) -> Result<PathBuf> {
        let destination = self.archive_path();
        let mut part = destination.as_os_str().to_owned();
        part.push(".part");
        let part = PathBuf::from(part);

        self.output
            .step(&format!("Creating archive {}", destination.display()));

        let source = self.work_dir.clone();
        let target = part.clone();
        let entries = tokio::task::spawn_blocking(move || write_dir_to_tar_gz(&source, &target))
            .await
            .map_err(|e| RegistryError::ArchiveWrite(format!("Archive task failed: {}", e)))??;

        tokio::fs::rename(&part, &destination)
            .await
            .map_err(|e| archive_error("Cannot publish", &destination, e))?;

        let size = tokio::fs::metadata(&destination)
            .await
            .map(|m| m.len())
            .unwrap_or_default();
        self.output.success(&format!(
            "Archive {} ready: {} entries, {}",
            destination.display(),
            entries,
            self.output.format_size(size)
        ));
        Ok(destination)
    }
}

/// Pack `source` into a gzip-compressed tar at `destination`.
///
/// Entries are visited in file-name order and named by their forward-slash path
/// relative to `source`; the root itself is not an entry. Returns the entry count.
pub fn write_dir_to_tar_gz(source: &Path, destination: &Path) -> Result<usize> {
    let file =
        File::create(destination).map_err(|e| archive_error("Cannot create", destination, e))?;
    let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));
    let mut entries = 0;

    for entry in WalkDir::new(source)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
    {
        let entry = entry?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(|e| archive_error("Cannot relativize", entry.path(), e))?;
        let name = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        let appended: io::Result<()> = if entry.file_type().is_dir() {
            builder.append_dir(&name, entry.path())
        } else {
            builder.append_path_with_name(entry.path(), &name)
        };
        appended.map_err(|e| archive_error("Cannot add", entry.path(), e))?;
        entries += 1;
    }

    let mut encoder = builder
        .into_inner()
        .map_err(|e| archive_error("Cannot finish", destination, e))?;
    encoder
        .flush()
        .map_err(|e| archive_error("Cannot flush", destination, e))?;
    encoder
        .finish()
        .and_then(|file| file.sync_all())
        .map_err(|e| archive_error("Cannot finish", destination, e))?;

    Ok(entries)
}
