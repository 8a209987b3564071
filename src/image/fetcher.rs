//! Layer fetcher
//!
//! Materializes the config blob and every layer of an image manifest inside the
//! run's working directory, using the legacy `docker save` layout:
//!
//! ```text
//! <configHex>.json
//! <id>/VERSION
//! <id>/json
//! <id>/layer.tar
//! ```
//!
//! Layers are downloaded through [`DownloadPipeline`]. A layer whose `layer.tar`
//! already exists is not requested again, and a working directory that already holds
//! `repositories` is considered complete. A layer only becomes `layer.tar` once its
//! received bytes match the descriptor's `sha256` digest.

use crate::error::{RegistryError, Result};
use crate::image::digest::{DigestUtils, SHA256_PREFIX};
use crate::image::legacy::{LAYER_VERSION, LegacyLayerMetadata};
use crate::image::manifest::{Descriptor, ImageManifest};
use crate::logging::Logger;
use crate::registry::client::RegistryClient;
use crate::registry::operations::BlobOperations;
use crate::registry::pipeline::{DownloadPipeline, IndexedTask, PipelineConfig};
use bytes::Bytes;
use flate2::write::MultiGzDecoder;
use reqwest::header::HeaderMap;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;
use tokio::sync::mpsc;

pub const REPOSITORIES_FILE: &str = "repositories";
pub const MANIFEST_FILE: &str = "manifest.json";
pub const LAYER_FILE: &str = "layer.tar";
const LAYER_PART_FILE: &str = "layer.tar.part";
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
/// Chunks buffered between the network task and the blocking writer
const CHUNK_QUEUE: usize = 32;

/// One entry of the layer chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerRecord {
    pub index: usize,
    /// Legacy layer ID, also the layer's directory name
    pub id: String,
    pub parent: Option<String>,
    pub descriptor: Descriptor,
    /// `layer.tar` was already on disk before this run
    pub present: bool,
}

impl LayerRecord {
    /// Path of the layer tarball relative to the working directory
    pub fn layer_path(&self) -> String {
        format!("{}/{}", self.id, LAYER_FILE)
    }
}

/// Legacy chain for a manifest's layers, base layer first
pub fn build_chain(manifest: &ImageManifest) -> Vec<LayerRecord> {
    let ids = DigestUtils::legacy_layer_chain(manifest.layers.iter().map(|l| l.digest.as_str()));
    let mut parent: Option<String> = None;

    manifest
        .layers
        .iter()
        .zip(ids)
        .enumerate()
        .map(|(index, (descriptor, id))| LayerRecord {
            index,
            id: id.clone(),
            parent: parent.replace(id),
            descriptor: descriptor.clone(),
            present: false,
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct FetchedImage {
    /// `<configHex>.json`
    pub config_file: String,
    pub chain: Vec<LayerRecord>,
}

impl FetchedImage {
    pub fn top_layer_id(&self) -> Option<&str> {
        self.chain.last().map(|l| l.id.as_str())
    }
}

#[derive(Debug, Clone)]
pub enum FetchOutcome {
    /// `repositories` already exists; nothing was requested
    AlreadyMaterialized,
    Fetched(FetchedImage),
}

pub struct LayerFetcher {
    blobs: BlobOperations,
    work_dir: PathBuf,
    concurrency: usize,
    output: Logger,
}

impl LayerFetcher {
    pub fn new(
        client: RegistryClient,
        repository: String,
        work_dir: PathBuf,
        output: Logger,
    ) -> Self {
        Self {
            blobs: BlobOperations::new(client, repository, output.clone()),
            work_dir,
            concurrency: crate::config::DEFAULT_CONCURRENCY,
            output,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub async fn fetch(&self, manifest: &ImageManifest, headers: &HeaderMap) -> Result<FetchOutcome> {
        tokio::fs::create_dir_all(&self.work_dir).await?;

        if self.work_dir.join(REPOSITORIES_FILE).exists() {
            self.output.info(&format!(
                "{} already holds a complete image, skipping downloads",
                self.work_dir.display()
            ));
            return Ok(FetchOutcome::AlreadyMaterialized);
        }

        if manifest.layers.is_empty() {
            return Err(RegistryError::Decode(
                "Image manifest lists no layers".to_string(),
            ));
        }

        let (config_file, config_blob) = self.fetch_config(manifest, headers).await?;
        let top_metadata = LegacyLayerMetadata::from_config_blob(&config_blob)?;

        let mut chain = build_chain(manifest);
        let top_index = chain.len() - 1;
        let mut jobs = Vec::new();

        for record in chain.iter_mut() {
            let dir = self.work_dir.join(&record.id);
            tokio::fs::create_dir_all(&dir).await?;

            if dir.join(LAYER_FILE).exists() {
                record.present = true;
                self.output.info(&format!(
                    "Layer {}/{} {} already downloaded",
                    record.index + 1,
                    top_index + 1,
                    DigestUtils::short(&record.descriptor.digest)
                ));
                continue;
            }

            let metadata = if record.index == top_index {
                top_metadata.clone()
            } else {
                LegacyLayerMetadata::default()
            }
            .with_ids(&record.id, record.parent.as_deref());

            jobs.push(LayerJob {
                record: record.clone(),
                dir,
                metadata,
                blobs: self.blobs.clone(),
                headers: headers.clone(),
                output: self.output.clone(),
            });
        }

        self.output.step(&format!(
            "Downloading {} of {} layers ({} at a time)",
            jobs.len(),
            chain.len(),
            self.concurrency
        ));

        let stats = DownloadPipeline::new(self.output.clone())
            .with_config(PipelineConfig {
                max_concurrent: self.concurrency,
            })
            .execute(jobs, LayerJob::run)
            .await?;

        self.output.success(&format!(
            "{} layers downloaded, {} reused",
            stats.succeeded,
            chain.len() - stats.dispatched
        ));

        Ok(FetchOutcome::Fetched(FetchedImage { config_file, chain }))
    }

    /// Fetch the config blob into `<configHex>.json`
    async fn fetch_config(
        &self,
        manifest: &ImageManifest,
        headers: &HeaderMap,
    ) -> Result<(String, Vec<u8>)> {
        let digest = &manifest.config.digest;
        let config_file = format!("{}.json", DigestUtils::encoded(digest)?);

        self.output
            .step(&format!("Fetching image config {}", DigestUtils::short(digest)));
        let bytes = self.blobs.pull_blob(digest, headers).await?;
        tokio::fs::write(self.work_dir.join(&config_file), &bytes).await?;
        self.output.detail(&format!(
            "Saved {} ({})",
            config_file,
            self.output.format_size(bytes.len() as u64)
        ));

        Ok((config_file, bytes))
    }
}

struct LayerJob {
    record: LayerRecord,
    dir: PathBuf,
    metadata: LegacyLayerMetadata,
    blobs: BlobOperations,
    headers: HeaderMap,
    output: Logger,
}

impl IndexedTask for LayerJob {
    fn index(&self) -> usize {
        self.record.index
    }
}

impl LayerJob {
    async fn run(self) -> Result<()> {
        let index = self.record.index;
        let digest = self.record.descriptor.digest.clone();
        let save_error = |e: io::Error| RegistryError::LayerDownload {
            index,
            digest: digest.clone(),
            message: format!("cannot save layer: {}", e),
        };

        tokio::fs::write(self.dir.join("VERSION"), LAYER_VERSION)
            .await
            .map_err(save_error)?;

        self.output.detail(&format!(
            "Layer {} {} ({})",
            index + 1,
            DigestUtils::short(&digest),
            self.output.format_size(self.record.descriptor.size)
        ));

        let mut response = self
            .blobs
            .open_layer(index, &self.record.descriptor, &self.headers)
            .await?;

        let part = self.dir.join(LAYER_PART_FILE);
        let (tx, rx) = mpsc::channel::<Bytes>(CHUNK_QUEUE);
        let writer = tokio::task::spawn_blocking({
            let part = part.clone();
            move || LayerWriter::new(File::create(&part)?).drain(rx)
        });

        let mut received: u64 = 0;
        let mut interrupted = None;
        loop {
            let chunk = match response.chunk().await {
                Ok(Some(chunk)) => chunk,
                Ok(None) => break,
                Err(e) => {
                    interrupted = Some(e);
                    break;
                }
            };
            received += chunk.len() as u64;
            // A closed channel means the writer failed; its error is reported below.
            if tx.send(chunk).await.is_err() {
                break;
            }
        }
        drop(tx);

        let written = writer.await.map_err(|e| save_error(io::Error::other(e)))?;
        if let Some(e) = interrupted {
            return Err(RegistryError::LayerDownload {
                index,
                digest: digest.clone(),
                message: format!("transfer interrupted after {} bytes: {}", received, e),
            });
        }
        self.verify(&written.map_err(save_error)?)?;

        tokio::fs::write(self.dir.join("json"), self.metadata.to_bytes()?)
            .await
            .map_err(save_error)?;
        tokio::fs::rename(&part, self.dir.join(LAYER_FILE))
            .await
            .map_err(save_error)?;

        self.output.success(&format!(
            "Layer {} {} done ({})",
            index + 1,
            DigestUtils::short(&digest),
            self.output.format_size(received)
        ));
        Ok(())
    }

    /// Compare the hex SHA256 of the received bytes with the descriptor digest
    fn verify(&self, received: &str) -> Result<()> {
        let expected = &self.record.descriptor.digest;
        match expected.strip_prefix(SHA256_PREFIX) {
            Some(encoded) if !encoded.eq_ignore_ascii_case(received) => Err(RegistryError::LayerDownload {
                index: self.record.index,
                digest: expected.clone(),
                message: format!("digest mismatch, received {}{}", SHA256_PREFIX, received),
            }),
            Some(_) => Ok(()),
            None => {
                self.output
                    .debug(&format!("Not verifying {}: only sha256 is checked", expected));
                Ok(())
            }
        }
    }
}

enum Sink {
    Sniffing { file: File, head: Vec<u8> },
    Gzip(MultiGzDecoder<File>),
    Raw(File),
    Closed,
}

/// Writes a layer stream to disk, gunzipping it when it starts with the gzip magic.
///
/// Every gzip member is decoded, and the SHA256 of the bytes as received is kept.
struct LayerWriter {
    sink: Sink,
    hasher: Sha256,
}

impl LayerWriter {
    fn new(file: File) -> Self {
        Self {
            sink: Sink::Sniffing {
                file,
                head: Vec::with_capacity(GZIP_MAGIC.len()),
            },
            hasher: Sha256::new(),
        }
    }

    /// Write every chunk from `chunks`, then finish; returns the hex digest
    fn drain(mut self, mut chunks: mpsc::Receiver<Bytes>) -> io::Result<String> {
        while let Some(chunk) = chunks.blocking_recv() {
            self.write_all(&chunk)?;
        }
        self.finish()
    }

    fn write_all(&mut self, chunk: &[u8]) -> io::Result<()> {
        self.hasher.update(chunk);
        match &mut self.sink {
            Sink::Sniffing { head, .. } => {
                head.extend_from_slice(chunk);
                if head.len() >= GZIP_MAGIC.len() {
                    self.settle()?;
                }
                Ok(())
            }
            Sink::Gzip(decoder) => decoder.write_all(chunk),
            Sink::Raw(file) => file.write_all(chunk),
            Sink::Closed => Err(io::Error::other("layer writer already closed")),
        }
    }

    /// Pick gzip or raw once enough of the stream has been seen
    fn settle(&mut self) -> io::Result<()> {
        let Sink::Sniffing { file, head } = std::mem::replace(&mut self.sink, Sink::Closed) else {
            return Ok(());
        };
        if head.starts_with(&GZIP_MAGIC) {
            let mut decoder = MultiGzDecoder::new(file);
            decoder.write_all(&head)?;
            self.sink = Sink::Gzip(decoder);
        } else {
            let mut file = file;
            file.write_all(&head)?;
            self.sink = Sink::Raw(file);
        }
        Ok(())
    }

    fn finish(mut self) -> io::Result<String> {
        self.settle()?;
        match std::mem::replace(&mut self.sink, Sink::Closed) {
            Sink::Gzip(decoder) => decoder.finish()?.sync_all()?,
            Sink::Raw(mut file) => {
                file.flush()?;
                file.sync_all()?;
            }
            Sink::Sniffing { .. } | Sink::Closed => {}
        }
        Ok(hex::encode(self.hasher.finalize()))
    }
}
