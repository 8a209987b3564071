//! Image handling: manifest models, legacy metadata, layer fetching and archiving
//!
//! An install run flows through [`ImageManager`]: the resolved [`ImageManifest`] is
//! handed to [`LayerFetcher`], which fills the working directory, and
//! [`ArchiveBuilder`] turns that directory into a `docker load`-compatible archive.

pub mod archive;
pub mod digest;
pub mod fetcher;
pub mod image_manager;
pub mod legacy;
pub mod manifest;

pub use archive::ArchiveBuilder;
pub use digest::DigestUtils;
pub use fetcher::{FetchOutcome, FetchedImage, LayerFetcher, LayerRecord};
pub use image_manager::{ImageManager, InstallOutcome};
pub use legacy::{ContainerConfig, LegacyLayerMetadata, PackageConfig};
pub use manifest::{ImageManifest, ManifestList, ManifestType, Platform};
