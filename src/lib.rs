//! Docker Image Getter Library
//!
//! Pulls an image from a Docker Distribution v2 / OCI registry and writes it as a
//! `docker load`-compatible archive, without a container runtime.
//!
//! ```no_run
//! use docker_image_getter::config::{ClientConfig, PullConfig};
//! use docker_image_getter::image::{ImageManager, InstallOutcome};
//! use docker_image_getter::logging::Logger;
//! use docker_image_getter::reference::Reference;
//!
//! # async fn example() -> docker_image_getter::Result<()> {
//! let reference = Reference::parse("alpine:3.19", None)?;
//! let manager = ImageManager::new(ClientConfig::default(), PullConfig::default(), Logger::new(false));
//! if let InstallOutcome::Archived(path) = manager.install(&reference).await? {
//!     println!("{}", path.display());
//! }
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod config;
pub mod error;
pub mod image;
pub mod logging;
pub mod reference;
pub mod registry;

pub use config::{AuthConfig, ClientConfig, PullConfig};
pub use error::{RegistryError, Result};
pub use image::{ImageManager, InstallOutcome};
pub use logging::Logger;
pub use reference::Reference;
