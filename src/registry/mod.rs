//! Registry client, authentication and endpoint operations

pub mod auth;
pub mod client;
pub mod operations;
pub mod pipeline;

pub use auth::{Auth, AuthChallenge, AuthToken};
pub use client::{RegistryClient, RegistryClientBuilder};
pub use operations::{BlobOperations, ManifestOperations, RepositoryOperations, Resolution};
pub use pipeline::{DownloadPipeline, IndexedTask, PipelineConfig, PipelineStats};
