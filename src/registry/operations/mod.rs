//! Registry operations, one module per endpoint family

pub mod blob_operations;
pub mod manifest_operations;
pub mod repository_operations;

pub use blob_operations::BlobOperations;
pub use manifest_operations::{ManifestOperations, Resolution};
pub use repository_operations::RepositoryOperations;
