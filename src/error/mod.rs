//! Error types and handlers for registry pull operations

pub mod handlers;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RegistryError>;

#[derive(Debug, Clone, Error)]
pub enum RegistryError {
    /// Challenge parsing or token exchange failed
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Manifest request answered with a non-200 status
    #[error("Cannot fetch manifest for {reference} (HTTP {status}): {message}")]
    ManifestFetch {
        reference: String,
        status: u16,
        message: String,
    },

    /// No manifest-list entry matches the requested platform
    #[error("No manifest found for platform {platform} (available: {})", .available.join(", "))]
    ArchitectureNotFound {
        platform: String,
        available: Vec<String>,
    },

    /// A layer blob could not be fetched from the registry or its fallback URL
    #[error("Layer {} ({digest}) download failed: {message}", .index + 1)]
    LayerDownload {
        index: usize,
        digest: String,
        message: String,
    },

    /// The image config blob could not be fetched
    #[error("Cannot fetch blob {digest} (HTTP {status}): {message}")]
    BlobFetch {
        digest: String,
        status: u16,
        message: String,
    },

    /// Malformed JSON at any protocol step
    #[error("Decode error: {0}")]
    Decode(String),

    /// Filesystem failure while building the output archive
    #[error("Archive write error: {0}")]
    ArchiveWrite(String),

    /// The repository has no tags to list
    #[error("No tags found for repository {0}")]
    NoTags(String),

    /// Network related errors
    #[error("Network error: {0}")]
    Network(String),

    /// Request timed out
    #[error("Timeout: {0}")]
    Timeout(String),

    /// File IO errors
    #[error("IO error: {0}")]
    Io(String),

    /// Invalid user input or configuration
    #[error("Validation error: {0}")]
    Validation(String),
}

impl RegistryError {
    /// Failures that are expected outcomes of a user request rather than faults.
    pub fn is_informational(&self) -> bool {
        matches!(
            self,
            RegistryError::ArchitectureNotFound { .. } | RegistryError::NoTags(_)
        )
    }
}

impl From<std::io::Error> for RegistryError {
    fn from(err: std::io::Error) -> Self {
        RegistryError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for RegistryError {
    fn from(err: serde_json::Error) -> Self {
        RegistryError::Decode(err.to_string())
    }
}

impl From<reqwest::Error> for RegistryError {
    fn from(err: reqwest::Error) -> Self {
        handlers::NetworkErrorHandler::handle_network_error(&err, "registry request")
    }
}

impl From<url::ParseError> for RegistryError {
    fn from(err: url::ParseError) -> Self {
        RegistryError::Validation(err.to_string())
    }
}

impl From<walkdir::Error> for RegistryError {
    fn from(err: walkdir::Error) -> Self {
        RegistryError::ArchiveWrite(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn informational_errors_are_flagged() {
        let arch = RegistryError::ArchitectureNotFound {
            platform: "linux/s390x".to_string(),
            available: vec!["linux/amd64".to_string()],
        };
        assert!(arch.is_informational());
        assert!(RegistryError::NoTags("library/nginx".to_string()).is_informational());
        assert!(!RegistryError::Auth("denied".to_string()).is_informational());
    }

    #[test]
    fn layer_download_message_is_one_based() {
        let err = RegistryError::LayerDownload {
            index: 0,
            digest: "sha256:abc".to_string(),
            message: "HTTP 500".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Layer 1 (sha256:abc) download failed: HTTP 500"
        );
    }

    #[test]
    fn architecture_error_lists_available_platforms() {
        let err = RegistryError::ArchitectureNotFound {
            platform: "linus/amd64".to_string(),
            available: vec!["linux/arm64".to_string(), "linux/amd64".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "No manifest found for platform linus/amd64 (available: linux/arm64, linux/amd64)"
        );
    }
}
