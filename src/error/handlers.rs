//! Standardized error handling patterns shared by registry operations

use crate::error::RegistryError;
use reqwest::StatusCode;

/// Standard error handler for HTTP responses
pub struct HttpErrorHandler;

impl HttpErrorHandler {
    /// Handle manifest-related HTTP errors with standardized messages
    pub fn handle_manifest_error(
        status: StatusCode,
        error_text: &str,
        reference: &str,
    ) -> RegistryError {
        let message = match status.as_u16() {
            401 => format!("invalid or expired access token: {}", error_text),
            403 => format!("access denied: {}", error_text),
            404 => format!("manifest unknown: {}", error_text),
            429 => format!("rate limited by registry: {}", error_text),
            500 => format!("registry server error: {}", error_text),
            502 | 503 => format!("registry unavailable: {}", error_text),
            _ => error_text.to_string(),
        };

        RegistryError::ManifestFetch {
            reference: reference.to_string(),
            status: status.as_u16(),
            message,
        }
    }

    /// Handle authentication-related HTTP errors
    pub fn handle_auth_error(status: StatusCode, error_text: &str) -> RegistryError {
        let error_msg = match status.as_u16() {
            400 => "Invalid token request parameters".to_string(),
            401 => "Invalid credentials provided".to_string(),
            403 => "Access denied - insufficient permissions".to_string(),
            404 => "Authentication endpoint not found".to_string(),
            _ => format!("Token request failed (status {}): {}", status, error_text),
        };

        RegistryError::Auth(error_msg)
    }

    /// Handle blob-related HTTP errors
    pub fn handle_blob_error(
        status: StatusCode,
        error_text: &str,
        index: usize,
        digest: &str,
    ) -> RegistryError {
        let message = match status.as_u16() {
            401 => format!("unauthorized (HTTP 401): {}", error_text),
            404 => format!("blob unknown (HTTP 404): {}", error_text),
            _ => format!("HTTP {}: {}", status.as_u16(), error_text),
        };

        RegistryError::LayerDownload {
            index,
            digest: digest.to_string(),
            message,
        }
    }
}

/// Network error categorization and handling
pub struct NetworkErrorHandler;

impl NetworkErrorHandler {
    /// Categorize and format network errors with helpful context
    pub fn handle_network_error(error: &reqwest::Error, context: &str) -> RegistryError {
        if error.is_timeout() {
            RegistryError::Timeout(format!("{} timeout: {}", context, error))
        } else if error.is_connect() {
            RegistryError::Network(format!("Connection error during {}: {}", context, error))
        } else if error.is_decode() {
            RegistryError::Decode(format!("{}: {}", context, error))
        } else if error.to_string().contains("certificate") {
            RegistryError::Network(format!(
                "TLS certificate error during {}: {}",
                context, error
            ))
        } else {
            RegistryError::Network(format!("{} network error: {}", context, error))
        }
    }
}

/// Validation error utilities
pub struct ValidationErrorHandler;

impl ValidationErrorHandler {
    /// Both or neither of username and password must be present
    pub fn validate_credentials(
        username: &Option<String>,
        password: &Option<String>,
    ) -> Result<(), RegistryError> {
        match (username, password) {
            (Some(_), None) => Err(RegistryError::Validation(
                "Password is required when username is provided".to_string(),
            )),
            (None, Some(_)) => Err(RegistryError::Validation(
                "Username is required when password is provided".to_string(),
            )),
            _ => Ok(()),
        }
    }

    /// Platform strings take the form `os/architecture`
    pub fn validate_platform(platform: &str) -> Result<(), RegistryError> {
        match platform.split_once('/') {
            Some((os, arch)) if !os.is_empty() && !arch.is_empty() => Ok(()),
            _ => Err(RegistryError::Validation(format!(
                "Platform must look like os/architecture, got '{}'",
                platform
            ))),
        }
    }

    pub fn validate_concurrency(concurrency: usize) -> Result<(), RegistryError> {
        if concurrency == 0 {
            return Err(RegistryError::Validation(
                "Concurrency must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifest_401_mentions_token() {
        let err = HttpErrorHandler::handle_manifest_error(
            StatusCode::UNAUTHORIZED,
            "UNAUTHORIZED",
            "library/nginx:latest",
        );
        assert!(matches!(err, RegistryError::ManifestFetch { status: 401, .. }));
        assert!(err.to_string().contains("expired access token"));
    }

    #[test]
    fn credentials_must_come_in_pairs() {
        assert!(ValidationErrorHandler::validate_credentials(&None, &None).is_ok());
        assert!(
            ValidationErrorHandler::validate_credentials(&Some("u".into()), &Some("p".into()))
                .is_ok()
        );
        assert!(ValidationErrorHandler::validate_credentials(&Some("u".into()), &None).is_err());
        assert!(ValidationErrorHandler::validate_credentials(&None, &Some("p".into())).is_err());
    }

    #[test]
    fn platform_shape_is_checked() {
        assert!(ValidationErrorHandler::validate_platform("linux/amd64").is_ok());
        assert!(ValidationErrorHandler::validate_platform("linux/arm/v7").is_ok());
        assert!(ValidationErrorHandler::validate_platform("amd64").is_err());
        assert!(ValidationErrorHandler::validate_platform("/amd64").is_err());
    }
}
