//! Configuration management module
//!
//! [`ClientConfig`] describes how to talk to a registry (endpoint, transport, credentials),
//! [`PullConfig`] describes what one install run should produce.

use crate::error::handlers::ValidationErrorHandler;
use crate::error::{RegistryError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const DEFAULT_REGISTRY: &str = "registry-1.docker.io";
pub const DEFAULT_AUTH_URL: &str = "https://auth.docker.io/token";
pub const DEFAULT_AUTH_SERVICE: &str = "registry.docker.io";
pub const DEFAULT_PLATFORM: &str = "linux/amd64";
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub username: String,
    pub password: String,
}

impl AuthConfig {
    pub fn new(username: String, password: String) -> Self {
        Self { username, password }
    }

    pub fn validate(&self) -> Result<()> {
        if self.username.is_empty() {
            return Err(RegistryError::Validation(
                "Username cannot be empty".to_string(),
            ));
        }
        if self.password.is_empty() {
            return Err(RegistryError::Validation(
                "Password cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Registry endpoint, transport and credentials shared by every request of a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Registry host (`registry-1.docker.io`, `localhost:5000`) or base URL
    pub registry: String,
    pub proxy: Option<String>,
    pub skip_tls: bool,
    /// Request timeout in seconds; `None` keeps the transport default
    pub timeout: Option<u64>,
    pub auth: Option<AuthConfig>,
    /// Token realm used when the registry challenge is absent or malformed
    pub fallback_realm: String,
    /// Token service used when the registry challenge is absent or malformed
    pub fallback_service: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new(DEFAULT_REGISTRY.to_string())
    }
}

impl ClientConfig {
    pub fn new(registry: String) -> Self {
        Self {
            registry,
            proxy: None,
            skip_tls: false,
            timeout: None,
            auth: None,
            fallback_realm: DEFAULT_AUTH_URL.to_string(),
            fallback_service: DEFAULT_AUTH_SERVICE.to_string(),
        }
    }

    pub fn with_registry(mut self, registry: String) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_proxy(mut self, proxy: Option<String>) -> Self {
        self.proxy = proxy;
        self
    }

    pub fn with_skip_tls(mut self, skip_tls: bool) -> Self {
        self.skip_tls = skip_tls;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<u64>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_auth(mut self, auth: Option<AuthConfig>) -> Self {
        self.auth = auth;
        self
    }

    /// Base URL of the registry without a trailing slash.
    ///
    /// Bare hosts are addressed over https.
    pub fn registry_url(&self) -> Result<String> {
        let raw = self.registry.trim().trim_end_matches('/');
        let candidate = if raw.contains("://") {
            raw.to_string()
        } else {
            format!("https://{}", raw)
        };

        let parsed = url::Url::parse(&candidate)?;
        if parsed.host_str().is_none() {
            return Err(RegistryError::Validation(format!(
                "Registry address has no host: {}",
                self.registry
            )));
        }
        Ok(candidate)
    }

    pub fn validate(&self) -> Result<()> {
        if self.registry.trim().is_empty() {
            return Err(RegistryError::Validation(
                "Registry address cannot be empty".to_string(),
            ));
        }
        self.registry_url()?;

        if let Some(proxy) = &self.proxy {
            url::Url::parse(proxy).map_err(|e| {
                RegistryError::Validation(format!("Invalid proxy address {}: {}", proxy, e))
            })?;
        }

        if self.timeout == Some(0) {
            return Err(RegistryError::Validation(
                "Timeout must be greater than 0".to_string(),
            ));
        }

        if let Some(auth) = &self.auth {
            auth.validate()?;
        }

        Ok(())
    }
}

/// Settings for one install run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullConfig {
    /// Requested `os/architecture`
    pub platform: String,
    /// Maximum number of layer downloads in flight
    pub concurrency: usize,
    /// Directory that receives the working directory and the final archive
    pub output_dir: PathBuf,
    /// Print the manifest (list) instead of downloading
    pub print_only: bool,
}

impl Default for PullConfig {
    fn default() -> Self {
        Self {
            platform: DEFAULT_PLATFORM.to_string(),
            concurrency: DEFAULT_CONCURRENCY,
            output_dir: PathBuf::from("."),
            print_only: false,
        }
    }
}

impl PullConfig {
    pub fn with_platform(mut self, platform: String) -> Self {
        self.platform = platform;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_output_dir(mut self, output_dir: PathBuf) -> Self {
        self.output_dir = output_dir;
        self
    }

    pub fn with_print_only(mut self, print_only: bool) -> Self {
        self.print_only = print_only;
        self
    }

    pub fn validate(&self) -> Result<()> {
        ValidationErrorHandler::validate_platform(&self.platform)?;
        ValidationErrorHandler::validate_concurrency(self.concurrency)
    }
}
