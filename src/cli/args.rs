//! Command-line argument parsing

use crate::config::{AuthConfig, ClientConfig, DEFAULT_CONCURRENCY, DEFAULT_PLATFORM, PullConfig};
use crate::error::handlers::ValidationErrorHandler;
use crate::error::{RegistryError, Result};
use crate::reference::Reference;
use clap::Parser;
use std::path::PathBuf;

pub const ENV_USERNAME: &str = "DGET_USERNAME";
pub const ENV_PASSWORD: &str = "DGET_PASSWORD";
pub const ENV_PROXY: &str = "DGET_PROXY";
pub const ENV_CONCURRENCY: &str = "DGET_CONCURRENCY";
pub const ENV_DEBUG: &str = "DGET_DEBUG";

#[derive(Parser, Debug, Clone)]
#[command(name = "docker-image-getter")]
#[command(about = "Pull an image from a Docker/OCI registry into a docker-load compatible archive")]
#[command(version)]
pub struct Args {
    /// Image to pull, e.g. `nginx`, `bitnami/redis:7` or `ghcr.io/owner/app:v1`
    #[arg(value_name = "IMAGE")]
    pub image: String,

    /// Tag to pull; overrides a `:tag` suffix on IMAGE
    #[arg(value_name = "TAG")]
    pub tag: Option<String>,

    #[arg(
        long = "registry",
        help = "Registry host or URL (default: registry-1.docker.io)"
    )]
    pub registry: Option<String>,

    #[arg(
        long = "arch",
        default_value = DEFAULT_PLATFORM,
        help = "Platform to select from a manifest list, as os/architecture[/variant]"
    )]
    pub arch: String,

    #[arg(
        long = "username",
        short = 'u',
        help = "Username for registry authentication"
    )]
    pub username: Option<String>,

    #[arg(
        long = "password",
        short = 'p',
        help = "Password for registry authentication"
    )]
    pub password: Option<String>,

    #[arg(long = "proxy", help = "HTTP(S) proxy for all requests")]
    pub proxy: Option<String>,

    #[arg(
        long = "concurrency",
        short = 'j',
        help = "Number of layers downloaded at once (default: 4)"
    )]
    pub concurrency: Option<usize>,

    #[arg(
        long = "output-dir",
        short = 'o',
        default_value = ".",
        help = "Directory receiving the working directory and the archive"
    )]
    pub output_dir: PathBuf,

    #[arg(
        long = "print",
        help = "Print the manifest list (or manifest) instead of downloading"
    )]
    pub print: bool,

    #[arg(long = "tags", help = "List the repository's tags instead of downloading")]
    pub tags: bool,

    #[arg(
        long = "skip-tls",
        short = 'k',
        help = "Skip TLS certificate verification"
    )]
    pub skip_tls: bool,

    #[arg(long = "timeout", help = "Timeout for each request in seconds")]
    pub timeout: Option<u64>,

    #[arg(long = "debug", short = 'd', help = "Enable debug logging")]
    pub debug: bool,
}

impl Args {
    pub fn parse_args() -> Self {
        Args::parse()
    }

    /// Fill unset options from `DGET_*` environment variables
    pub fn with_env_overrides(self) -> Self {
        self.with_env(|key| std::env::var(key).ok())
    }

    /// Same as [`Args::with_env_overrides`] with an explicit variable lookup
    pub fn with_env<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if self.username.is_none() {
            self.username = lookup(ENV_USERNAME);
        }

        if self.password.is_none() {
            self.password = lookup(ENV_PASSWORD);
        }

        if self.proxy.is_none() {
            self.proxy = lookup(ENV_PROXY).filter(|p| !p.is_empty());
        }

        if self.concurrency.is_none() {
            self.concurrency = lookup(ENV_CONCURRENCY).and_then(|c| c.trim().parse().ok());
        }

        if let Some(debug) = lookup(ENV_DEBUG) {
            if !matches!(debug.trim(), "" | "0" | "false") {
                self.debug = true;
            }
        }

        self
    }

    pub fn validate(&self) -> Result<()> {
        ValidationErrorHandler::validate_credentials(&self.username, &self.password)?;
        ValidationErrorHandler::validate_platform(&self.arch)?;
        ValidationErrorHandler::validate_concurrency(self.concurrency())?;

        if self.timeout == Some(0) {
            return Err(RegistryError::Validation(
                "Timeout must be greater than 0".to_string(),
            ));
        }

        if self.print && self.tags {
            return Err(RegistryError::Validation(
                "--print and --tags cannot be combined".to_string(),
            ));
        }

        Ok(())
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency.unwrap_or(DEFAULT_CONCURRENCY)
    }

    pub fn reference(&self) -> Result<Reference> {
        Reference::parse(&self.image, self.tag.as_deref())
    }

    pub fn client_config(&self) -> ClientConfig {
        let mut config = ClientConfig::default()
            .with_proxy(self.proxy.clone())
            .with_skip_tls(self.skip_tls)
            .with_timeout(self.timeout);

        if let Some(registry) = &self.registry {
            config = config.with_registry(registry.clone());
        }

        if let (Some(username), Some(password)) = (&self.username, &self.password) {
            config = config.with_auth(Some(AuthConfig::new(username.clone(), password.clone())));
        }

        config
    }

    pub fn pull_config(&self) -> PullConfig {
        PullConfig::default()
            .with_platform(self.arch.clone())
            .with_concurrency(self.concurrency())
            .with_output_dir(self.output_dir.clone())
            .with_print_only(self.print)
    }
}
