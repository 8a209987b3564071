//! Registry client
//!
//! [`RegistryClient`] owns the HTTP transport for one run (proxy, TLS policy, timeout)
//! and knows how to address the Registry v2 endpoints. Every operation module borrows
//! a clone of it; `reqwest::Client` is reference counted so clones share one pool.

use crate::config::ClientConfig;
use crate::error::handlers::NetworkErrorHandler;
use crate::error::{RegistryError, Result};
use crate::logging::Logger;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};
use reqwest::{Client, Response};
use std::time::Duration;

pub struct RegistryClientBuilder {
    address: String,
    proxy: Option<String>,
    skip_tls: bool,
    timeout: Option<u64>,
    output: Logger,
}

impl RegistryClientBuilder {
    pub fn new(address: String) -> Self {
        Self {
            address,
            proxy: None,
            skip_tls: false,
            timeout: None,
            output: Logger::default(),
        }
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

    pub fn with_output(mut self, output: Logger) -> Self {
        self.output = output;
        self
    }

    pub fn build(self) -> Result<RegistryClient> {
        let mut builder = Client::builder().user_agent(concat!(
            env!("CARGO_PKG_NAME"),
            "/",
            env!("CARGO_PKG_VERSION")
        ));

        if self.skip_tls {
            builder = builder
                .danger_accept_invalid_certs(true)
                .danger_accept_invalid_hostnames(true);
        }

        if let Some(proxy) = &self.proxy {
            let proxy = reqwest::Proxy::all(proxy.as_str()).map_err(|e| {
                RegistryError::Validation(format!("Invalid proxy address {}: {}", proxy, e))
            })?;
            builder = builder.proxy(proxy);
        }

        if let Some(timeout) = self.timeout {
            builder = builder.timeout(Duration::from_secs(timeout));
        }

        let client = builder
            .build()
            .map_err(|e| RegistryError::Network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(RegistryClient {
            client,
            address: self.address.trim_end_matches('/').to_string(),
            output: self.output,
        })
    }
}

#[derive(Debug, Clone)]
pub struct RegistryClient {
    client: Client,
    address: String,
    output: Logger,
}

impl RegistryClient {
    pub fn builder(address: String) -> RegistryClientBuilder {
        RegistryClientBuilder::new(address)
    }

    /// Client for the registry and transport described by `config`
    pub fn from_config(config: &ClientConfig, output: Logger) -> Result<Self> {
        config.validate()?;
        Self::builder(config.registry_url()?)
            .with_proxy(config.proxy.clone())
            .with_skip_tls(config.skip_tls)
            .with_timeout(config.timeout)
            .with_output(output)
            .build()
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn http(&self) -> &Client {
        &self.client
    }

    pub fn manifest_url(&self, repository: &str, reference: &str) -> String {
        format!("{}/v2/{}/manifests/{}", self.address, repository, reference)
    }

    pub fn blob_url(&self, repository: &str, digest: &str) -> String {
        format!("{}/v2/{}/blobs/{}", self.address, repository, digest)
    }

    pub fn tags_url(&self, repository: &str) -> String {
        format!("{}/v2/{}/tags/list", self.address, repository)
    }

    /// Unauthenticated `GET /v2/` used to discover the auth challenge
    pub async fn probe(&self) -> Result<Response> {
        let url = format!("{}/v2/", self.address);
        self.output.detail(&format!("Probing {}", url));
        self.client
            .get(&url)
            .send()
            .await
            .map_err(|e| NetworkErrorHandler::handle_network_error(&e, "registry probe"))
    }

    /// `GET` an absolute URL with the given headers
    pub async fn get(&self, url: &str, headers: &HeaderMap) -> Result<Response> {
        self.output.detail(&format!("GET {}", url));
        Ok(self.client.get(url).headers(headers.clone()).send().await?)
    }

    /// `GET` a manifest, replacing any `Accept` header in `headers` with `accept`
    pub async fn get_manifest(
        &self,
        repository: &str,
        reference: &str,
        accept: &str,
        headers: &HeaderMap,
    ) -> Result<Response> {
        let mut headers = headers.clone();
        let accept = HeaderValue::from_str(accept).map_err(|e| {
            RegistryError::Validation(format!("Invalid Accept header {}: {}", accept, e))
        })?;
        headers.insert(ACCEPT, accept);
        self.get(&self.manifest_url(repository, reference), &headers)
            .await
    }

    pub async fn get_blob(
        &self,
        repository: &str,
        digest: &str,
        headers: &HeaderMap,
    ) -> Result<Response> {
        self.get(&self.blob_url(repository, digest), headers).await
    }
}
