#![allow(dead_code)]

use docker_image_getter::config::{AuthConfig, ClientConfig, PullConfig};
use docker_image_getter::image::DigestUtils;
use docker_image_getter::image::ImageManager;
use docker_image_getter::logging::Logger;
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use mockito::{Matcher, Mock, ServerGuard};
use serde_json::json;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

pub const REPOSITORY: &str = "library/busybox";
pub const TOKEN: &str = "pull-token";
pub const SERVICE: &str = "registry.test";
pub const MANIFEST_LIST: &str = "application/vnd.docker.distribution.manifest.list.v2+json";
pub const MANIFEST_V2: &str = "application/vnd.docker.distribution.manifest.v2+json";

pub const CONFIG_BLOB: &str = r#"{"architecture":"amd64","os":"linux","created":"2024-01-02T03:04:05Z","container_config":{"Hostname":"builder","Cmd":["/bin/sh","-c","echo"]},"config":{"Cmd":["sh"]},"rootfs":{"type":"layers","diff_ids":[]}}"#;

pub struct Layer {
    pub digest: String,
    /// Bytes served by the registry
    pub body: Vec<u8>,
    /// Expected `layer.tar` content
    pub plain: Vec<u8>,
}

pub fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

pub fn layer(content: &str) -> Layer {
    let plain = content.as_bytes().to_vec();
    let body = gzip(&plain);
    Layer {
        digest: DigestUtils::compute_docker_digest(&body),
        body,
        plain,
    }
}

pub fn config_digest() -> String {
    DigestUtils::compute_docker_digest(CONFIG_BLOB.as_bytes())
}

pub fn layer_ids(layers: &[&Layer]) -> Vec<String> {
    DigestUtils::legacy_layer_chain(layers.iter().map(|l| l.digest.as_str()))
}

pub fn image_manifest(layers: &[&Layer]) -> String {
    json!({
        "schemaVersion": 2,
        "mediaType": MANIFEST_V2,
        "config": {
            "mediaType": "application/vnd.docker.container.image.v1+json",
            "size": CONFIG_BLOB.len(),
            "digest": config_digest(),
        },
        "layers": layers.iter().map(|l| json!({
            "mediaType": "application/vnd.docker.image.rootfs.diff.tar.gzip",
            "size": l.body.len(),
            "digest": l.digest,
        })).collect::<Vec<_>>(),
    })
    .to_string()
}

pub fn manifest_list(entries: &[(&str, &str, &str)]) -> String {
    json!({
        "schemaVersion": 2,
        "mediaType": MANIFEST_LIST,
        "manifests": entries.iter().map(|(digest, os, arch)| json!({
            "mediaType": MANIFEST_V2,
            "size": 1,
            "digest": digest,
            "platform": {"os": os, "architecture": arch},
        })).collect::<Vec<_>>(),
    })
    .to_string()
}

pub fn bearer() -> String {
    format!("Bearer {}", TOKEN)
}

/// `/v2/` challenge plus an anonymous token endpoint
pub async fn mock_auth(server: &mut ServerGuard) -> (Mock, Mock) {
    let challenge = format!(
        r#"Bearer realm="{}/token",service="{}""#,
        server.url(),
        SERVICE
    );
    let probe = server
        .mock("GET", "/v2/")
        .with_status(401)
        .with_header("www-authenticate", &challenge)
        .with_body(r#"{"errors":[{"code":"UNAUTHORIZED"}]}"#)
        .create_async()
        .await;
    let token = server
        .mock("GET", "/token")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("service".into(), SERVICE.into()),
            Matcher::UrlEncoded("scope".into(), format!("repository:{}:pull", REPOSITORY)),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(format!(r#"{{"access_token":"{}","expires_in":300}}"#, TOKEN))
        .create_async()
        .await;
    (probe, token)
}

pub async fn mock_manifest(
    server: &mut ServerGuard,
    reference: &str,
    content_type: &str,
    body: &str,
) -> Mock {
    server
        .mock("GET", format!("/v2/{}/manifests/{}", REPOSITORY, reference).as_str())
        .match_header("authorization", bearer().as_str())
        .with_status(200)
        .with_header("content-type", content_type)
        .with_body(body)
        .create_async()
        .await
}

pub async fn mock_blob(server: &mut ServerGuard, digest: &str, body: &[u8]) -> Mock {
    server
        .mock("GET", format!("/v2/{}/blobs/{}", REPOSITORY, digest).as_str())
        .match_header("authorization", bearer().as_str())
        .with_status(200)
        .with_body(body)
        .create_async()
        .await
}

pub async fn mock_config(server: &mut ServerGuard) -> Mock {
    mock_blob(server, &config_digest(), CONFIG_BLOB.as_bytes()).await
}

pub fn client_config(server: &ServerGuard) -> ClientConfig {
    ClientConfig::new(server.url())
}

pub fn client_config_with_auth(server: &ServerGuard, username: &str, password: &str) -> ClientConfig {
    client_config(server).with_auth(Some(AuthConfig::new(
        username.to_string(),
        password.to_string(),
    )))
}

pub fn manager(server: &ServerGuard, output_dir: &Path, concurrency: usize) -> ImageManager {
    manager_with(client_config(server), output_dir, concurrency, false)
}

pub fn manager_with(
    client_config: ClientConfig,
    output_dir: &Path,
    concurrency: usize,
    print_only: bool,
) -> ImageManager {
    let pull_config = PullConfig::default()
        .with_concurrency(concurrency)
        .with_output_dir(output_dir.to_path_buf())
        .with_print_only(print_only);
    ImageManager::new(client_config, pull_config, Logger::new(true))
}

/// Archive entries by path: (is directory, content)
pub fn read_archive(path: &Path) -> BTreeMap<String, (bool, Vec<u8>)> {
    let mut archive = tar::Archive::new(GzDecoder::new(File::open(path).unwrap()));
    let mut entries = BTreeMap::new();
    for entry in archive.entries().unwrap() {
        let mut entry = entry.unwrap();
        let name = entry
            .path()
            .unwrap()
            .to_string_lossy()
            .trim_end_matches('/')
            .to_string();
        let is_dir = entry.header().entry_type().is_dir();
        let mut content = Vec::new();
        entry.read_to_end(&mut content).unwrap();
        entries.insert(name, (is_dir, content));
    }
    entries
}
