//! SHA256 digest utilities
//!
//! Digest formatting helpers and the legacy layer-ID derivation used by
//! `docker save` archives: every layer ID is the SHA256 of
//! `parent_id + "\n" + layer_digest + "\n"`, so IDs chain from the base layer upward.

use crate::error::{RegistryError, Result};
use sha2::{Digest, Sha256};

pub const SHA256_PREFIX: &str = "sha256:";

/// Utilities for working with SHA256 digests in Docker context
pub struct DigestUtils;

impl DigestUtils {
    /// Compute SHA256 digest from byte data as lowercase hex
    pub fn compute_sha256(data: &[u8]) -> String {
        hex::encode(Sha256::digest(data))
    }

    /// Compute full Docker digest (with sha256: prefix) from byte data
    pub fn compute_docker_digest(data: &[u8]) -> String {
        format!("{}{}", SHA256_PREFIX, Self::compute_sha256(data))
    }

    /// Validate SHA256 hex string (64 characters, all hex)
    pub fn is_valid_sha256_hex(digest: &str) -> bool {
        digest.len() == 64 && digest.chars().all(|c| c.is_ascii_hexdigit())
    }

    /// Encoded part of a digest (`sha256:abcd...` → `abcd...`).
    ///
    /// Other algorithms are accepted as long as the digest has the `algo:hex` shape.
    pub fn encoded(digest: &str) -> Result<&str> {
        match digest.split_once(':') {
            Some((algorithm, encoded))
                if !algorithm.is_empty()
                    && !encoded.is_empty()
                    && encoded.chars().all(|c| c.is_ascii_hexdigit()) =>
            {
                Ok(encoded)
            }
            _ => Err(RegistryError::Validation(format!(
                "Malformed digest: {}",
                digest
            ))),
        }
    }

    /// Check a digest received from the registry before it reaches a URL or a path.
    ///
    /// `sha256` digests must carry exactly 64 hex characters.
    pub fn validate(digest: &str) -> Result<()> {
        let encoded = Self::encoded(digest)?;
        if digest.starts_with(SHA256_PREFIX) && !Self::is_valid_sha256_hex(encoded) {
            return Err(RegistryError::Validation(format!(
                "Malformed sha256 digest: {}",
                digest
            )));
        }
        Ok(())
    }

    /// Legacy layer ID of a layer given its parent's ID (empty for the base layer)
    pub fn legacy_layer_id(parent_id: &str, layer_digest: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(parent_id.as_bytes());
        hasher.update(b"\n");
        hasher.update(layer_digest.as_bytes());
        hasher.update(b"\n");
        hex::encode(hasher.finalize())
    }

    /// Legacy IDs for a whole chain, base layer first
    pub fn legacy_layer_chain<'a, I>(layer_digests: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut parent = String::new();
        layer_digests
            .into_iter()
            .map(|digest| {
                let id = Self::legacy_layer_id(&parent, digest);
                parent = id.clone();
                id
            })
            .collect()
    }

    /// Shortened digest for log lines
    pub fn short(digest: &str) -> &str {
        let encoded = digest.strip_prefix(SHA256_PREFIX).unwrap_or(digest);
        match encoded.char_indices().nth(12) {
            Some((end, _)) => &encoded[..end],
            None => encoded,
        }
    }
}
