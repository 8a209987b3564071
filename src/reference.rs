//! Image reference parsing
//!
//! Turns user input such as `nginx`, `nginx:1.25`, `bitnami/redis:7` or
//! `ghcr.io/owner/app:v1` into a normalized [`Reference`].

use crate::error::{RegistryError, Result};
use std::fmt;

pub const DEFAULT_TAG: &str = "latest";
pub const DEFAULT_NAMESPACE: &str = "library";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    /// Registry host, `None` when the configured default registry applies
    pub registry: Option<String>,
    /// Repository path without any registry host, e.g. `library/nginx`
    pub repository: String,
    pub tag: String,
}

impl Reference {
    /// Parse an image reference; `tag` overrides any `:tag` suffix.
    pub fn parse(input: &str, tag: Option<&str>) -> Result<Self> {
        let input = input.trim();
        if input.is_empty() {
            return Err(RegistryError::Validation(
                "Image name cannot be empty".to_string(),
            ));
        }
        if input.contains('@') {
            return Err(RegistryError::Validation(format!(
                "Digest references are not supported, use a tag: {}",
                input
            )));
        }

        let (name, suffix_tag) = split_tag(input);

        let segments: Vec<&str> = name.split('/').collect();
        if segments.iter().any(|s| s.is_empty()) {
            return Err(RegistryError::Validation(format!(
                "Invalid image name: {}",
                input
            )));
        }

        let (registry, path) = if segments.len() > 1
            && (looks_like_host(segments[0]) || segments.len() >= 3)
        {
            (Some(segments[0].to_string()), segments[1..].join("/"))
        } else {
            (None, segments.join("/"))
        };

        let repository = if path.contains('/') {
            path
        } else {
            format!("{}/{}", DEFAULT_NAMESPACE, path)
        };

        let tag = tag
            .map(str::to_string)
            .or(suffix_tag)
            .unwrap_or_else(|| DEFAULT_TAG.to_string());
        if tag.is_empty() {
            return Err(RegistryError::Validation(format!(
                "Empty tag in image reference: {}",
                input
            )));
        }

        Ok(Self {
            registry,
            repository,
            tag,
        })
    }

    /// Name of the per-run working directory
    pub fn working_dir_name(&self) -> String {
        format!("tmp_{}_{}", sanitize_image_name(&self.repository), self.tag)
    }

    /// `repository:tag` as recorded in `manifest.json`
    pub fn repo_tag(&self) -> String {
        format!("{}:{}", self.repository, self.tag)
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.registry {
            Some(registry) => write!(f, "{}/{}:{}", registry, self.repository, self.tag),
            None => write!(f, "{}:{}", self.repository, self.tag),
        }
    }
}

/// Splits a trailing `:tag`, ignoring colons that belong to a registry port.
fn split_tag(input: &str) -> (&str, Option<String>) {
    let last_slash = input.rfind('/').map(|i| i + 1).unwrap_or(0);
    match input[last_slash..].rfind(':') {
        Some(pos) => {
            let pos = last_slash + pos;
            (&input[..pos], Some(input[pos + 1..].to_string()))
        }
        None => (input, None),
    }
}

fn looks_like_host(segment: &str) -> bool {
    segment.contains('.') || segment.contains(':') || segment == "localhost"
}

/// Replaces characters that are not valid in directory names
pub fn sanitize_image_name(image_name: &str) -> String {
    image_name.replace(['/', ':', '@'], "_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_name_gets_library_namespace() {
        let reference = Reference::parse("nginx", None).unwrap();
        assert_eq!(reference.registry, None);
        assert_eq!(reference.repository, "library/nginx");
        assert_eq!(reference.tag, "latest");
    }

    #[test]
    fn tag_suffix_is_parsed() {
        let reference = Reference::parse("bitnami/redis:7.2", None).unwrap();
        assert_eq!(reference.repository, "bitnami/redis");
        assert_eq!(reference.tag, "7.2");
    }

    #[test]
    fn explicit_tag_wins() {
        let reference = Reference::parse("alpine:3.18", Some("edge")).unwrap();
        assert_eq!(reference.repository, "library/alpine");
        assert_eq!(reference.tag, "edge");
    }

    #[test]
    fn registry_host_is_split_off() {
        let reference = Reference::parse("ghcr.io/owner/app:v1", None).unwrap();
        assert_eq!(reference.registry.as_deref(), Some("ghcr.io"));
        assert_eq!(reference.repository, "owner/app");
        assert_eq!(reference.tag, "v1");

        let reference = Reference::parse("localhost:5000/busybox", None).unwrap();
        assert_eq!(reference.registry.as_deref(), Some("localhost:5000"));
        assert_eq!(reference.repository, "library/busybox");
        assert_eq!(reference.tag, "latest");
    }

    #[test]
    fn three_segments_carry_a_registry() {
        let reference = Reference::parse("mirror/team/app", None).unwrap();
        assert_eq!(reference.registry.as_deref(), Some("mirror"));
        assert_eq!(reference.repository, "team/app");
    }

    #[test]
    fn invalid_references_are_rejected() {
        assert!(Reference::parse("", None).is_err());
        assert!(Reference::parse("nginx:", None).is_err());
        assert!(Reference::parse("a//b", None).is_err());
        assert!(Reference::parse("nginx@sha256:abc", None).is_err());
    }

    #[test]
    fn working_dir_is_flat() {
        let reference = Reference::parse("nginx:1.25", None).unwrap();
        assert_eq!(reference.working_dir_name(), "tmp_library_nginx_1.25");
        assert_eq!(reference.repo_tag(), "library/nginx:1.25");
        assert_eq!(reference.to_string(), "library/nginx:1.25");
    }
}
