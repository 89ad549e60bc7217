//! Image reference parsing.
//!
//! Parses references like `docker.io/lfedge/eve-kernel:6.1` into registry,
//! repository, tag and digest.

use eci_core::error::{EciError, Result};
use eci_core::Digest;

/// Registry used when the reference names none.
const DEFAULT_REGISTRY: &str = "docker.io";

const DEFAULT_TAG: &str = "latest";

/// Parsed image reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference {
    /// Registry host, with port if given
    pub registry: String,
    /// Repository path (e.g. "library/alpine", "lfedge/eve")
    pub repository: String,
    pub tag: Option<String>,
    pub digest: Option<Digest>,
}

impl ImageReference {
    /// Parse a reference string.
    ///
    /// - `alpine` → docker.io/library/alpine:latest
    /// - `lfedge/eve:8.0` → docker.io/lfedge/eve:8.0
    /// - `localhost:5000/eci/vm` → localhost:5000/eci/vm:latest
    /// - `ghcr.io/org/vm@sha256:...` → pinned by digest
    pub fn parse(reference: &str) -> Result<Self> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Err(EciError::InvalidReference(
                "must have a valid image reference".to_string(),
            ));
        }

        let (name_tag, digest) = match reference.rsplit_once('@') {
            Some((name_tag, digest)) => {
                let digest = Digest::parse(digest).map_err(|e| {
                    EciError::InvalidReference(format!("'{}': {}", reference, e))
                })?;
                (name_tag, Some(digest))
            }
            None => (reference, None),
        };

        // A tag is a colon after the last slash that is not a port number.
        let last_segment = name_tag.rfind('/').map(|i| i + 1).unwrap_or(0);
        let (name, tag) = match name_tag[last_segment..].rfind(':') {
            Some(colon) => {
                let split = last_segment + colon;
                let tag = &name_tag[split + 1..];
                let is_port = last_segment == 0
                    && !tag.is_empty()
                    && tag.chars().all(|c| c.is_ascii_digit());
                if is_port {
                    (name_tag, None)
                } else {
                    (&name_tag[..split], Some(tag.to_string()))
                }
            }
            None => (name_tag, None),
        };

        if tag.as_deref() == Some("") {
            return Err(EciError::InvalidReference(format!(
                "empty tag in '{}'",
                reference
            )));
        }

        let (registry, repository) = split_registry_repository(name, reference)?;

        let tag = match (&tag, &digest) {
            (None, None) => Some(DEFAULT_TAG.to_string()),
            _ => tag,
        };

        Ok(ImageReference {
            registry,
            repository,
            tag,
            digest,
        })
    }

    /// `registry/repository[:tag][@digest]`
    pub fn full_reference(&self) -> String {
        let mut s = format!("{}/{}", self.registry, self.repository);
        if let Some(tag) = &self.tag {
            s.push(':');
            s.push_str(tag);
        }
        if let Some(digest) = &self.digest {
            s.push('@');
            s.push_str(digest.as_str());
        }
        s
    }
}

/// First path component is a registry when it looks like a host.
fn split_registry_repository(name: &str, reference: &str) -> Result<(String, String)> {
    if let Some((first, rest)) = name.split_once('/') {
        if first.contains('.') || first.contains(':') || first == "localhost" {
            if rest.is_empty() {
                return Err(EciError::InvalidReference(format!(
                    "empty repository in '{}'",
                    reference
                )));
            }
            return Ok((first.to_string(), rest.to_string()));
        }
    }

    if name.is_empty() {
        return Err(EciError::InvalidReference(format!(
            "empty repository in '{}'",
            reference
        )));
    }

    let repository = if name.contains('/') {
        name.to_string()
    } else {
        format!("library/{}", name)
    };
    Ok((DEFAULT_REGISTRY.to_string(), repository))
}

impl std::fmt::Display for ImageReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.full_reference())
    }
}

impl std::str::FromStr for ImageReference {
    type Err = EciError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
