//! Content descriptors and the ECI annotation scheme.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::digest::Digest;
use crate::media_type::Compression;

/// Relative file path of a layer.
pub const ANNOTATION_TITLE: &str = "org.opencontainers.image.title";
/// Role of a layer within an ECI.
pub const ANNOTATION_ROLE: &str = "org.lfedge.eci.role";
/// Media type of the layer once decompressed.
pub const ANNOTATION_MEDIA_TYPE: &str = "org.lfedge.eci.mediaType";

/// Describes one content-addressed unit: a manifest, config or layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Descriptor {
    pub media_type: String,
    pub digest: Digest,
    pub size: u64,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub annotations: HashMap<String, String>,
}

impl Descriptor {
    pub fn new(media_type: impl Into<String>, digest: Digest, size: u64) -> Self {
        Self {
            media_type: media_type.into(),
            digest,
            size,
            annotations: HashMap::new(),
        }
    }

    /// Describe a byte slice under the given media type.
    pub fn for_bytes(media_type: impl Into<String>, data: &[u8]) -> Self {
        Self::new(media_type, Digest::from_bytes(data), data.len() as u64)
    }

    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations.insert(key.into(), value.into());
        self
    }

    pub fn with_title(self, title: impl Into<String>) -> Self {
        self.with_annotation(ANNOTATION_TITLE, title)
    }

    /// Title annotation, if present and non-empty.
    pub fn title(&self) -> Option<&str> {
        self.annotation(ANNOTATION_TITLE)
    }

    pub fn role(&self) -> Option<&str> {
        self.annotation(ANNOTATION_ROLE)
    }

    /// Media type after decompression, if annotated.
    pub fn real_media_type(&self) -> Option<&str> {
        self.annotation(ANNOTATION_MEDIA_TYPE)
    }

    pub fn compression(&self) -> Compression {
        Compression::from_media_type(&self.media_type)
    }

    fn annotation(&self, key: &str) -> Option<&str> {
        self.annotations
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }
}
