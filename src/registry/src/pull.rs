//! High-level ECI pull.
//!
//! Resolves the target, wraps it in a [`DecompressStore`] and hands that to
//! the fetch routine, then maps the fetched layers into an [`Artifact`].

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use eci_core::error::{EciError, Result};
use eci_core::media_type::all_eci_media_types;
use eci_core::{Descriptor, PullConfig};
use eci_store::DecompressStore;

use crate::artifact::Artifact;
use crate::fetch::ArtifactFetch;
use crate::reference::ImageReference;
use crate::status::StatusTracker;
use crate::target::Target;

/// Pulls one image into a [`Target`].
pub struct Puller {
    image: String,
    config: PullConfig,
    cancel: CancellationToken,
}

impl Puller {
    /// `image` is a reference such as `docker.io/lfedge/eve-vm:1.0`.
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            config: PullConfig::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_config(mut self, config: PullConfig) -> Self {
        self.config = config;
        self
    }

    /// Token that aborts the pull's in-flight transforms when cancelled.
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn image(&self) -> &str {
        &self.image
    }

    /// Pull the image into `target`.
    ///
    /// When `verbose` is set, every downloaded unit is reported on
    /// `progress`. Returns the image's root descriptor and where its parts
    /// were written.
    pub async fn pull(
        &self,
        target: &Target,
        verbose: bool,
        progress: &StatusTracker,
        fetcher: &dyn ArtifactFetch,
    ) -> Result<(Descriptor, Artifact)> {
        if self.image.trim().is_empty() {
            return Err(EciError::InvalidReference(
                "must have a valid image reference".to_string(),
            ));
        }
        let reference = ImageReference::parse(&self.image)?;

        let ingester = Arc::new(target.ingester()?);
        let store = DecompressStore::with_config(Some(ingester), &self.config)
            .with_cancellation(self.cancel.child_token());
        let allowed = all_eci_media_types();

        let (desc, layers) = fetcher
            .fetch(&reference, &store, &allowed, verbose.then_some(progress))
            .await?;

        let artifact = Artifact::from_layers(&layers, target);
        tracing::info!(
            reference = %reference,
            digest = %desc.digest,
            layers = layers.len(),
            transforms = store.transforms_started(),
            "Pulled ECI"
        );
        Ok((desc, artifact))
    }
}
