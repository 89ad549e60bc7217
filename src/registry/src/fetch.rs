//! Fetching ECI content from a registry into an ingester.
//!
//! Uses the `oci-distribution` crate. Each blob is streamed from the
//! registry through an in-memory duplex pipe straight into the ingester's
//! writer, so a layer is never held in memory whole.

use std::future::Future;

use async_trait::async_trait;
use oci_distribution::client::{ClientConfig, ClientProtocol};
use oci_distribution::manifest::OciDescriptor;
use oci_distribution::secrets::RegistryAuth as OciRegistryAuth;
use oci_distribution::{Client, Reference};
use tokio::io::DuplexStream;

use eci_core::error::{EciError, Result};
use eci_core::media_type::OCI_IMAGE_MANIFEST;
use eci_core::{Descriptor, Digest};
use eci_store::{copy, ContentWriter, Ingester};

use crate::reference::ImageReference;
use crate::status::StatusTracker;

/// Fetches an image's manifest and allowed children into an ingester.
///
/// Returns the root descriptor and the child descriptors that were
/// fetched.
#[async_trait]
pub trait ArtifactFetch: Send + Sync {
    async fn fetch(
        &self,
        image: &ImageReference,
        ingester: &dyn Ingester,
        allowed_media_types: &[String],
        progress: Option<&StatusTracker>,
    ) -> Result<(Descriptor, Vec<Descriptor>)>;
}

/// Authentication credentials for a container registry.
#[derive(Debug, Clone)]
pub struct RegistryAuth {
    username: Option<String>,
    password: Option<String>,
}

impl RegistryAuth {
    pub fn anonymous() -> Self {
        Self {
            username: None,
            password: None,
        }
    }

    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: Some(username.into()),
            password: Some(password.into()),
        }
    }

    /// Read `REGISTRY_USERNAME` and `REGISTRY_PASSWORD`, falling back to
    /// anonymous when either is unset.
    pub fn from_env() -> Self {
        match (
            std::env::var("REGISTRY_USERNAME").ok(),
            std::env::var("REGISTRY_PASSWORD").ok(),
        ) {
            (Some(username), Some(password)) => Self::basic(username, password),
            _ => Self::anonymous(),
        }
    }

    pub fn is_anonymous(&self) -> bool {
        self.username.is_none()
    }

    fn to_oci_auth(&self) -> OciRegistryAuth {
        match (&self.username, &self.password) {
            (Some(u), Some(p)) => OciRegistryAuth::Basic(u.clone(), p.clone()),
            _ => OciRegistryAuth::Anonymous,
        }
    }
}

/// [`ArtifactFetch`] against an OCI registry.
pub struct RegistryFetch {
    client: Client,
    auth: RegistryAuth,
    buffer_size: usize,
}

impl RegistryFetch {
    pub fn new(auth: RegistryAuth, buffer_size: usize) -> Self {
        Self::with_protocol(auth, buffer_size, ClientProtocol::Https)
    }

    /// Plain HTTP, for local test registries.
    pub fn insecure(auth: RegistryAuth, buffer_size: usize) -> Self {
        Self::with_protocol(auth, buffer_size, ClientProtocol::Http)
    }

    fn with_protocol(auth: RegistryAuth, buffer_size: usize, protocol: ClientProtocol) -> Self {
        let config = ClientConfig {
            protocol,
            ..Default::default()
        };
        Self {
            client: Client::new(config),
            auth,
            buffer_size: buffer_size.max(1),
        }
    }

    /// Stream one blob into the ingester.
    async fn fetch_blob(
        &self,
        oci_ref: &Reference,
        registry: &str,
        blob: &OciDescriptor,
        ingester: &dyn Ingester,
    ) -> Result<Descriptor> {
        let desc = to_descriptor(blob)?;

        let mut writer = match ingester.writer(&desc).await {
            Ok(writer) => writer,
            Err(EciError::AlreadyExists(_)) => {
                tracing::debug!(digest = %desc.digest, "Blob already present, skipping");
                return Ok(desc);
            }
            Err(e) => return Err(e),
        };

        tracing::debug!(
            digest = %desc.digest,
            media_type = %desc.media_type,
            size = desc.size,
            "Pulling blob"
        );

        let client = &self.client;
        ingest_stream(writer.as_mut(), &desc, self.buffer_size, |mut tx| async move {
            client
                .pull_blob(oci_ref, blob, &mut tx)
                .await
                .map_err(|e| EciError::RegistryError {
                    registry: registry.to_string(),
                    message: format!("Failed to pull blob {}: {}", blob.digest, e),
                })
        })
        .await?;

        Ok(desc)
    }

    /// Fetch `blob` if its media type is allowed, reporting progress.
    async fn fetch_allowed(
        &self,
        oci_ref: &Reference,
        image: &ImageReference,
        blob: &OciDescriptor,
        ingester: &dyn Ingester,
        allowed_media_types: &[String],
        progress: Option<&StatusTracker>,
    ) -> Result<Option<Descriptor>> {
        if !allowed_media_types.iter().any(|m| m == &blob.media_type) {
            tracing::debug!(
                digest = %blob.digest,
                media_type = %blob.media_type,
                "Skipping blob with disallowed media type"
            );
            return Ok(None);
        }

        let desc = self
            .fetch_blob(oci_ref, &image.registry, blob, ingester)
            .await?;
        if let Some(progress) = progress {
            progress.downloaded(&desc);
        }
        Ok(Some(desc))
    }

    fn to_oci_reference(&self, reference: &ImageReference) -> Result<Reference> {
        let ref_str = match (&reference.digest, &reference.tag) {
            (Some(digest), _) => format!("{}/{}@{}", reference.registry, reference.repository, digest),
            (None, Some(tag)) => format!("{}/{}:{}", reference.registry, reference.repository, tag),
            (None, None) => format!("{}/{}:latest", reference.registry, reference.repository),
        };

        ref_str.parse::<Reference>().map_err(|e| {
            EciError::InvalidReference(format!("'{}': {}", ref_str, e))
        })
    }
}

#[async_trait]
impl ArtifactFetch for RegistryFetch {
    async fn fetch(
        &self,
        image: &ImageReference,
        ingester: &dyn Ingester,
        allowed_media_types: &[String],
        progress: Option<&StatusTracker>,
    ) -> Result<(Descriptor, Vec<Descriptor>)> {
        let oci_ref = self.to_oci_reference(image)?;
        let auth = self.auth.to_oci_auth();

        tracing::info!(reference = %image, "Pulling image from registry");

        let (manifest, manifest_digest) = self
            .client
            .pull_image_manifest(&oci_ref, &auth)
            .await
            .map_err(|e| EciError::RegistryError {
                registry: image.registry.clone(),
                message: format!("Failed to pull manifest: {}", e),
            })?;

        // The stored copy is re-serialized, so it is keyed by its own digest.
        let manifest_json = serde_json::to_vec(&manifest)?;
        let media_type = manifest
            .media_type
            .clone()
            .unwrap_or_else(|| OCI_IMAGE_MANIFEST.to_string());
        let stored = Descriptor::for_bytes(media_type.clone(), &manifest_json);
        store_bytes(ingester, &stored, &manifest_json).await?;

        let root = root_descriptor(media_type, &manifest_digest)?;

        self.fetch_allowed(
            &oci_ref,
            image,
            &manifest.config,
            ingester,
            allowed_media_types,
            progress,
        )
        .await?;

        let mut layers = Vec::new();
        for blob in &manifest.layers {
            let fetched = self
                .fetch_allowed(&oci_ref, image, blob, ingester, allowed_media_types, progress)
                .await?;
            layers.extend(fetched);
        }

        tracing::info!(
            reference = %image,
            digest = %root.digest,
            layers = layers.len(),
            "Image pulled successfully"
        );
        Ok((root, layers))
    }
}

/// Convert a registry descriptor, keeping its annotations.
fn to_descriptor(blob: &OciDescriptor) -> Result<Descriptor> {
    let digest = Digest::parse(&blob.digest)?;
    let size = u64::try_from(blob.size).unwrap_or(0);
    let mut desc = Descriptor::new(blob.media_type.clone(), digest, size);
    for (key, value) in blob.annotations.iter().flatten() {
        desc = desc.with_annotation(key.clone(), value.clone());
    }
    Ok(desc)
}

/// Root descriptor named by the registry's manifest digest. The registry's
/// manifest bytes are not kept, so the size is 0 (unknown).
fn root_descriptor(media_type: String, manifest_digest: &str) -> Result<Descriptor> {
    Ok(Descriptor::new(media_type, Digest::parse(manifest_digest)?, 0))
}

/// Write a small in-memory blob. Content already present is fine.
async fn store_bytes(ingester: &dyn Ingester, desc: &Descriptor, data: &[u8]) -> Result<()> {
    let mut writer = match ingester.writer(desc).await {
        Ok(writer) => writer,
        Err(EciError::AlreadyExists(_)) => return Ok(()),
        Err(e) => return Err(e),
    };
    copy(writer.as_mut(), data, desc, data.len().max(1)).await?;
    Ok(())
}

/// Run `download` into one end of a duplex pipe while the other end is
/// copied into `writer` and committed.
///
/// Whichever side fails first is reported: a download that breaks off
/// wins over the truncated-stream errors it causes downstream, and an
/// ingest failure wins over the broken pipe it leaves the download with.
pub async fn ingest_stream<F, Fut>(
    writer: &mut dyn ContentWriter,
    desc: &Descriptor,
    buffer_size: usize,
    download: F,
) -> Result<()>
where
    F: FnOnce(DuplexStream) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let (tx, rx) = tokio::io::duplex(buffer_size.max(1));
    // Dropping the sender is the end-of-stream signal.
    let download = download(tx);
    let ingest = copy(writer, rx, desc, buffer_size);
    tokio::pin!(download);
    tokio::pin!(ingest);

    tokio::select! {
        biased;
        downloaded = &mut download => match downloaded {
            Ok(()) => ingest.await.map(|_| ()),
            Err(e) => {
                tracing::debug!(digest = %desc.digest, error = %e, "Download failed");
                Err(e)
            }
        },
        ingested = &mut ingest => match ingested {
            Ok(_) => download.await,
            Err(e) => Err(e),
        },
    }
}
