//! Decompressing store.
//!
//! Sits between a fetcher and the real destination. Manifests and indexes
//! go to an in-memory cache verbatim; every other unit is routed through
//! gunzip and/or untar transforms according to its media type suffix and
//! lands decoded in the wrapped ingester.
//!
//! For a `.tar+gzip` layer the writer chain is:
//!
//! ```text
//! fetcher ─► gunzip pipe ─► untar pipe ─► target writer
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use eci_core::error::Result;
use eci_core::media_type::is_bypass;
use eci_core::{Descriptor, PullConfig};

use crate::content::{ContentWriter, Ingester, Provider, ReaderAt};
use crate::memory::MemoryStore;
use crate::pipe::{PipeOptions, TransformPipe};

/// Store that decodes compressed units on their way into an ingester.
#[derive(Clone)]
pub struct DecompressStore {
    ingester: Option<Arc<dyn Ingester>>,
    cache: MemoryStore,
    options: PipeOptions,
    transforms_started: Arc<AtomicUsize>,
}

impl DecompressStore {
    /// Decompress into `ingester` with default settings.
    pub fn new(ingester: Arc<dyn Ingester>) -> Self {
        Self::with_config(Some(ingester), &PullConfig::default())
    }

    /// A store with no target: every unit lands in the cache.
    pub fn without_ingester() -> Self {
        Self::with_config(None, &PullConfig::default())
    }

    pub fn with_config(ingester: Option<Arc<dyn Ingester>>, config: &PullConfig) -> Self {
        Self {
            ingester,
            cache: MemoryStore::new(),
            options: PipeOptions::from_config(config),
            transforms_started: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Tie every transform this store starts to `cancel`.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.options.cancel = cancel;
        self
    }

    /// The verbatim cache holding manifests and indexes.
    pub fn cache(&self) -> &MemoryStore {
        &self.cache
    }

    /// Abort every in-flight transform.
    pub fn cancel(&self) {
        self.options.cancel.cancel();
    }

    /// Transform pipes started so far.
    pub fn transforms_started(&self) -> usize {
        self.transforms_started.load(Ordering::Relaxed)
    }

    fn start(
        &self,
        build: fn(Box<dyn ContentWriter>, &PipeOptions) -> Result<TransformPipe>,
        downstream: Box<dyn ContentWriter>,
    ) -> Result<Box<dyn ContentWriter>> {
        let pipe = build(downstream, &self.options)?;
        self.transforms_started.fetch_add(1, Ordering::Relaxed);
        Ok(Box::new(pipe))
    }
}

#[async_trait]
impl Ingester for DecompressStore {
    async fn writer(&self, desc: &Descriptor) -> Result<Box<dyn ContentWriter>> {
        let ingester = match &self.ingester {
            Some(ingester) if !is_bypass(&desc.media_type) => ingester,
            _ => {
                tracing::debug!(
                    digest = %desc.digest,
                    media_type = %desc.media_type,
                    "Caching unit verbatim"
                );
                return self.cache.writer(desc).await;
            }
        };

        let compression = desc.compression();
        let mut writer = ingester.writer(desc).await?;

        // Innermost first: the producer feeds gunzip, which feeds untar.
        if compression.tar {
            writer = self.start(TransformPipe::untar, writer)?;
        }
        if compression.gzip {
            writer = self.start(TransformPipe::gunzip, writer)?;
        }

        tracing::debug!(
            digest = %desc.digest,
            media_type = %desc.media_type,
            gzip = compression.gzip,
            tar = compression.tar,
            "Opened decompressing writer"
        );
        Ok(writer)
    }
}

#[async_trait]
impl Provider for DecompressStore {
    async fn reader_at(&self, desc: &Descriptor) -> Result<Box<dyn ReaderAt>> {
        self.cache.reader_at(desc).await
    }
}
