//! In-memory verbatim store used as the bypass cache.
//!
//! Manifests and indexes land here untouched so they can be read back by
//! digest. Each digest is written once: a second concurrent writer for the
//! same digest is refused, and committed content is never replaced.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};

use eci_core::error::{EciError, Result};
use eci_core::{Descriptor, Digest, Digester};

use crate::content::{verify, ContentWriter, Ingester, Provider, ReaderAt, Status};

#[derive(Default)]
struct MemoryInner {
    blobs: RwLock<HashMap<Digest, Bytes>>,
    ingesting: Mutex<HashSet<Digest>>,
}

/// Verbatim in-memory content store keyed by digest.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Committed content for a digest.
    pub fn get(&self, digest: &Digest) -> Option<Bytes> {
        self.inner.blobs.read().get(digest).cloned()
    }

    pub fn contains(&self, digest: &Digest) -> bool {
        self.inner.blobs.read().contains_key(digest)
    }

    /// Number of committed blobs.
    pub fn len(&self) -> usize {
        self.inner.blobs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn release(&self, digest: &Digest) {
        self.inner.ingesting.lock().remove(digest);
    }
}

#[async_trait]
impl Ingester for MemoryStore {
    async fn writer(&self, desc: &Descriptor) -> Result<Box<dyn ContentWriter>> {
        if self.contains(&desc.digest) {
            return Err(EciError::AlreadyExists(desc.digest.to_string()));
        }
        if !self.inner.ingesting.lock().insert(desc.digest.clone()) {
            return Err(EciError::Unavailable(format!(
                "{} is already being written",
                desc.digest
            )));
        }

        let now = Utc::now();
        Ok(Box::new(MemoryWriter {
            store: self.clone(),
            desc: desc.clone(),
            buf: Vec::new(),
            digester: Digester::new(),
            started_at: now,
            updated_at: now,
            closed: false,
            released: false,
        }))
    }
}

#[async_trait]
impl Provider for MemoryStore {
    async fn reader_at(&self, desc: &Descriptor) -> Result<Box<dyn ReaderAt>> {
        let data = self
            .get(&desc.digest)
            .ok_or_else(|| EciError::NotFound(desc.digest.to_string()))?;
        Ok(Box::new(MemoryReader { data }))
    }
}

struct MemoryWriter {
    store: MemoryStore,
    desc: Descriptor,
    buf: Vec<u8>,
    digester: Digester,
    started_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    closed: bool,
    // ingest slot given back
    released: bool,
}

#[async_trait]
impl ContentWriter for MemoryWriter {
    async fn write(&mut self, buf: &[u8]) -> Result<usize> {
        if self.closed || self.released {
            return Err(EciError::AlreadyClosed);
        }
        self.buf.extend_from_slice(buf);
        self.digester.update(buf);
        self.updated_at = Utc::now();
        Ok(buf.len())
    }

    async fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }

    async fn commit(&mut self, size: u64, expected: Option<&Digest>) -> Result<()> {
        if self.released {
            return Err(EciError::AlreadyClosed);
        }

        let expected = expected.unwrap_or(&self.desc.digest);
        let result = verify(self.buf.len() as u64, &self.digester.digest(), size, Some(expected));
        if result.is_ok() {
            let data = Bytes::from(std::mem::take(&mut self.buf));
            self.store
                .inner
                .blobs
                .write()
                .entry(self.desc.digest.clone())
                .or_insert(data);
            tracing::debug!(digest = %self.desc.digest, "Stored content in bypass cache");
        }

        self.store.release(&self.desc.digest);
        self.released = true;
        result
    }

    fn digest(&self) -> Digest {
        self.digester.digest()
    }

    async fn status(&self) -> Result<Status> {
        Ok(Status {
            reference: self.desc.digest.to_string(),
            offset: self.buf.len() as u64,
            total: self.desc.size,
            started_at: self.started_at,
            updated_at: self.updated_at,
        })
    }
}

impl Drop for MemoryWriter {
    fn drop(&mut self) {
        if !self.released {
            self.store.release(&self.desc.digest);
        }
    }
}

struct MemoryReader {
    data: Bytes,
}

impl ReaderAt for MemoryReader {
    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<usize> {
        let offset = offset as usize;
        if offset >= self.data.len() {
            return Ok(0);
        }
        let n = buf.len().min(self.data.len() - offset);
        buf[..n].copy_from_slice(&self.data[offset..offset + n]);
        Ok(n)
    }
}
