//! Filesystem target store.
//!
//! Writes each unit to a file chosen from its annotations: under a root
//! directory at its title path, or at an explicit path per role. Units with
//! no destination are consumed and discarded. Data goes to a hidden
//! `.ingest` file next to the destination and is renamed into place on
//! commit.

use std::collections::HashMap;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::io::AsyncWriteExt;

use eci_core::error::{EciError, Result};
use eci_core::{Descriptor, Digest, Digester};

use crate::content::{verify, ContentWriter, Ingester, Provider, ReaderAt, Status};

#[derive(Debug, Clone)]
enum Layout {
    /// `<root>/<title>`
    Directory(PathBuf),
    /// role → file
    Roles(HashMap<String, PathBuf>),
}

/// Content store writing units to files.
#[derive(Debug, Clone)]
pub struct FileStore {
    layout: Layout,
    /// descriptor digest → committed file
    committed: Arc<DashMap<Digest, PathBuf>>,
}

impl FileStore {
    /// Store units under `root` by their title annotation.
    pub fn new(root: &Path) -> Result<Self> {
        std::fs::create_dir_all(root).map_err(|e| {
            EciError::Other(format!(
                "Failed to create target directory {}: {}",
                root.display(),
                e
            ))
        })?;

        Ok(Self {
            layout: Layout::Directory(root.to_path_buf()),
            committed: Arc::new(DashMap::new()),
        })
    }

    /// Store only units whose role annotation has a route; discard the rest.
    pub fn with_roles(routes: HashMap<String, PathBuf>) -> Self {
        Self {
            layout: Layout::Roles(routes),
            committed: Arc::new(DashMap::new()),
        }
    }

    /// Destination file for a descriptor, `None` when it is discarded.
    pub fn destination(&self, desc: &Descriptor) -> Result<Option<PathBuf>> {
        match &self.layout {
            Layout::Directory(root) => match desc.title() {
                Some(title) => Ok(Some(root.join(safe_relative_path(title)?))),
                None => Ok(None),
            },
            Layout::Roles(routes) => Ok(desc.role().and_then(|role| routes.get(role)).cloned()),
        }
    }

    /// Path a committed descriptor was written to.
    pub fn committed_path(&self, digest: &Digest) -> Option<PathBuf> {
        self.committed.get(digest).map(|entry| entry.value().clone())
    }
}

/// Reject titles that would escape the target directory.
fn safe_relative_path(title: &str) -> Result<&Path> {
    let path = Path::new(title);
    let escapes = path
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if escapes || path.as_os_str().is_empty() {
        return Err(EciError::Other(format!(
            "Refusing to write outside the target directory: {}",
            title
        )));
    }
    Ok(path)
}

#[async_trait]
impl Ingester for FileStore {
    async fn writer(&self, desc: &Descriptor) -> Result<Box<dyn ContentWriter>> {
        let now = Utc::now();
        let tracker = Tracker {
            reference: desc.digest.clone(),
            total: desc.size,
            digester: Digester::new(),
            offset: 0,
            started_at: now,
            updated_at: now,
        };

        let Some(path) = self.destination(desc)? else {
            tracing::debug!(
                digest = %desc.digest,
                media_type = %desc.media_type,
                "No destination for unit, discarding"
            );
            return Ok(Box::new(DiscardWriter {
                tracker,
                closed: false,
            }));
        };

        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        tokio::fs::create_dir_all(parent).await.map_err(|e| {
            EciError::Other(format!(
                "Failed to create directory {}: {}",
                parent.display(),
                e
            ))
        })?;

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let ingest_path = parent.join(format!(".{}.ingest", file_name));
        let file = tokio::fs::File::create(&ingest_path).await.map_err(|e| {
            EciError::Other(format!(
                "Failed to create {}: {}",
                ingest_path.display(),
                e
            ))
        })?;

        tracing::debug!(
            digest = %desc.digest,
            path = %path.display(),
            "Opened file writer"
        );

        Ok(Box::new(FileWriter {
            file: Some(file),
            ingest_path,
            path,
            tracker,
            committed_index: self.committed.clone(),
            committed: false,
        }))
    }
}

#[async_trait]
impl Provider for FileStore {
    async fn reader_at(&self, desc: &Descriptor) -> Result<Box<dyn ReaderAt>> {
        let path = self
            .committed_path(&desc.digest)
            .ok_or_else(|| EciError::NotFound(desc.digest.to_string()))?;
        let file = std::fs::File::open(&path)?;
        let size = file.metadata()?.len();
        Ok(Box::new(FileReader {
            file: Mutex::new(file),
            size,
        }))
    }
}

/// Running digest and progress shared by the file-backed writers.
struct Tracker {
    reference: Digest,
    total: u64,
    digester: Digester,
    offset: u64,
    started_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Tracker {
    fn record(&mut self, buf: &[u8]) {
        self.digester.update(buf);
        self.offset += buf.len() as u64;
        self.updated_at = Utc::now();
    }

    fn status(&self) -> Status {
        Status {
            reference: self.reference.to_string(),
            offset: self.offset,
            total: self.total,
            started_at: self.started_at,
            updated_at: self.updated_at,
        }
    }
}

struct FileWriter {
    /// `None` once closed
    file: Option<tokio::fs::File>,
    ingest_path: PathBuf,
    path: PathBuf,
    tracker: Tracker,
    committed_index: Arc<DashMap<Digest, PathBuf>>,
    committed: bool,
}

impl FileWriter {
    async fn flush(&mut self) -> Result<()> {
        if let Some(mut file) = self.file.take() {
            file.flush().await?;
            file.sync_all().await?;
        }
        Ok(())
    }
}

#[async_trait]
impl ContentWriter for FileWriter {
    async fn write(&mut self, buf: &[u8]) -> Result<usize> {
        let file = self.file.as_mut().ok_or(EciError::AlreadyClosed)?;
        file.write_all(buf).await?;
        self.tracker.record(buf);
        Ok(buf.len())
    }

    async fn close(&mut self) -> Result<()> {
        self.flush().await
    }

    async fn commit(&mut self, size: u64, expected: Option<&Digest>) -> Result<()> {
        if self.committed {
            return Ok(());
        }
        self.flush().await?;
        verify(
            self.tracker.offset,
            &self.tracker.digester.digest(),
            size,
            expected,
        )?;

        tokio::fs::rename(&self.ingest_path, &self.path)
            .await
            .map_err(|e| {
                EciError::Other(format!(
                    "Failed to move {} into place: {}",
                    self.path.display(),
                    e
                ))
            })?;

        self.committed = true;
        self.committed_index
            .insert(self.tracker.reference.clone(), self.path.clone());

        tracing::debug!(
            digest = %self.tracker.reference,
            path = %self.path.display(),
            bytes = self.tracker.offset,
            "Committed file"
        );
        Ok(())
    }

    fn digest(&self) -> Digest {
        self.tracker.digester.digest()
    }

    async fn status(&self) -> Result<Status> {
        Ok(self.tracker.status())
    }
}

/// Consumes a unit that has nowhere to go.
struct DiscardWriter {
    tracker: Tracker,
    closed: bool,
}

#[async_trait]
impl ContentWriter for DiscardWriter {
    async fn write(&mut self, buf: &[u8]) -> Result<usize> {
        if self.closed {
            return Err(EciError::AlreadyClosed);
        }
        self.tracker.record(buf);
        Ok(buf.len())
    }

    async fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }

    async fn commit(&mut self, size: u64, expected: Option<&Digest>) -> Result<()> {
        verify(
            self.tracker.offset,
            &self.tracker.digester.digest(),
            size,
            expected,
        )
    }

    fn digest(&self) -> Digest {
        self.tracker.digester.digest()
    }

    async fn status(&self) -> Result<Status> {
        Ok(self.tracker.status())
    }
}

struct FileReader {
    file: Mutex<std::fs::File>,
    size: u64,
}

impl ReaderAt for FileReader {
    fn size(&self) -> u64 {
        self.size
    }

    fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<usize> {
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;
        Ok(file.read(buf)?)
    }
}
