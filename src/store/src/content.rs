//! Content store traits: writers, readers, ingesters and providers.
//!
//! A [`ContentWriter`] accepts a byte stream for one descriptor and
//! finalizes it with [`ContentWriter::commit`]. Decoding wrappers implement
//! the same trait so they can stand in for any plain writer.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::io::{AsyncRead, AsyncReadExt};

use eci_core::error::{EciError, Result};
use eci_core::{Descriptor, Digest};

/// Progress of an in-flight write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    /// Digest of the descriptor being written
    pub reference: String,
    /// Bytes accepted so far
    pub offset: u64,
    /// Expected total (0 when unknown)
    pub total: u64,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Sink for the bytes of one descriptor.
#[async_trait]
pub trait ContentWriter: Send + Sync {
    /// Write bytes, returning how many were accepted.
    async fn write(&mut self, buf: &[u8]) -> Result<usize>;

    /// Release the writer. Committed content stays; uncommitted data is
    /// left in place for the caller to clean up.
    async fn close(&mut self) -> Result<()>;

    /// Finalize the content. `size == 0` and `expected == None` mean unknown.
    async fn commit(&mut self, size: u64, expected: Option<&Digest>) -> Result<()>;

    /// Digest of the bytes written so far.
    fn digest(&self) -> Digest;

    async fn status(&self) -> Result<Status>;
}

/// Random access to stored content.
pub trait ReaderAt: Send + Sync {
    fn size(&self) -> u64;

    fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<usize>;
}

/// Opens writers for descriptors.
#[async_trait]
pub trait Ingester: Send + Sync {
    async fn writer(&self, desc: &Descriptor) -> Result<Box<dyn ContentWriter>>;
}

/// Opens readers for stored descriptors.
#[async_trait]
pub trait Provider: Send + Sync {
    async fn reader_at(&self, desc: &Descriptor) -> Result<Box<dyn ReaderAt>>;
}

/// Write the whole buffer, looping over short writes.
pub async fn write_all(writer: &mut dyn ContentWriter, mut buf: &[u8]) -> Result<()> {
    while !buf.is_empty() {
        let n = writer.write(buf).await?;
        if n == 0 {
            return Err(EciError::Other("writer accepted zero bytes".to_string()));
        }
        buf = &buf[n..];
    }
    Ok(())
}

/// Read the full content behind a reader.
pub fn read_all(reader: &dyn ReaderAt) -> Result<Vec<u8>> {
    let mut data = vec![0u8; reader.size() as usize];
    let mut offset = 0;
    while offset < data.len() {
        let n = reader.read_at(&mut data[offset..], offset as u64)?;
        if n == 0 {
            return Err(EciError::Other(format!(
                "short read: got {} of {} bytes",
                offset,
                data.len()
            )));
        }
        offset += n;
    }
    Ok(data)
}

/// Stream `reader` into `writer`, then commit against `desc` and close.
///
/// Returns the number of bytes copied. Content that already exists counts
/// as a successful commit.
pub async fn copy<R>(
    writer: &mut dyn ContentWriter,
    mut reader: R,
    desc: &Descriptor,
    buffer_size: usize,
) -> Result<u64>
where
    R: AsyncRead + Unpin + Send,
{
    let mut buf = vec![0u8; buffer_size.max(1)];
    let mut copied = 0u64;

    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                let _ = writer.close().await;
                return Err(e.into());
            }
        };
        if let Err(e) = write_all(writer, &buf[..n]).await {
            let _ = writer.close().await;
            return Err(e);
        }
        copied += n as u64;
    }

    match writer.commit(desc.size, Some(&desc.digest)).await {
        Ok(()) | Err(EciError::AlreadyExists(_)) => {}
        Err(e) => {
            let _ = writer.close().await;
            return Err(e);
        }
    }
    writer.close().await?;

    tracing::debug!(
        digest = %desc.digest,
        media_type = %desc.media_type,
        bytes = copied,
        "Copied content"
    );
    Ok(copied)
}

/// Check a finished write against the sizes and digest the caller expects.
pub(crate) fn verify(
    written: u64,
    actual: &Digest,
    size: u64,
    expected: Option<&Digest>,
) -> Result<()> {
    if size > 0 && size != written {
        return Err(EciError::SizeMismatch {
            expected: size,
            actual: written,
        });
    }
    if let Some(expected) = expected {
        if expected.algorithm() != actual.algorithm() {
            tracing::debug!(
                expected = %expected,
                "Skipping verification of unsupported digest algorithm"
            );
        } else if expected != actual {
            return Err(EciError::DigestMismatch {
                expected: expected.to_string(),
                actual: actual.to_string(),
            });
        }
    }
    Ok(())
}
