//! Streaming decode procedures run inside a [`TransformPipe`].
//!
//! Each decoder reads the producer's bytes from `input` and writes decoded
//! bytes to `output` in chunks of a fixed size. Both are plain blocking
//! `std::io` streams; the pipe runs decoders on a blocking task.
//!
//! [`TransformPipe`]: crate::pipe::TransformPipe

use std::io::{self, Read, Write};

use flate2::read::MultiGzDecoder;

use eci_core::config::DEFAULT_CHUNK_SIZE;

/// A streaming decoder.
pub trait Decode: Send + Sync + 'static {
    /// Short name used in errors and logs.
    fn name(&self) -> &'static str;

    /// Decode `input` until it ends, writing the payload to `output`.
    ///
    /// Must return on the first error; the pipe records it.
    fn decode(&self, input: &mut dyn Read, output: &mut dyn Write) -> io::Result<()>;
}

/// Ungzips the stream. Concatenated gzip members decode back to back.
#[derive(Debug, Clone, Copy)]
pub struct Gunzip {
    chunk_size: usize,
}

impl Gunzip {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
        }
    }
}

impl Default for Gunzip {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE)
    }
}

impl Decode for Gunzip {
    fn name(&self) -> &'static str {
        "gunzip"
    }

    fn decode(&self, input: &mut dyn Read, output: &mut dyn Write) -> io::Result<()> {
        let mut decoder = MultiGzDecoder::new(input);
        let bytes = forward(&mut decoder, output, self.chunk_size)?;
        tracing::trace!(bytes, "Gunzip stream finished");
        Ok(())
    }
}

/// Extracts the body of every tar entry, in archive order, into one output.
///
/// Entries are not kept apart: a multi-entry archive comes out as the
/// concatenation of its file contents. ECI layers carry a single file.
#[derive(Debug, Clone, Copy)]
pub struct Untar {
    chunk_size: usize,
}

impl Untar {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
        }
    }
}

impl Default for Untar {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE)
    }
}

impl Decode for Untar {
    fn name(&self) -> &'static str {
        "untar"
    }

    fn decode(&self, input: &mut dyn Read, output: &mut dyn Write) -> io::Result<()> {
        let mut archive = tar::Archive::new(input);
        for entry in archive.entries()? {
            let mut entry = entry?;
            let bytes = forward(&mut entry, output, self.chunk_size)?;
            tracing::trace!(
                path = %entry.path().map(|p| p.display().to_string()).unwrap_or_default(),
                bytes,
                "Untar entry finished"
            );
        }
        Ok(())
    }
}

/// Copy `reader` to `output` one chunk at a time.
fn forward(reader: &mut dyn Read, output: &mut dyn Write, chunk_size: usize) -> io::Result<u64> {
    let mut buf = vec![0u8; chunk_size];
    let mut total = 0u64;
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => return Ok(total),
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        output.write_all(&buf[..n])?;
        total += n as u64;
    }
}
