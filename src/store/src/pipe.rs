//! Transform pipe: run a streaming decoder between a producer and a sink.
//!
//! ```text
//!  producer ──write()──► [bounded channel] ──► decode task ──write()──► downstream
//!           ◄─close()─── waits on completion ◄── fires once when decode ends
//! ```
//!
//! The producer sees a [`ContentWriter`]. Every `write` hands a chunk to a
//! bounded channel and suspends while the channel is full, so a slow decoder
//! or a slow downstream throttles the producer. The decode task runs on a
//! blocking thread, reads the channel through a `std::io::Read` adapter and
//! forwards decoded bytes through a `std::io::Write` adapter into the
//! downstream writer.
//!
//! The first error the task hits (malformed input, downstream rejection,
//! cancellation, read timeout) stops it, fires the completion signal and is
//! reported on the producer's next `write`, `close` or `commit`.

use std::io::{self, Read, Write};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Buf, Bytes};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio_util::sync::CancellationToken;

use eci_core::error::{EciError, Result};
use eci_core::{Digest, Digester, PullConfig};

use crate::content::{verify, write_all, ContentWriter, Status};
use crate::transform::{Decode, Gunzip, Untar};

/// Tuning shared by every pipe a store builds.
#[derive(Debug, Clone)]
pub struct PipeOptions {
    /// Bytes per forwarded chunk
    pub chunk_size: usize,
    /// Chunks buffered between producer and decoder
    pub depth: usize,
    /// Bound on one blocking read in the decode task
    pub read_timeout: Option<Duration>,
    /// Parent token; each pipe listens on a child of it
    pub cancel: CancellationToken,
}

impl PipeOptions {
    pub fn from_config(config: &PullConfig) -> Self {
        Self {
            chunk_size: config.chunk_size,
            depth: config.pipe_depth,
            read_timeout: config.read_timeout(),
            cancel: CancellationToken::new(),
        }
    }
}

impl Default for PipeOptions {
    fn default() -> Self {
        Self::from_config(&PullConfig::default())
    }
}

type SharedWriter = Arc<Mutex<Box<dyn ContentWriter>>>;

/// A [`ContentWriter`] that decodes what it is given before passing it on.
pub struct TransformPipe {
    name: &'static str,
    /// Producer end of the channel; `None` once input is finished
    input: Option<mpsc::Sender<Bytes>>,
    /// Completion signal from the decode task
    completion: Option<oneshot::Receiver<Result<()>>>,
    /// Decode outcome once the completion signal has fired
    outcome: Option<Result<()>>,
    /// Result of the first `close`, returned again on later calls
    closed: Option<Result<()>>,
    committed: bool,
    downstream: SharedWriter,
    digester: Digester,
    written: u64,
    cancel: CancellationToken,
}

impl TransformPipe {
    /// Start `decoder` in front of `downstream`.
    ///
    /// The decode task starts immediately. Must be called within a tokio
    /// runtime.
    pub fn new(
        decoder: impl Decode,
        downstream: Box<dyn ContentWriter>,
        options: &PipeOptions,
    ) -> Result<Self> {
        let handle = Handle::try_current().map_err(|_| {
            EciError::Other("transform pipe requires a tokio runtime".to_string())
        })?;

        let name = decoder.name();
        let cancel = options.cancel.child_token();
        let (input_tx, input_rx) = mpsc::channel(options.depth.max(1));
        let (done_tx, done_rx) = oneshot::channel();
        let downstream: SharedWriter = Arc::new(Mutex::new(downstream));

        let reader = PipeReader {
            rx: input_rx,
            pending: Bytes::new(),
            handle: handle.clone(),
            cancel: cancel.clone(),
            timeout: options.read_timeout,
            error: None,
            eof: false,
        };
        let forwarder = Forwarder {
            downstream: downstream.clone(),
            handle: handle.clone(),
            cancel: cancel.clone(),
            error: None,
        };

        handle.spawn_blocking(move || {
            let result = run_decode(&decoder, reader, forwarder);
            // Receiver is gone only if the pipe was dropped.
            let _ = done_tx.send(result);
        });

        tracing::trace!(transform = name, "Started transform pipe");

        Ok(Self {
            name,
            input: Some(input_tx),
            completion: Some(done_rx),
            outcome: None,
            closed: None,
            committed: false,
            downstream,
            digester: Digester::new(),
            written: 0,
            cancel,
        })
    }

    /// Gunzip everything written before it reaches `downstream`.
    pub fn gunzip(downstream: Box<dyn ContentWriter>, options: &PipeOptions) -> Result<Self> {
        Self::new(Gunzip::new(options.chunk_size), downstream, options)
    }

    /// Extract tar entry bodies before they reach `downstream`.
    pub fn untar(downstream: Box<dyn ContentWriter>, options: &PipeOptions) -> Result<Self> {
        Self::new(Untar::new(options.chunk_size), downstream, options)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Bytes accepted from the producer.
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Abort the decode task. Pending and later calls fail with
    /// [`EciError::Cancelled`].
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Signal EOF to the decoder and wait for the completion signal.
    async fn finish_input(&mut self) -> Result<()> {
        self.input = None;
        if let Some(outcome) = &self.outcome {
            return outcome.clone();
        }

        let outcome = match self.completion.take() {
            Some(done) => done.await.unwrap_or_else(|_| {
                Err(EciError::Other(format!(
                    "{} task ended without reporting",
                    self.name
                )))
            }),
            None => Err(EciError::Other(format!("{} task already reaped", self.name))),
        };

        if let Err(e) = &outcome {
            tracing::debug!(transform = self.name, error = %e, "Transform failed");
        }
        self.outcome = Some(outcome.clone());
        outcome
    }
}

#[async_trait]
impl ContentWriter for TransformPipe {
    async fn write(&mut self, buf: &[u8]) -> Result<usize> {
        if self.closed.is_some() || self.committed {
            return Err(EciError::AlreadyClosed);
        }
        if let Some(Err(e)) = &self.outcome {
            return Err(e.clone());
        }
        if buf.is_empty() {
            return Ok(0);
        }

        let input = self.input.as_ref().ok_or(EciError::AlreadyClosed)?;
        let sent = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(EciError::Cancelled),
            sent = input.send(Bytes::copy_from_slice(buf)) => sent,
        };

        if sent.is_err() {
            // The task stopped reading; its outcome says why.
            return match self.finish_input().await {
                Err(e) => Err(e),
                Ok(()) => Err(EciError::Other(format!(
                    "{} finished before the input ended",
                    self.name
                ))),
            };
        }

        self.digester.update(buf);
        self.written += buf.len() as u64;
        Ok(buf.len())
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(result) = &self.closed {
            return result.clone();
        }

        let decoded = self.finish_input().await;
        let released = self.downstream.lock().await.close().await;
        let result = decoded.and(released);

        self.closed = Some(result.clone());
        result
    }

    /// Validate the producer's bytes against `size` and `expected`, then
    /// commit the downstream writer with whatever it decoded.
    async fn commit(&mut self, size: u64, expected: Option<&Digest>) -> Result<()> {
        if self.committed {
            return Ok(());
        }

        self.finish_input().await?;
        verify(self.written, &self.digester.digest(), size, expected)?;
        self.downstream.lock().await.commit(0, None).await?;
        self.committed = true;

        tracing::debug!(
            transform = self.name,
            digest = %self.digester.digest(),
            bytes = self.written,
            "Committed transformed content"
        );
        Ok(())
    }

    fn digest(&self) -> Digest {
        self.digester.digest()
    }

    async fn status(&self) -> Result<Status> {
        self.downstream.lock().await.status().await
    }
}

impl Drop for TransformPipe {
    fn drop(&mut self) {
        // An abandoned pipe must not keep decoding into its sink.
        if self.closed.is_none() && !self.committed {
            self.cancel.cancel();
        }
    }
}

/// Body of the decode task.
fn run_decode(decoder: &dyn Decode, mut reader: PipeReader, mut forwarder: Forwarder) -> Result<()> {
    let decoded = decoder
        .decode(&mut reader, &mut forwarder)
        // Trailing bytes (tar record padding) must not stall the producer.
        .and_then(|()| io::copy(&mut reader, &mut io::sink()).map(|_| ()));

    match decoded {
        Ok(()) => Ok(()),
        Err(err) => Err(reader
            .error
            .take()
            .or_else(|| forwarder.error.take())
            .unwrap_or_else(|| EciError::decode(decoder.name(), err))),
    }
}

fn to_io(err: &EciError) -> io::Error {
    io::Error::new(io::ErrorKind::Other, err.to_string())
}

/// Blocking reader over the producer channel.
struct PipeReader {
    rx: mpsc::Receiver<Bytes>,
    pending: Bytes,
    handle: Handle,
    cancel: CancellationToken,
    timeout: Option<Duration>,
    error: Option<EciError>,
    eof: bool,
}

impl PipeReader {
    fn next_chunk(&mut self) -> Result<Option<Bytes>> {
        let Self {
            rx,
            handle,
            cancel,
            timeout,
            ..
        } = self;
        let timeout = *timeout;

        handle.block_on(async move {
            let recv = async {
                match timeout {
                    Some(limit) => tokio::time::timeout(limit, rx.recv()).await.map_err(|_| {
                        EciError::TimeoutError(format!("no input for {}s", limit.as_secs_f64()))
                    }),
                    None => Ok(rx.recv().await),
                }
            };
            tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(EciError::Cancelled),
                chunk = recv => chunk,
            }
        })
    }
}

impl Read for PipeReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if let Some(e) = &self.error {
            return Err(to_io(e));
        }
        if buf.is_empty() {
            return Ok(0);
        }

        while self.pending.is_empty() {
            if self.eof {
                return Ok(0);
            }
            match self.next_chunk() {
                Ok(Some(chunk)) => self.pending = chunk,
                Ok(None) => self.eof = true,
                Err(e) => {
                    let io_err = to_io(&e);
                    self.error = Some(e);
                    return Err(io_err);
                }
            }
        }

        let n = buf.len().min(self.pending.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.advance(n);
        Ok(n)
    }
}

/// Blocking writer into the downstream [`ContentWriter`].
struct Forwarder {
    downstream: SharedWriter,
    handle: Handle,
    cancel: CancellationToken,
    error: Option<EciError>,
}

impl Write for Forwarder {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if let Some(e) = &self.error {
            return Err(to_io(e));
        }

        let result = {
            let mut downstream = self.downstream.blocking_lock();
            let cancel = &self.cancel;
            self.handle.block_on(async {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => Err(EciError::Cancelled),
                    written = write_all(&mut **downstream, buf) => {
                        written.map_err(|e| EciError::Downstream(Box::new(e)))
                    }
                }
            })
        };

        match result {
            Ok(()) => Ok(buf.len()),
            Err(err) => {
                let io_err = to_io(&err);
                self.error = Some(err);
                Err(io_err)
            }
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::{Gunzip, Untar};
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use parking_lot::Mutex as SyncMutex;
    use rand::{Rng, RngCore};

    /// Downstream writer recording everything it receives.
    #[derive(Clone, Default)]
    struct Recorder {
        data: Arc<SyncMutex<Vec<u8>>>,
        closed: Arc<SyncMutex<bool>>,
        committed: Arc<SyncMutex<bool>>,
        delay: Option<Duration>,
        fail_after: Option<usize>,
    }

    impl Recorder {
        fn slow(delay: Duration) -> Self {
            Self {
                delay: Some(delay),
                ..Default::default()
            }
        }

        fn failing_after(bytes: usize) -> Self {
            Self {
                fail_after: Some(bytes),
                ..Default::default()
            }
        }

        fn data(&self) -> Vec<u8> {
            self.data.lock().clone()
        }
    }

    #[async_trait]
    impl ContentWriter for Recorder {
        async fn write(&mut self, buf: &[u8]) -> Result<usize> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            let mut data = self.data.lock();
            if let Some(limit) = self.fail_after {
                if data.len() + buf.len() > limit {
                    return Err(EciError::Other("disk full".to_string()));
                }
            }
            data.extend_from_slice(buf);
            Ok(buf.len())
        }

        async fn close(&mut self) -> Result<()> {
            *self.closed.lock() = true;
            Ok(())
        }

        async fn commit(&mut self, _size: u64, _expected: Option<&Digest>) -> Result<()> {
            *self.committed.lock() = true;
            Ok(())
        }

        fn digest(&self) -> Digest {
            Digest::from_bytes(&self.data.lock())
        }

        async fn status(&self) -> Result<Status> {
            let now = chrono::Utc::now();
            Ok(Status {
                reference: "recorder".to_string(),
                offset: self.data.lock().len() as u64,
                total: 0,
                started_at: now,
                updated_at: now,
            })
        }
    }

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::fast());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    fn tarball(name: &str, data: &[u8]) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, name, data).unwrap();
        builder.into_inner().unwrap()
    }

    fn random_payload(len: usize) -> Vec<u8> {
        let mut payload = vec![0u8; len];
        rand::thread_rng().fill_bytes(&mut payload);
        payload
    }

    async fn write_in_chunks(pipe: &mut dyn ContentWriter, data: &[u8], chunk: usize) {
        for part in data.chunks(chunk) {
            write_all(pipe, part).await.unwrap();
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_gunzip_roundtrip_any_chunking() {
        let payload = random_payload(100_000);
        let compressed = gzip(&payload);

        for chunk in [1, 7, 512, 10_240, compressed.len()] {
            let recorder = Recorder::default();
            let mut pipe =
                TransformPipe::gunzip(Box::new(recorder.clone()), &PipeOptions::default()).unwrap();
            write_in_chunks(&mut pipe, &compressed, chunk).await;
            pipe.close().await.unwrap();
            assert_eq!(recorder.data(), payload, "chunk size {}", chunk);
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_untar_roundtrip() {
        let payload = random_payload(30_000);
        let recorder = Recorder::default();
        let mut pipe =
            TransformPipe::untar(Box::new(recorder.clone()), &PipeOptions::default()).unwrap();

        write_in_chunks(&mut pipe, &tarball("rootfs.img", &payload), 4096).await;
        pipe.close().await.unwrap();

        assert_eq!(recorder.data(), payload);
        assert!(*recorder.closed.lock());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_chained_gunzip_untar() {
        let payload = random_payload(64 * 1024 + 17);
        let wire = gzip(&tarball("kernel", &payload));

        let recorder = Recorder::default();
        let options = PipeOptions::default();
        let untar = TransformPipe::untar(Box::new(recorder.clone()), &options).unwrap();
        let mut gunzip = TransformPipe::gunzip(Box::new(untar), &options).unwrap();

        write_in_chunks(&mut gunzip, &wire, 1000).await;
        gunzip.commit(wire.len() as u64, Some(&Digest::from_bytes(&wire))).await.unwrap();
        gunzip.close().await.unwrap();

        assert_eq!(recorder.data(), payload);
        assert!(*recorder.committed.lock());
        assert!(*recorder.closed.lock());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_backpressure_with_slow_downstream() {
        let payload = random_payload(200_000);
        let compressed = gzip(&payload);
        let recorder = Recorder::slow(Duration::from_millis(2));
        let options = PipeOptions {
            chunk_size: 4096,
            ..Default::default()
        };

        let mut pipe = TransformPipe::gunzip(Box::new(recorder.clone()), &options).unwrap();
        write_in_chunks(&mut pipe, &compressed, 8192).await;
        assert_eq!(pipe.written(), compressed.len() as u64);
        pipe.close().await.unwrap();

        assert_eq!(recorder.data().len(), payload.len());
        assert_eq!(recorder.data(), payload);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_close_waits_for_last_chunk() {
        // Slow enough that an early return from close would be visible
        let payload = random_payload(50_000);
        let recorder = Recorder::slow(Duration::from_millis(5));
        let options = PipeOptions {
            chunk_size: 1024,
            ..Default::default()
        };

        let mut pipe = TransformPipe::gunzip(Box::new(recorder.clone()), &options).unwrap();
        write_all(&mut pipe, &gzip(&payload)).await.unwrap();
        pipe.close().await.unwrap();

        assert_eq!(recorder.data(), payload);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_truncated_gzip_header_surfaces_decode_error() {
        let recorder = Recorder::default();
        let mut pipe =
            TransformPipe::gunzip(Box::new(recorder.clone()), &PipeOptions::default()).unwrap();

        // 4 valid header bytes (magic, deflate, no flags) + 4 arbitrary
        pipe.write(&[0x1f, 0x8b, 0x08, 0x00]).await.unwrap();
        let _ = pipe.write(&[0xde, 0xad, 0xbe, 0xef]).await;
        let result = pipe.close().await;

        assert!(matches!(result, Err(EciError::Decode { ref transform, .. }) if transform == "gunzip"));
        assert!(recorder.data().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_decode_error_reaches_next_write() {
        let mut pipe =
            TransformPipe::gunzip(Box::new(Recorder::default()), &PipeOptions::default()).unwrap();

        // Invalid magic fails as soon as the decoder looks at it
        let mut failure = None;
        for _ in 0..100 {
            if let Err(e) = pipe.write(b"this is not a gzip stream").await {
                failure = Some(e);
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        assert!(matches!(failure, Some(EciError::Decode { .. })));
        assert!(matches!(pipe.close().await, Err(EciError::Decode { .. })));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_downstream_error_propagates() {
        let payload = random_payload(100_000);
        let options = PipeOptions {
            chunk_size: 1024,
            ..Default::default()
        };
        let mut pipe =
            TransformPipe::gunzip(Box::new(Recorder::failing_after(10_000)), &options).unwrap();

        let compressed = gzip(&payload);
        let mut result = Ok(());
        for part in compressed.chunks(1024) {
            if let Err(e) = write_all(&mut pipe, part).await {
                result = Err(e);
                break;
            }
        }
        let result = result.and(pipe.close().await);

        match result {
            Err(EciError::Downstream(inner)) => assert_eq!(inner.to_string(), "disk full"),
            other => panic!("expected downstream error, got {:?}", other),
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_double_close_returns_same_state() {
        let mut pipe =
            TransformPipe::gunzip(Box::new(Recorder::default()), &PipeOptions::default()).unwrap();
        pipe.write(b"garbage!").await.ok();

        let first = pipe.close().await.unwrap_err().to_string();
        let second = pipe.close().await.unwrap_err().to_string();
        assert_eq!(first, second);

        let recorder = Recorder::default();
        let mut ok_pipe =
            TransformPipe::gunzip(Box::new(recorder), &PipeOptions::default()).unwrap();
        write_all(&mut ok_pipe, &gzip(b"fine")).await.unwrap();
        assert!(ok_pipe.close().await.is_ok());
        assert!(ok_pipe.close().await.is_ok());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_write_after_close_fails() {
        let mut pipe =
            TransformPipe::gunzip(Box::new(Recorder::default()), &PipeOptions::default()).unwrap();
        write_all(&mut pipe, &gzip(b"x")).await.unwrap();
        pipe.close().await.unwrap();

        assert!(matches!(
            pipe.write(b"more").await,
            Err(EciError::AlreadyClosed)
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_commit_validates_wire_digest() {
        let compressed = gzip(b"payload");
        let mut pipe =
            TransformPipe::gunzip(Box::new(Recorder::default()), &PipeOptions::default()).unwrap();
        write_all(&mut pipe, &compressed).await.unwrap();

        assert_eq!(pipe.digest(), Digest::from_bytes(&compressed));
        let wrong = Digest::from_bytes(b"payload");
        assert!(matches!(
            pipe.commit(0, Some(&wrong)).await,
            Err(EciError::DigestMismatch { .. })
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_commit_validates_wire_size() {
        let compressed = gzip(b"payload");
        let mut pipe =
            TransformPipe::gunzip(Box::new(Recorder::default()), &PipeOptions::default()).unwrap();
        write_all(&mut pipe, &compressed).await.unwrap();

        assert!(matches!(
            pipe.commit(compressed.len() as u64 + 1, None).await,
            Err(EciError::SizeMismatch { .. })
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_cancellation_fails_pending_decode() {
        let options = PipeOptions::default();
        let mut pipe = TransformPipe::gunzip(Box::new(Recorder::default()), &options).unwrap();

        // Half a stream, then the caller gives up
        let compressed = gzip(&random_payload(10_000));
        write_all(&mut pipe, &compressed[..compressed.len() / 2]).await.unwrap();
        options.cancel.cancel();

        assert!(matches!(pipe.write(b"more").await, Err(EciError::Cancelled)));
        assert!(matches!(pipe.close().await, Err(EciError::Cancelled)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_cancellation_unblocks_stalled_downstream() {
        let options = PipeOptions::default();
        let recorder = Recorder::slow(Duration::from_secs(3600));
        let mut pipe = TransformPipe::gunzip(Box::new(recorder.clone()), &options).unwrap();

        // One chunk is enough to park the decode task in the downstream write
        let compressed = gzip(&random_payload(100_000));
        pipe.write(&compressed).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        options.cancel.cancel();

        let result = tokio::time::timeout(Duration::from_secs(5), pipe.close())
            .await
            .expect("close blocked after cancellation");
        assert!(matches!(result, Err(EciError::Cancelled)), "{:?}", result);
        assert!(recorder.data().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_read_timeout_bounds_stalled_producer() {
        let options = PipeOptions {
            read_timeout: Some(Duration::from_millis(50)),
            ..Default::default()
        };
        let mut pipe = TransformPipe::gunzip(Box::new(Recorder::default()), &options).unwrap();
        pipe.write(&[0x1f, 0x8b]).await.unwrap();

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(matches!(pipe.close().await, Err(EciError::TimeoutError(_))));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_tar_padding_is_drained() {
        let payload = b"single entry".to_vec();
        let mut archive = tarball("f", &payload);
        // Record padding after the end-of-archive blocks
        archive.extend(vec![0u8; 10 * 1024]);

        let recorder = Recorder::default();
        let options = PipeOptions::default();
        let mut pipe = TransformPipe::untar(Box::new(recorder.clone()), &options).unwrap();
        write_in_chunks(&mut pipe, &archive, 512).await;
        pipe.close().await.unwrap();

        assert_eq!(recorder.data(), payload);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_status_passes_through() {
        let recorder = Recorder::default();
        let mut pipe =
            TransformPipe::gunzip(Box::new(recorder.clone()), &PipeOptions::default()).unwrap();
        write_all(&mut pipe, &gzip(b"0123456789")).await.unwrap();
        pipe.commit(0, None).await.unwrap();

        let status = pipe.status().await.unwrap();
        assert_eq!(status.reference, "recorder");
        assert_eq!(status.offset, 10);
    }

    #[test]
    fn test_requires_runtime() {
        let result = TransformPipe::new(
            Untar::default(),
            Box::new(Recorder::default()),
            &PipeOptions::default(),
        );
        assert!(result.is_err());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_many_pipes_are_independent() {
        let mut handles = Vec::new();
        for _ in 0..8 {
            handles.push(tokio::spawn(async {
                let len = rand::thread_rng().gen_range(1..50_000);
                let payload = random_payload(len);
                let recorder = Recorder::default();
                let mut pipe = TransformPipe::new(
                    Gunzip::new(777),
                    Box::new(recorder.clone()),
                    &PipeOptions::default(),
                )
                .unwrap();
                write_in_chunks(&mut pipe, &gzip(&payload), 333).await;
                pipe.close().await.unwrap();
                assert_eq!(recorder.data(), payload);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
    }
}
