//! Verbose pull progress output.

use std::io::Write;

use parking_lot::Mutex;

use eci_core::Descriptor;

/// Prints one line per downloaded unit. Lines from concurrent downloads
/// never interleave.
pub struct StatusTracker {
    out: Mutex<Box<dyn Write + Send>>,
}

impl StatusTracker {
    pub fn new(out: impl Write + Send + 'static) -> Self {
        Self {
            out: Mutex::new(Box::new(out)),
        }
    }

    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }

    /// Report a finished unit. Units without a title are not reported.
    pub fn downloaded(&self, desc: &Descriptor) {
        let Some(name) = desc.title() else {
            return;
        };
        let mut out = self.out.lock();
        if let Err(e) = writeln!(out, "Downloaded {} {}", desc.digest.short(), name) {
            tracing::debug!(error = %e, "Failed to write progress");
        }
    }
}

impl std::fmt::Debug for StatusTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusTracker").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_downloaded_line() {
        let buf = SharedBuf::default();
        let tracker = StatusTracker::new(buf.clone());
        let desc = Descriptor::for_bytes("x", b"kernel bytes").with_title("kernel");

        tracker.downloaded(&desc);
        tracker.downloaded(&Descriptor::for_bytes("x", b"untitled"));

        let output = String::from_utf8(buf.0.lock().clone()).unwrap();
        assert_eq!(output, format!("Downloaded {} kernel\n", &desc.digest.encoded()[..12]));
    }

    #[test]
    fn test_concurrent_lines_do_not_interleave() {
        let buf = SharedBuf::default();
        let tracker = Arc::new(StatusTracker::new(buf.clone()));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let tracker = tracker.clone();
                std::thread::spawn(move || {
                    let desc = Descriptor::for_bytes("x", format!("{}", i).as_bytes())
                        .with_title(format!("layer-{}", i));
                    for _ in 0..50 {
                        tracker.downloaded(&desc);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let output = String::from_utf8(buf.0.lock().clone()).unwrap();
        assert_eq!(output.lines().count(), 400);
        assert!(output
            .lines()
            .all(|l| l.starts_with("Downloaded ") && l.split(' ').count() == 3));
    }
}
