//! Output duplication for build steps
//!
//! Build output has to reach the console as it is produced and, when log
//! upload is enabled, also land verbatim in an in-memory buffer. The
//! [`OutputDuplicator`] fans every chunk out to its sinks in one locked pass,
//! so each sink sees the same bytes in the same order.
//!
//! Executors pipe child stdout/stderr into [`OutputDuplicator::drain`] tasks
//! and await those tasks after the child exits. Once they complete, every
//! byte the command wrote is in every sink.

use std::fmt;
use std::io::{self, Write};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::task::JoinHandle;

/// A destination for duplicated output
pub type Sink = Box<dyn Write + Send>;

const DRAIN_CHUNK: usize = 8 * 1024;

/// Growable byte buffer that can be shared between a sink and its reader
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer {
    bytes: Arc<Mutex<Vec<u8>>>,
}

impl SharedBuffer {
    /// Create an empty buffer
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the bytes written so far
    #[must_use]
    pub fn contents(&self) -> Vec<u8> {
        self.lock().clone()
    }

    /// Contents as text, with invalid UTF-8 replaced
    #[must_use]
    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(&self.lock()).into_owned()
    }

    /// Number of bytes buffered
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether nothing has been written
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<u8>> {
        self.bytes.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Fans output out to a set of sinks.
///
/// Cloning is cheap; clones share the same sinks.
#[derive(Clone, Default)]
pub struct OutputDuplicator {
    sinks: Arc<Mutex<Vec<Sink>>>,
    capture: Option<SharedBuffer>,
}

impl OutputDuplicator {
    /// Duplicator with no sinks; output is discarded until one is added
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Duplicator writing to stdout, optionally capturing as well
    #[must_use]
    pub fn console(capture: bool) -> Self {
        let duplicator = Self::new().with_sink(Box::new(io::stdout()));
        if capture {
            duplicator.with_capture()
        } else {
            duplicator
        }
    }

    /// Add a sink
    #[must_use]
    pub fn with_sink(self, sink: Sink) -> Self {
        self.lock().push(sink);
        self
    }

    /// Add an in-memory capture sink, readable through [`Self::captured`]
    #[must_use]
    pub fn with_capture(mut self) -> Self {
        if self.capture.is_none() {
            let buffer = SharedBuffer::new();
            self.lock().push(Box::new(buffer.clone()));
            self.capture = Some(buffer);
        }
        self
    }

    /// The capture buffer, if capture is enabled
    #[must_use]
    pub fn captured(&self) -> Option<&SharedBuffer> {
        self.capture.as_ref()
    }

    /// Whether output is being captured
    #[must_use]
    pub fn is_capturing(&self) -> bool {
        self.capture.is_some()
    }

    /// Write `bytes` to every sink.
    ///
    /// A failing sink does not prevent the others from receiving the bytes.
    ///
    /// # Errors
    ///
    /// Returns the first sink error.
    pub fn write_bytes(&self, bytes: &[u8]) -> io::Result<()> {
        let mut sinks = self.lock();
        let mut first_error = None;
        for sink in sinks.iter_mut() {
            if let Err(e) = sink.write_all(bytes).and_then(|()| sink.flush()) {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Write one line of kiln's own output (summary, progress) to every sink.
    pub fn line(&self, text: impl fmt::Display) {
        if let Err(e) = self.write_bytes(format!("{text}\n").as_bytes()) {
            tracing::warn!(error = %e, "Failed to write build output");
        }
    }

    /// Copy everything from `reader` into the sinks on a background task.
    ///
    /// The task finishes when `reader` reaches EOF and returns the byte count.
    pub fn drain<R>(&self, mut reader: R) -> JoinHandle<io::Result<u64>>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let duplicator = self.clone();
        tokio::spawn(async move {
            let mut buf = vec![0u8; DRAIN_CHUNK];
            let mut total = 0u64;
            let mut warned = false;
            loop {
                let n = reader.read(&mut buf).await?;
                if n == 0 {
                    return Ok(total);
                }
                // Keep reading on sink errors so the child never blocks on a full pipe
                if let Err(e) = duplicator.write_bytes(&buf[..n])
                    && !warned
                {
                    tracing::warn!(error = %e, "Output sink failed, continuing");
                    warned = true;
                }
                total += n as u64;
            }
        })
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Sink>> {
        self.sinks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for OutputDuplicator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputDuplicator")
            .field("sinks", &self.lock().len())
            .field("capturing", &self.is_capturing())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn test_capture_matches_console_byte_for_byte() {
        let console = SharedBuffer::new();
        let duplicator = OutputDuplicator::new()
            .with_sink(Box::new(console.clone()))
            .with_capture();

        let (mut tx, rx) = tokio::io::duplex(7);
        let drain = duplicator.drain(rx);

        let mut expected = Vec::new();
        for i in 0..500u32 {
            let chunk = format!("{i}:{}|", "x".repeat((i % 5) as usize));
            tx.write_all(chunk.as_bytes()).await.unwrap();
            expected.extend_from_slice(chunk.as_bytes());
        }
        drop(tx);
        let drained = drain.await.unwrap().unwrap();

        assert_eq!(drained, expected.len() as u64);
        assert_eq!(duplicator.captured().unwrap().contents(), expected);
        assert_eq!(console.contents(), expected);
    }

    #[tokio::test]
    async fn test_interleaved_drains_lose_nothing() {
        let duplicator = OutputDuplicator::new().with_capture();

        let (mut out_tx, out_rx) = tokio::io::duplex(3);
        let (mut err_tx, err_rx) = tokio::io::duplex(3);
        let out = duplicator.drain(out_rx);
        let err = duplicator.drain(err_rx);

        let writer = tokio::spawn(async move {
            for _ in 0..200 {
                out_tx.write_all(b"o").await.unwrap();
                err_tx.write_all(b"e").await.unwrap();
            }
        });
        writer.await.unwrap();

        out.await.unwrap().unwrap();
        err.await.unwrap().unwrap();

        let captured = duplicator.captured().unwrap().to_string_lossy();
        assert_eq!(captured.len(), 400);
        assert_eq!(captured.matches('o').count(), 200);
        assert_eq!(captured.matches('e').count(), 200);
    }

    #[test]
    fn test_lines_and_bytes_reach_every_sink() {
        let a = SharedBuffer::new();
        let b = SharedBuffer::new();
        let duplicator = OutputDuplicator::new()
            .with_sink(Box::new(a.clone()))
            .with_sink(Box::new(b.clone()));

        duplicator.line("Build finished");
        duplicator.write_bytes(b"tail").unwrap();

        assert_eq!(a.to_string_lossy(), "Build finished\ntail");
        assert_eq!(a.contents(), b.contents());
        assert!(duplicator.captured().is_none());
    }

    #[test]
    fn test_failing_sink_does_not_starve_others() {
        struct Broken;
        impl Write for Broken {
            fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
                Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
            }
            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        let duplicator = OutputDuplicator::new()
            .with_sink(Box::new(Broken))
            .with_capture();

        assert!(duplicator.write_bytes(b"still captured").is_err());
        assert_eq!(
            duplicator.captured().unwrap().contents(),
            b"still captured".to_vec()
        );
    }
}
