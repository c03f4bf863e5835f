//! The buffered relay and its drain handle.

use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::io::{AsyncWrite, AsyncWriteExt, DuplexStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::fifo;
use crate::{RelayError, Result};

/// Default size of the in-memory buffer in front of the FIFO (10 MiB).
pub const DEFAULT_CAPACITY: usize = 10 * (1 << 20);

/// A FIFO path fed through a bounded in-memory buffer.
///
/// Writes land in the buffer and only wait when it is full; a background task
/// moves the bytes into the FIFO once a reader has opened [`Relay::path`].
pub struct Relay {
    path: PathBuf,
    writer: Option<DuplexStream>,
    handle: DrainHandle,
}

impl Relay {
    /// Create the FIFO at `path` with the default buffer size.
    pub fn create(path: impl Into<PathBuf>) -> Result<Self> {
        Self::with_capacity(path, DEFAULT_CAPACITY)
    }

    /// Create the FIFO at `path`, buffering up to `capacity` bytes in memory.
    ///
    /// Returns as soon as the FIFO exists; it never waits for a reader.
    /// Must be called from within a Tokio runtime.
    pub fn with_capacity(path: impl Into<PathBuf>, capacity: usize) -> Result<Self> {
        let path = path.into();
        fifo::make_fifo(&path).map_err(|source| RelayError::Create {
            path: path.clone(),
            source,
        })?;

        let (writer, buffered) = tokio::io::duplex(capacity.max(1));
        let handle = DrainHandle::new(&path);
        tokio::spawn(forward(buffered, handle.clone()));

        debug!(path = %path.display(), capacity, "Created relay");
        Ok(Self {
            path,
            writer: Some(writer),
            handle,
        })
    }

    /// The FIFO path consumers should open.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A handle that can drain this relay from another task.
    pub fn drain_handle(&self) -> DrainHandle {
        self.handle.clone()
    }

    /// Discard everything not yet consumed. See [`DrainHandle::drain`].
    pub fn drain(&self) {
        self.handle.drain();
    }

    pub fn is_closed(&self) -> bool {
        self.writer.is_none()
    }

    /// Flush buffered bytes towards the FIFO and signal end of data.
    ///
    /// The reader sees EOF only after every byte written before `close` has
    /// been delivered. Calling `close` again is a no-op.
    pub async fn close(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush().await?;
            writer.shutdown().await?;
            debug!(path = %self.path.display(), "Closed relay");
        }
        Ok(())
    }
}

impl std::fmt::Debug for Relay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Relay")
            .field("path", &self.path)
            .field("closed", &self.is_closed())
            .finish()
    }
}

fn closed_error() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "relay is closed")
}

impl AsyncWrite for Relay {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut().writer.as_mut() {
            Some(writer) => Pin::new(writer).poll_write(cx, buf),
            None => Poll::Ready(Err(closed_error())),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut().writer.as_mut() {
            Some(writer) => Pin::new(writer).poll_flush(cx),
            None => Poll::Ready(Ok(())),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let Some(writer) = this.writer.as_mut() else {
            return Poll::Ready(Ok(()));
        };
        let result = std::task::ready!(Pin::new(writer).poll_shutdown(cx));
        this.writer = None;
        Poll::Ready(result)
    }
}

/// Cloneable control over a relay's background copy task.
#[derive(Debug, Clone)]
pub struct DrainHandle {
    path: Arc<Path>,
    drain: CancellationToken,
    finished: CancellationToken,
}

impl DrainHandle {
    fn new(path: &Path) -> Self {
        Self {
            path: Arc::from(path),
            drain: CancellationToken::new(),
            finished: CancellationToken::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Throw away all unread bytes instead of delivering them.
    ///
    /// Used when no reader is ever going to show up (the player has exited)
    /// so that neither the copy task nor the producer stays blocked. A pending
    /// open of the FIFO is abandoned as well. Never blocks.
    pub fn drain(&self) {
        if !self.drain.is_cancelled() {
            debug!(path = %self.path.display(), "Draining relay");
            self.drain.cancel();
        }
    }

    pub fn is_draining(&self) -> bool {
        self.drain.is_cancelled()
    }

    /// Completes once the copy task has stopped: every byte was delivered or
    /// discarded and the write side has been closed, or the reader went away.
    pub async fn finished(&self) {
        self.finished.cancelled().await;
    }

    pub fn is_finished(&self) -> bool {
        self.finished.is_cancelled()
    }
}

async fn forward(mut buffered: DuplexStream, handle: DrainHandle) {
    let path = handle.path.clone();

    let opened = tokio::select! {
        biased;
        _ = handle.drain.cancelled() => None,
        opened = fifo::open_writer(&path) => Some(opened),
    };

    match opened {
        None => discard(&path, &mut buffered).await,
        Some(Err(e)) => {
            warn!(path = %path.display(), error = %e, "Failed to open FIFO for writing");
        }
        Some(Ok(mut sink)) => {
            debug!("Writing to FIFO {}", path.display());
            let copied = tokio::select! {
                biased;
                _ = handle.drain.cancelled() => None,
                copied = tokio::io::copy(&mut buffered, &mut sink) => Some(copied),
            };
            drop(sink);

            match copied {
                None => discard(&path, &mut buffered).await,
                Some(Ok(bytes)) => {
                    debug!(path = %path.display(), bytes, "Relay delivered all data");
                }
                Some(Err(e)) if e.kind() == io::ErrorKind::BrokenPipe => {
                    warn!("Reader of {} went away before the end of the stream", path.display());
                }
                Some(Err(e)) => {
                    warn!(path = %path.display(), error = %e, "Relay copy failed");
                }
            }
        }
    }

    // Dropping our end makes pending and future producer writes fail with
    // `BrokenPipe` instead of blocking on a buffer nobody empties.
    drop(buffered);
    handle.finished.cancel();
}

async fn discard(path: &Path, buffered: &mut DuplexStream) {
    match tokio::io::copy(buffered, &mut tokio::io::sink()).await {
        Ok(bytes) => debug!(path = %path.display(), bytes, "Drained relay"),
        Err(e) => debug!(path = %path.display(), error = %e, "Relay drain stopped"),
    }
}
