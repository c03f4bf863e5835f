//! Downloader supervision.
//!
//! One downloader process per URL writes the media stream to its stdout,
//! which is pumped into a [`Relay`]. The relay's FIFO path is what the player
//! gets to load.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use process_utils::ProcessHandle;
use stream_relay::{Relay, RelayError};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("relay error: {0}")]
    Relay(#[from] RelayError),

    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to capture {0}")]
    Capture(&'static str),

    #[error("pipeline is shutting down")]
    Cancelled,
}

/// Downloader settings.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Downloader executable.
    pub program: String,
    /// Bytes buffered in memory per relay.
    pub buffer_size: usize,
    /// Time a downloader gets to exit after SIGTERM before it is killed.
    pub stop_grace: Duration,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            program: "youtube-dl".to_string(),
            buffer_size: stream_relay::DEFAULT_CAPACITY,
            stop_grace: Duration::from_secs(5),
        }
    }
}

impl FetchConfig {
    /// Arguments for fetching `url` quietly to stdout.
    pub fn args(&self, url: &str) -> Vec<String> {
        vec![
            "-q".to_string(),
            "-o".to_string(),
            "-".to_string(),
            url.to_string(),
        ]
    }
}

/// Starts downloaders into relays inside a scratch directory and keeps track
/// of them until they are done.
pub struct FetchSupervisor {
    scratch: PathBuf,
    config: FetchConfig,
    last: usize,
    tracker: TaskTracker,
    active: Arc<AtomicUsize>,
}

impl FetchSupervisor {
    pub fn new(scratch: impl Into<PathBuf>, config: FetchConfig) -> Self {
        Self {
            scratch: scratch.into(),
            config,
            last: 0,
            tracker: TaskTracker::new(),
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Start fetching `url` and return the relay path to play it from.
    ///
    /// Returns as soon as the downloader is running; the path can be handed to
    /// the player right away. When `cancel` fires the downloader is terminated
    /// and its relay drained.
    pub async fn add_stream(
        &mut self,
        cancel: &CancellationToken,
        url: &str,
    ) -> Result<PathBuf, FetchError> {
        if cancel.is_cancelled() {
            return Err(FetchError::Cancelled);
        }

        let path = self.next_relay_path();
        let mut relay = Relay::with_capacity(&path, self.config.buffer_size)?;

        let mut command = process_utils::tokio_command(&self.config.program);
        command
            .args(self.config.args(url))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(source) => {
                discard_relay(relay).await;
                return Err(FetchError::Spawn {
                    program: self.config.program.clone(),
                    source,
                });
            }
        };
        let stdout = match child.stdout.take() {
            Some(stdout) => stdout,
            None => {
                let _ = child.start_kill();
                discard_relay(relay).await;
                return Err(FetchError::Capture("downloader stdout"));
            }
        };
        let process = ProcessHandle::new(self.config.program.clone(), child);
        info!(
            url = %url,
            pid = ?process.pid(),
            "Started {} for {} to {}",
            self.config.program,
            url,
            path.display()
        );

        let done = CancellationToken::new();
        let drain = relay.drain_handle();
        self.active.fetch_add(1, Ordering::SeqCst);

        // Normal exit: pump stdout into the relay, then close it.
        self.tracker.spawn({
            let process = process.clone();
            let done = done.clone();
            let active = self.active.clone();
            let path = path.clone();
            async move {
                let pump = async move {
                    let mut stdout = stdout;
                    let copied = tokio::io::copy(&mut stdout, &mut relay).await;
                    if let Err(e) = relay.close().await {
                        debug!(path = %path.display(), error = %e, "Failed to close relay");
                    }
                    (copied, path)
                };
                let ((copied, path), code) = tokio::join!(pump, process.wait());

                match copied {
                    Ok(bytes) => {
                        debug!(path = %path.display(), bytes, "Downloader output finished");
                    }
                    Err(e) => {
                        warn!(
                            path = %path.display(),
                            error = %e,
                            "Relay stopped accepting downloader output"
                        );
                    }
                }
                match code {
                    Some(0) => info!("{} for {} exited", process.name(), path.display()),
                    Some(c) => {
                        warn!("{} for {} exited with code {}", process.name(), path.display(), c);
                    }
                    None => info!("{} for {} was stopped", process.name(), path.display()),
                }

                active.fetch_sub(1, Ordering::SeqCst);
                done.cancel();
            }
        });

        // Cancellation: stop the downloader and make sure the relay cannot
        // keep anything blocked, also after a finished download nobody read.
        self.tracker.spawn({
            let cancel = cancel.clone();
            let grace = self.config.stop_grace;
            let path = path.clone();
            async move {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        info!("Stopping {} for {}", process.name(), path.display());
                        drain.drain();
                        process.stop(grace).await;
                    }
                    _ = done.cancelled() => {}
                }

                tokio::select! {
                    _ = cancel.cancelled() => drain.drain(),
                    _ = drain.finished() => {}
                }
                drain.finished().await;
            }
        });

        Ok(path)
    }

    /// Number of downloaders still running.
    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Wait until every downloader has exited and every relay has finished.
    ///
    /// Unread relays only finish once they are drained, so this is meant to be
    /// called after cancellation.
    pub async fn wait(&self) {
        info!("Waiting for streams");
        self.tracker.close();
        self.tracker.wait().await;
    }

    fn next_relay_path(&mut self) -> PathBuf {
        self.last += 1;
        self.scratch.join(format!("fifo{}", self.last))
    }
}

/// Give up on a relay nobody is ever going to open.
async fn discard_relay(mut relay: Relay) {
    let handle = relay.drain_handle();
    handle.drain();
    let _ = relay.close().await;
    handle.finished().await;
}
