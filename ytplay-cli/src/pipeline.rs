//! Pipeline coordination.
//!
//! Every URL gets a fetch into a fresh relay; the relay paths are handed to
//! the player strictly in input order. Shutdown always runs the same way:
//! cancel, stop the player, wait for every fetch.

use std::path::{Path, PathBuf};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::fetch::{FetchConfig, FetchError, FetchSupervisor};
use crate::playback::{PlaybackState, PlaybackSupervisor, PlayerConfig};

/// Name of the player's control socket inside the scratch directory.
pub const SOCKET_NAME: &str = "socket";

/// Summary of a finished run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineReport {
    /// URLs whose stream was handed to the player.
    pub accepted: usize,
    /// URLs that were skipped because they could not be fetched or enqueued.
    pub skipped: usize,
}

/// What became of a source handed to the player.
enum Handoff {
    Queued,
    Rejected,
    PlayerGone,
}

pub struct Pipeline {
    fetch: FetchSupervisor,
    playback: PlaybackSupervisor,
    cancel: CancellationToken,
}

impl Pipeline {
    /// Build a pipeline working inside `scratch`.
    ///
    /// `cancel` stops the run; it is also fired when the player exits.
    pub fn new(
        scratch: &Path,
        fetch: FetchConfig,
        player: PlayerConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            fetch: FetchSupervisor::new(scratch, fetch),
            playback: PlaybackSupervisor::new(player, scratch.join(SOCKET_NAME), cancel.clone()),
            cancel,
        }
    }

    /// Feed every URL from `urls` to the player and return once the run is
    /// over and every child process has stopped.
    pub async fn run(mut self, urls: mpsc::Receiver<String>) -> Result<PipelineReport> {
        let result = self.feed(urls).await;

        if result.is_ok() && self.playback.state() == PlaybackState::Ready {
            info!("No more URLs, waiting for the player to finish");
            tokio::select! {
                _ = self.cancel.cancelled() => {}
                code = self.playback.wait() => debug!(?code, "Player finished"),
            }
        }

        self.shutdown().await;
        result
    }

    async fn feed(&mut self, mut urls: mpsc::Receiver<String>) -> Result<PipelineReport> {
        let mut report = PipelineReport::default();

        loop {
            let url = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                url = urls.recv() => url,
            };
            let Some(url) = url else {
                debug!("URL source exhausted");
                break;
            };

            let path = match self.fetch.add_stream(&self.cancel, &url).await {
                Ok(path) => path,
                Err(FetchError::Cancelled) => break,
                Err(e) => {
                    warn!(url = %url, error = %e, "Skipping URL");
                    report.skipped += 1;
                    continue;
                }
            };

            match self.play(&url, path).await? {
                Handoff::Queued => report.accepted += 1,
                Handoff::Rejected => report.skipped += 1,
                Handoff::PlayerGone => break,
            }
        }

        Ok(report)
    }

    /// Hand `path` to the player, starting it if needed.
    ///
    /// A player that cannot be started or never becomes ready ends the run.
    async fn play(&mut self, url: &str, path: PathBuf) -> Result<Handoff> {
        let result = match self.playback.state() {
            PlaybackState::NotStarted => self.playback.start(&path).await,
            PlaybackState::Ready => self.playback.append_source(&path).await,
            PlaybackState::Starting | PlaybackState::Terminated => {
                return Ok(Handoff::PlayerGone);
            }
        };

        match result {
            Ok(()) => Ok(Handoff::Queued),
            Err(e) if e.is_fatal() => Err(e.into()),
            Err(_) if self.playback.state() == PlaybackState::Terminated => {
                Ok(Handoff::PlayerGone)
            }
            Err(e) => {
                warn!(url = %url, error = %e, "Failed to enqueue {}", path.display());
                Ok(Handoff::Rejected)
            }
        }
    }

    async fn shutdown(&mut self) {
        info!(active = self.fetch.active(), "Shutting down");
        self.cancel.cancel();
        self.playback.terminate().await;
        self.fetch.wait().await;
        debug!("Pipeline stopped");
    }
}
