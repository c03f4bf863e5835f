//! Player supervision.
//!
//! A single long-lived player process is started with the first relay path and
//! then fed further paths over its JSON IPC socket.

mod control;
mod supervisor;

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

pub use control::{ControlClient, loadfile_command};
pub use supervisor::PlaybackSupervisor;

#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("control socket {} not reachable within {timeout:?}", socket.display())]
    ControlTimeout { socket: PathBuf, timeout: Duration },

    #[error("player exited before its control socket was reachable")]
    PlayerExited,

    #[error("player is not running")]
    NotRunning,

    #[error("path {} is not valid UTF-8", .0.display())]
    NonUtf8Path(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode player command: {0}")]
    Encode(#[from] serde_json::Error),
}

impl PlaybackError {
    /// Errors that end the whole run rather than a single source.
    ///
    /// Everything that keeps the player from ever becoming ready is fatal.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Spawn { .. } | Self::ControlTimeout { .. } | Self::PlayerExited)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    NotStarted,
    Starting,
    Ready,
    Terminated,
}

/// Player settings.
#[derive(Debug, Clone)]
pub struct PlayerConfig {
    /// Player executable.
    pub program: String,
    /// Seconds of media to cache ahead.
    pub cache_secs: u64,
    /// Disable video output.
    pub audio_only: bool,
    /// Appended after the built-in arguments.
    pub extra_args: Vec<String>,
    /// How long to wait for the control socket to come up.
    pub ipc_timeout: Duration,
    /// Time the player gets to exit after SIGTERM before it is killed.
    pub stop_grace: Duration,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            program: "mpv".to_string(),
            cache_secs: 600,
            audio_only: false,
            extra_args: Vec::new(),
            ipc_timeout: Duration::from_secs(10),
            stop_grace: Duration::from_secs(5),
        }
    }
}

impl PlayerConfig {
    /// Command-line arguments for a player that listens on `socket` and starts
    /// playing `first`.
    pub fn args(&self, socket: &Path, first: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec!["--no-config".into(), "--no-terminal".into()];
        if self.audio_only {
            args.push("--no-video".into());
        } else {
            args.push("--force-window=immediate".into());
        }
        args.push("--cache=yes".into());
        args.push(format!("--cache-secs={}", self.cache_secs).into());
        args.push("--keep-open=yes".into());

        let mut ipc = OsString::from("--input-ipc-server=");
        ipc.push(socket);
        args.push(ipc);

        args.extend(self.extra_args.iter().map(OsString::from));
        args.push(first.into());
        args
    }
}
