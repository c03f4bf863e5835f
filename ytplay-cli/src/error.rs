use thiserror::Error;

use crate::fetch::FetchError;
use crate::playback::PlaybackError;

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Errors that abort the whole run.
///
/// Per-URL failures never get here; they are logged and the URL is skipped.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Failed to create scratch directory: {0}")]
    ScratchDir(#[source] std::io::Error),

    #[error("Playback error: {0}")]
    Playback(#[from] PlaybackError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),
}

impl AppError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }
}
