//! Library target for the `ytplay` package.
//!
//! The primary deliverable of this package is the `ytplay` CLI binary
//! (`src/main.rs`). The pipeline pieces live here so they can be exercised by
//! the integration tests under `tests/`.
//!
//! ```text
//! stdin URLs ──► Pipeline ──► FetchSupervisor ──► youtube-dl ──► Relay (FIFO)
//!                   │                                              │
//!                   └──────► PlaybackSupervisor ──► mpv ◄── opens ─┘
//! ```

pub mod cli;
pub mod config;
pub mod error;
pub mod fetch;
pub mod input;
pub mod pipeline;
pub mod playback;
pub mod signals;

#[cfg(test)]
pub(crate) mod test_utils;

pub use error::{AppError, Result};
