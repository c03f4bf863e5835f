//! # Stream Relay
//!
//! A [`Relay`] is a named pipe (FIFO) with an in-memory buffer in front of it.
//!
//! Media players such as mpv need a *path* to load and do not prefetch much,
//! so handing them a bare FIFO written by a downloader would only start the
//! download once the player reaches that playlist entry. The relay lets the
//! producer write as fast as the network allows into a bounded buffer, while a
//! background task forwards the bytes into the FIFO whenever a reader attaches.
//!
//! ```text
//!  producer ──write──► [ bounded buffer ] ──copy task──► FIFO path ──► reader
//! ```
//!
//! The FIFO is created eagerly, so the path can be handed out (and opened) at
//! any time after [`Relay::create`] returns.

mod error;
mod fifo;
mod relay;

pub use error::{RelayError, Result};
pub use relay::{DEFAULT_CAPACITY, DrainHandle, Relay};
