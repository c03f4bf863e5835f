//! Thin wrappers over the FIFO primitives.

use std::ffi::CString;
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;
use std::time::Duration;

use tokio::net::unix::pipe;

/// How often a writer open is retried while the FIFO has no reader.
pub(crate) const OPEN_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Create a FIFO node at `path`. Fails if anything already exists there.
pub(crate) fn make_fifo(path: &Path) -> io::Result<()> {
    let c_path = CString::new(path.as_os_str().as_bytes())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "path contains a NUL byte"))?;

    // SAFETY: `c_path` is a valid NUL-terminated string that outlives the call.
    let rc = unsafe { libc::mkfifo(c_path.as_ptr(), 0o666) };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

/// Open the write end of the FIFO at `path` once a reader has attached.
///
/// A non-blocking open fails with `ENXIO` while there is no reader, so this
/// retries every [`OPEN_POLL_INTERVAL`] without tying up a thread. Cancel safe.
pub(crate) async fn open_writer(path: &Path) -> io::Result<pipe::Sender> {
    loop {
        match pipe::OpenOptions::new().open_sender(path) {
            Err(e) if e.raw_os_error() == Some(libc::ENXIO) => {
                tokio::time::sleep(OPEN_POLL_INTERVAL).await;
            }
            opened => return opened,
        }
    }
}
