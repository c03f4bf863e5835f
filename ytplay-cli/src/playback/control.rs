//! JSON IPC control channel to the player.

use std::path::Path;
use std::time::Duration;

use process_utils::ProcessHandle;
use serde_json::json;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tokio::net::unix::OwnedWriteHalf;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, trace};

use super::PlaybackError;

const CONNECT_INTERVAL: Duration = Duration::from_millis(50);

/// Encode a `loadfile <path> append-play` command as one JSON line.
///
/// The IPC protocol is JSON, so paths that are not valid UTF-8 are rejected
/// rather than rewritten into a path the player cannot open.
pub fn loadfile_command(path: &Path) -> Result<Vec<u8>, PlaybackError> {
    let path_str = path
        .to_str()
        .ok_or_else(|| PlaybackError::NonUtf8Path(path.to_path_buf()))?;
    let command = json!({
        "command": ["loadfile", path_str, "append-play"],
    });
    let mut line = serde_json::to_vec(&command)?;
    line.push(b'\n');
    Ok(line)
}

/// Write side of the player's IPC socket.
///
/// Responses and events from the player are read and discarded in the
/// background for as long as the client lives.
pub struct ControlClient {
    writer: OwnedWriteHalf,
    responses: JoinHandle<()>,
}

impl ControlClient {
    /// Dial `socket`, retrying until it accepts connections.
    ///
    /// Gives up with [`PlaybackError::ControlTimeout`] after `timeout`, or
    /// with [`PlaybackError::PlayerExited`] as soon as `player` exits.
    pub async fn connect(
        socket: &Path,
        timeout: Duration,
        player: &ProcessHandle,
    ) -> Result<Self, PlaybackError> {
        let deadline = Instant::now() + timeout;
        let stream = loop {
            match UnixStream::connect(socket).await {
                Ok(stream) => break stream,
                Err(e) => {
                    trace!(socket = %socket.display(), error = %e, "Control socket not ready");
                }
            }

            if Instant::now() >= deadline {
                return Err(PlaybackError::ControlTimeout {
                    socket: socket.to_path_buf(),
                    timeout,
                });
            }
            tokio::select! {
                _ = player.wait() => return Err(PlaybackError::PlayerExited),
                _ = tokio::time::sleep(CONNECT_INTERVAL) => {}
            }
        };
        debug!("Connected to {}", socket.display());

        let (reader, writer) = stream.into_split();
        let responses = tokio::spawn(async move {
            let mut lines = BufReader::new(reader).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => trace!("player: {}", line),
                    Ok(None) => break,
                    Err(e) => {
                        debug!(error = %e, "Control socket read failed");
                        break;
                    }
                }
            }
        });

        Ok(Self { writer, responses })
    }

    /// Append `path` to the player's playlist.
    pub async fn append_file(&mut self, path: &Path) -> Result<(), PlaybackError> {
        let line = loadfile_command(path)?;
        self.writer.write_all(&line).await?;
        self.writer.flush().await?;
        debug!("Appended {} to playlist", path.display());
        Ok(())
    }
}

impl Drop for ControlClient {
    fn drop(&mut self) {
        self.responses.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loadfile_command_line() {
        let line = loadfile_command(Path::new("/tmp/ytplayX/fifo2")).unwrap();
        assert_eq!(
            line,
            b"{\"command\":[\"loadfile\",\"/tmp/ytplayX/fifo2\",\"append-play\"]}\n"
        );
    }

    #[test]
    fn test_loadfile_command_escapes_path() {
        let line = loadfile_command(Path::new("/tmp/a \"b\"/fifo1")).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&line).unwrap();
        assert_eq!(value["command"][1], "/tmp/a \"b\"/fifo1");
        assert_eq!(line.last(), Some(&b'\n'));
    }

    #[test]
    fn test_loadfile_command_rejects_non_utf8_path() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let path = Path::new(OsStr::from_bytes(b"/tmp/ytplay\xff/fifo2"));
        let err = loadfile_command(path).unwrap_err();
        assert!(matches!(err, PlaybackError::NonUtf8Path(p) if p == path));
    }
}
