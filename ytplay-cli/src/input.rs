//! URL input: one URL per line.

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Read URLs line by line from `reader` and hand them out through a channel.
///
/// Each accepted line is echoed to `echo`. Blank lines are skipped. The
/// channel closes when the input ends or `cancel` fires.
pub fn spawn_url_reader<R, W>(
    reader: R,
    mut echo: W,
    cancel: CancellationToken,
) -> (mpsc::Receiver<String>, JoinHandle<std::io::Result<()>>)
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(1);

    let task = tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        loop {
            let line = tokio::select! {
                _ = cancel.cancelled() => break,
                line = lines.next_line() => line?,
            };
            let Some(line) = line else {
                debug!("URL input exhausted");
                break;
            };

            let url = line.trim();
            if url.is_empty() {
                continue;
            }

            echo.write_all(url.as_bytes()).await?;
            echo.write_all(b"\n").await?;
            echo.flush().await?;

            tokio::select! {
                _ = cancel.cancelled() => break,
                sent = tx.send(url.to_string()) => {
                    if sent.is_err() {
                        break;
                    }
                }
            }
        }
        Ok(())
    });

    (rx, task)
}
