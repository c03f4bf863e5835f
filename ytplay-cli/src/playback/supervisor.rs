use std::path::{Path, PathBuf};
use std::process::Stdio;

use process_utils::ProcessHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{ControlClient, PlaybackError, PlaybackState, PlayerConfig};

/// Owns the player process and its control channel.
pub struct PlaybackSupervisor {
    config: PlayerConfig,
    socket: PathBuf,
    cancel: CancellationToken,
    state: PlaybackState,
    process: Option<ProcessHandle>,
    control: Option<ControlClient>,
}

impl PlaybackSupervisor {
    /// The player will listen on `socket`; its exit cancels `cancel`.
    pub fn new(
        config: PlayerConfig,
        socket: impl Into<PathBuf>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            socket: socket.into(),
            cancel,
            state: PlaybackState::NotStarted,
            process: None,
            control: None,
        }
    }

    pub fn state(&self) -> PlaybackState {
        match &self.process {
            Some(process) if process.has_exited() => PlaybackState::Terminated,
            _ => self.state,
        }
    }

    /// Start the player on `first` and connect to its control socket.
    ///
    /// On [`PlaybackError::ControlTimeout`] the player is stopped again. On
    /// [`PlaybackError::PlayerExited`] the cancellation token has already
    /// fired.
    pub async fn start(&mut self, first: &Path) -> Result<(), PlaybackError> {
        if self.state != PlaybackState::NotStarted {
            return Err(PlaybackError::NotRunning);
        }
        self.state = PlaybackState::Starting;

        let mut command = process_utils::tokio_command(&self.config.program);
        command
            .args(self.config.args(&self.socket, first))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit());

        let child = command.spawn().map_err(|source| {
            self.state = PlaybackState::Terminated;
            PlaybackError::Spawn {
                program: self.config.program.clone(),
                source,
            }
        })?;
        let process = ProcessHandle::new(self.config.program.clone(), child);
        info!(pid = ?process.pid(), "Started {} with {}", self.config.program, first.display());

        tokio::spawn({
            let process = process.clone();
            let cancel = self.cancel.clone();
            async move {
                match process.wait().await {
                    Some(0) => info!("{} exited", process.name()),
                    Some(code) => warn!("{} exited with code {}", process.name(), code),
                    None => info!("{} was stopped", process.name()),
                }
                if !cancel.is_cancelled() {
                    info!("Canceling due to player exit");
                    cancel.cancel();
                }
            }
        });
        self.process = Some(process.clone());

        match ControlClient::connect(&self.socket, self.config.ipc_timeout, &process).await {
            Ok(control) => {
                self.control = Some(control);
                self.state = PlaybackState::Ready;
                Ok(())
            }
            Err(e) => {
                if matches!(e, PlaybackError::ControlTimeout { .. }) {
                    process.stop(self.config.stop_grace).await;
                }
                self.state = PlaybackState::Terminated;
                Err(e)
            }
        }
    }

    /// Append `path` to the running player's playlist.
    pub async fn append_source(&mut self, path: &Path) -> Result<(), PlaybackError> {
        if self.state() != PlaybackState::Ready {
            return Err(PlaybackError::NotRunning);
        }
        match self.control.as_mut() {
            Some(control) => control.append_file(path).await,
            None => Err(PlaybackError::NotRunning),
        }
    }

    /// Stop the player if it is still running. Safe to call more than once.
    pub async fn terminate(&mut self) {
        self.control = None;
        if let Some(process) = &self.process
            && !process.has_exited()
        {
            debug!("Terminating {}", process.name());
            process.stop(self.config.stop_grace).await;
        }
        if self.state != PlaybackState::NotStarted {
            self.state = PlaybackState::Terminated;
        }
    }

    /// Wait for the player to exit. Returns immediately if it never started.
    pub async fn wait(&self) -> Option<i32> {
        match &self.process {
            Some(process) => process.wait().await,
            None => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{read_lines_eventually, write_script};
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::io::AsyncBufReadExt;
    use tokio::net::UnixListener;

    const WAIT: Duration = Duration::from_secs(10);

    fn config(program: &Path, ipc_timeout: Duration) -> PlayerConfig {
        PlayerConfig {
            program: program.to_string_lossy().into_owned(),
            ipc_timeout,
            stop_grace: Duration::from_secs(2),
            ..PlayerConfig::default()
        }
    }

    /// A player that records its arguments and then idles.
    fn idle_player(dir: &Path) -> PathBuf {
        let args = dir.join("args");
        write_script(
            dir,
            "player",
            &format!("printf '%s\\n' \"$@\" > '{}'\nexec sleep 30", args.display()),
        )
    }

    #[tokio::test]
    async fn test_start_connects_once_socket_appears() {
        let temp = TempDir::new().unwrap();
        let bin = TempDir::new().unwrap();
        let program = idle_player(bin.path());
        let socket = temp.path().join("socket");
        let cancel = CancellationToken::new();

        let mut playback =
            PlaybackSupervisor::new(config(&program, WAIT), &socket, cancel.clone());
        assert_eq!(playback.state(), PlaybackState::NotStarted);

        let bind = {
            let socket = socket.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(300)).await;
                let listener = UnixListener::bind(&socket).unwrap();
                let (stream, _) = listener.accept().await.unwrap();
                (listener, stream)
            })
        };

        playback.start(&temp.path().join("fifo1")).await.unwrap();
        assert_eq!(playback.state(), PlaybackState::Ready);
        let (_listener, stream) = bind.await.unwrap();

        let args = read_lines_eventually(&bin.path().join("args")).await;
        assert!(args.contains(&format!("--input-ipc-server={}", socket.display())));
        assert!(args.last().is_some_and(|a| a.ends_with("fifo1")));

        playback.terminate().await;
        assert_eq!(playback.state(), PlaybackState::Terminated);
        drop(stream);
        tokio::time::timeout(WAIT, cancel.cancelled()).await.unwrap();
    }

    #[tokio::test]
    async fn test_append_writes_loadfile_line() {
        let temp = TempDir::new().unwrap();
        let bin = TempDir::new().unwrap();
        let program = idle_player(bin.path());
        let socket = temp.path().join("socket");
        let listener = UnixListener::bind(&socket).unwrap();

        let mut playback =
            PlaybackSupervisor::new(config(&program, WAIT), &socket, CancellationToken::new());
        playback.start(&temp.path().join("fifo1")).await.unwrap();
        let (stream, _) = listener.accept().await.unwrap();

        let fifo2 = temp.path().join("fifo2");
        playback.append_source(&fifo2).await.unwrap();

        let mut lines = tokio::io::BufReader::new(stream).lines();
        let line = tokio::time::timeout(WAIT, lines.next_line())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(
            line,
            format!(
                "{{\"command\":[\"loadfile\",\"{}\",\"append-play\"]}}",
                fifo2.display()
            )
        );

        playback.terminate().await;
    }

    #[tokio::test]
    async fn test_control_timeout_stops_player() {
        let temp = TempDir::new().unwrap();
        let bin = TempDir::new().unwrap();
        let program = idle_player(bin.path());
        let socket = temp.path().join("socket");
        let cancel = CancellationToken::new();

        let mut playback = PlaybackSupervisor::new(
            config(&program, Duration::from_millis(300)),
            &socket,
            cancel.clone(),
        );
        let err = playback.start(&temp.path().join("fifo1")).await.unwrap_err();
        assert!(matches!(err, PlaybackError::ControlTimeout { .. }));
        assert!(err.is_fatal());
        assert_eq!(playback.state(), PlaybackState::Terminated);

        tokio::time::timeout(WAIT, playback.wait()).await.unwrap();
    }

    #[tokio::test]
    async fn test_player_exit_during_startup_cancels() {
        let temp = TempDir::new().unwrap();
        let bin = TempDir::new().unwrap();
        let program = write_script(bin.path(), "player", "exit 3");
        let cancel = CancellationToken::new();

        let mut playback = PlaybackSupervisor::new(
            config(&program, WAIT),
            temp.path().join("socket"),
            cancel.clone(),
        );
        let err = playback.start(&temp.path().join("fifo1")).await.unwrap_err();
        assert!(matches!(err, PlaybackError::PlayerExited));
        assert!(err.is_fatal());
        assert_eq!(playback.wait().await, Some(3));

        tokio::time::timeout(WAIT, cancel.cancelled()).await.unwrap();
        assert_eq!(playback.state(), PlaybackState::Terminated);
    }

    #[tokio::test]
    async fn test_spawn_failure_is_fatal() {
        let temp = TempDir::new().unwrap();
        let mut playback = PlaybackSupervisor::new(
            config(Path::new("/nonexistent/ytplay-player"), WAIT),
            temp.path().join("socket"),
            CancellationToken::new(),
        );

        let err = playback.start(&temp.path().join("fifo1")).await.unwrap_err();
        assert!(matches!(err, PlaybackError::Spawn { .. }));
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_terminate_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let bin = TempDir::new().unwrap();
        let program = idle_player(bin.path());
        let socket = temp.path().join("socket");
        let listener = UnixListener::bind(&socket).unwrap();

        let mut playback =
            PlaybackSupervisor::new(config(&program, WAIT), &socket, CancellationToken::new());
        playback.terminate().await;
        assert_eq!(playback.state(), PlaybackState::NotStarted);

        playback.start(&temp.path().join("fifo1")).await.unwrap();
        let _accepted = listener.accept().await.unwrap();

        playback.terminate().await;
        playback.terminate().await;
        assert_eq!(playback.state(), PlaybackState::Terminated);
        assert!(matches!(
            playback.append_source(Path::new("fifo2")).await,
            Err(PlaybackError::NotRunning)
        ));
    }
}
