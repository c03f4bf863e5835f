//! Owned handle around a spawned child process.
//!
//! The [`Child`] itself is moved into a reaper task which is the only place
//! that waits on it or signals it. Handles talk to the reaper through a
//! channel and observe the exit through a `watch`, so a signal can never be
//! delivered to a pid that has already been reaped.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use tokio::process::Child;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Signal {
    Terminate,
    Kill,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Running,
    /// Exit code, `None` when the process was ended by a signal.
    Exited(Option<i32>),
}

/// Cloneable handle to a running child process.
#[derive(Debug, Clone)]
pub struct ProcessHandle {
    name: Arc<str>,
    pid: Option<u32>,
    signals: mpsc::UnboundedSender<Signal>,
    state: watch::Receiver<State>,
}

impl ProcessHandle {
    /// Take ownership of `child` and start reaping it in the background.
    ///
    /// Any stdio handles the caller needs must be taken out of `child` first.
    pub fn new(name: impl Into<String>, child: Child) -> Self {
        let name: Arc<str> = Arc::from(name.into());
        let pid = child.id();
        let (signals, signal_rx) = mpsc::unbounded_channel();
        let (state_tx, state) = watch::channel(State::Running);

        tokio::spawn(reap(name.clone(), child, signal_rx, state_tx));

        Self {
            name,
            pid,
            signals,
            state,
        }
    }

    /// Name used in log messages.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Process id at spawn time.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn has_exited(&self) -> bool {
        matches!(*self.state.borrow(), State::Exited(_))
    }

    /// Ask the process to terminate (SIGTERM on Unix).
    ///
    /// Does nothing if the process already exited, so it is safe to call any
    /// number of times.
    pub fn terminate(&self) {
        if !self.has_exited() {
            debug!(pid = ?self.pid, "Sending terminate to {}", self.name);
            let _ = self.signals.send(Signal::Terminate);
        }
    }

    /// Forcefully kill the process.
    pub fn kill(&self) {
        if !self.has_exited() {
            debug!(pid = ?self.pid, "Killing {}", self.name);
            let _ = self.signals.send(Signal::Kill);
        }
    }

    /// Wait for the process to exit.
    ///
    /// Returns the exit code, `None` if the process was ended by a signal, or
    /// `Some(-1)` if its status could not be collected.
    pub async fn wait(&self) -> Option<i32> {
        let mut state = self.state.clone();
        let exited = state
            .wait_for(|s| matches!(s, State::Exited(_)))
            .await
            .map(|s| *s);

        match exited {
            Ok(State::Exited(code)) => code,
            _ => Some(-1),
        }
    }

    /// Terminate the process and wait for it, killing it if it is still
    /// alive after `grace`.
    pub async fn stop(&self, grace: Duration) -> Option<i32> {
        self.terminate();
        match tokio::time::timeout(grace, self.wait()).await {
            Ok(code) => code,
            Err(_) => {
                warn!("{} did not exit within {:?}; killing process", self.name, grace);
                self.kill();
                self.wait().await
            }
        }
    }
}

async fn reap(
    name: Arc<str>,
    mut child: Child,
    mut signals: mpsc::UnboundedReceiver<Signal>,
    state: watch::Sender<State>,
) {
    let status = loop {
        tokio::select! {
            status = child.wait() => break status,
            Some(signal) = signals.recv() => {
                if let Err(e) = deliver(&mut child, signal) {
                    warn!("Failed to signal {}: {}", name, e);
                }
            }
        }
    };

    let code = match status {
        Ok(exit_status) => {
            let code = exit_status.code();
            if let Some(c) = code
                && c != 0
            {
                debug!("{} exited with code: {}", name, c);
            }
            code
        }
        Err(e) => {
            error!("Error waiting for {}: {}", name, e);
            Some(-1)
        }
    };

    let _ = state.send(State::Exited(code));
}

fn deliver(child: &mut Child, signal: Signal) -> io::Result<()> {
    match signal {
        Signal::Terminate => send_terminate(child),
        Signal::Kill => child.start_kill(),
    }
}

#[cfg(unix)]
fn send_terminate(child: &mut Child) -> io::Result<()> {
    let Some(pid) = child.id() else {
        return Ok(());
    };
    // SAFETY: `pid` belongs to our own child, which has not been reaped yet
    // because only this task waits on it.
    let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

#[cfg(not(unix))]
fn send_terminate(child: &mut Child) -> io::Result<()> {
    child.start_kill()
}
