//! Process helpers shared across the workspace.
//!
//! - [`tokio_command`] builds a `tokio::process::Command` that does not pop up a
//!   console window on Windows.
//! - [`ProcessHandle`] owns a spawned child and exposes `terminate()`/`wait()`
//!   so several tasks can observe and stop the same process.

#[cfg(feature = "tokio")]
mod handle;

#[cfg(feature = "tokio")]
pub use handle::ProcessHandle;

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Apply the Windows `CREATE_NO_WINDOW` flag to child processes.
///
/// On non-Windows targets this is a no-op.
pub trait NoWindowExt {
    fn no_window(&mut self);
}

#[cfg(feature = "tokio")]
impl NoWindowExt for tokio::process::Command {
    fn no_window(&mut self) {
        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            self.as_std_mut().creation_flags(CREATE_NO_WINDOW);
        }
    }
}

/// Create a `tokio::process::Command` with `CREATE_NO_WINDOW` applied on Windows.
///
/// Children are not killed when their `Child` is dropped; lifecycle is driven
/// explicitly through [`ProcessHandle`].
#[cfg(feature = "tokio")]
pub fn tokio_command(program: impl AsRef<std::ffi::OsStr>) -> tokio::process::Command {
    let mut cmd = tokio::process::Command::new(program);
    cmd.no_window();
    cmd.kill_on_drop(false);
    cmd
}
