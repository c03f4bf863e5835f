//! Helpers for tests that drive real child processes.

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

/// Write an executable `/bin/sh` script named `name` into `dir`.
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// Read a FIFO to EOF on the blocking pool.
pub async fn read_fifo(path: &Path) -> Vec<u8> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || std::fs::read(path))
        .await
        .unwrap()
        .unwrap()
}

/// Poll `path` until a script has finished writing newline-terminated lines
/// to it.
pub async fn read_lines_eventually(path: &Path) -> Vec<String> {
    let wait = async {
        loop {
            if let Ok(content) = std::fs::read_to_string(path)
                && content.ends_with('\n')
            {
                return content.lines().map(str::to_string).collect();
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
    };
    tokio::time::timeout(std::time::Duration::from_secs(10), wait)
        .await
        .unwrap()
}
