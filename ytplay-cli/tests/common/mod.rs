#![allow(dead_code)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use ytplay::fetch::FetchConfig;
use ytplay::playback::PlayerConfig;

pub const WAIT: Duration = Duration::from_secs(10);

/// Write an executable `/bin/sh` script named `name` into `dir`.
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// A player that records its arguments into `<dir>/player-args`, then runs
/// `tail` (a shell snippet).
pub fn fake_player(dir: &Path, tail: &str) -> PathBuf {
    let args = dir.join("player-args");
    write_script(
        dir,
        "player",
        &format!("printf '%s\\n' \"$@\" > '{}'\n{}", args.display(), tail),
    )
}

pub fn fetch_config(program: &Path) -> FetchConfig {
    FetchConfig {
        program: program.to_string_lossy().into_owned(),
        buffer_size: 4096,
        stop_grace: Duration::from_secs(2),
    }
}

pub fn player_config(program: &Path) -> PlayerConfig {
    PlayerConfig {
        program: program.to_string_lossy().into_owned(),
        ipc_timeout: WAIT,
        stop_grace: Duration::from_secs(2),
        ..PlayerConfig::default()
    }
}

/// Read a FIFO to EOF on the blocking pool.
pub async fn read_fifo(path: &Path) -> Vec<u8> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || std::fs::read(path))
        .await
        .unwrap()
        .unwrap()
}

/// Arguments the fake player was started with, once it has written them.
pub async fn player_args(dir: &Path) -> Vec<String> {
    let path = dir.join("player-args");
    tokio::time::timeout(WAIT, async {
        loop {
            if let Ok(content) = std::fs::read_to_string(&path)
                && content.ends_with('\n')
            {
                return content.lines().map(str::to_string).collect();
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("player should record its arguments")
}
