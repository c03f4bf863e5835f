//! Application configuration.
//!
//! Values come from three layers, later ones winning: built-in defaults, an
//! optional TOML file, and command-line flags / environment variables.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cli::Args;
use crate::error::{AppError, Result};
use crate::fetch::FetchConfig;
use crate::playback::PlayerConfig;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Downloader executable.
    pub downloader: String,
    /// Player executable.
    pub player: String,
    /// In-memory buffer per stream, in MiB.
    pub buffer_size_mib: usize,
    /// Seconds the player caches ahead.
    pub cache_secs: u64,
    /// How long to wait for the player's control socket.
    pub ipc_timeout_secs: u64,
    /// Grace period between SIGTERM and SIGKILL for child processes.
    pub stop_grace_secs: u64,
    /// Play audio only.
    pub audio_only: bool,
    /// Extra player arguments.
    pub player_args: Vec<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            downloader: "youtube-dl".to_string(),
            player: "mpv".to_string(),
            buffer_size_mib: 10,
            cache_secs: 600,
            ipc_timeout_secs: 10,
            stop_grace_secs: 5,
            audio_only: false,
            player_args: Vec::new(),
        }
    }
}

impl AppConfig {
    /// Default configuration file location.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("ytplay").join("config.toml"))
    }

    /// Load the configuration file.
    ///
    /// An explicitly given file must exist. The default file is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, explicit) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => match Self::default_path() {
                Some(path) => (path, false),
                None => return Ok(Self::default()),
            },
        };

        if !explicit && !path.exists() {
            debug!("No config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path).map_err(|e| {
            AppError::config(format!("failed to read {}: {}", path.display(), e))
        })?;
        let config = Self::from_toml_str(&content)
            .map_err(|e| AppError::config(format!("{}: {}", path.display(), e)))?;
        debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| AppError::config(e.to_string()))
    }

    /// Apply command-line overrides.
    pub fn apply_args(&mut self, args: &Args) {
        if let Some(ref downloader) = args.downloader {
            self.downloader = downloader.clone();
        }
        if let Some(ref player) = args.player {
            self.player = player.clone();
        }
        if let Some(size) = args.buffer_size {
            self.buffer_size_mib = size;
        }
        if let Some(secs) = args.cache_secs {
            self.cache_secs = secs;
        }
        if let Some(secs) = args.ipc_timeout {
            self.ipc_timeout_secs = secs;
        }
        if args.audio_only {
            self.audio_only = true;
        }
        self.player_args.extend(args.player_args.iter().cloned());
    }

    pub fn validate(&self) -> Result<()> {
        if self.downloader.trim().is_empty() {
            return Err(AppError::config("downloader must not be empty"));
        }
        if self.player.trim().is_empty() {
            return Err(AppError::config("player must not be empty"));
        }
        if self.buffer_size_mib == 0 {
            return Err(AppError::config("buffer_size_mib must be at least 1"));
        }
        if self.ipc_timeout_secs == 0 {
            return Err(AppError::config("ipc_timeout_secs must be at least 1"));
        }
        Ok(())
    }

    pub fn fetch_config(&self) -> FetchConfig {
        FetchConfig {
            program: self.downloader.clone(),
            buffer_size: self.buffer_size_mib << 20,
            stop_grace: Duration::from_secs(self.stop_grace_secs),
        }
    }

    pub fn player_config(&self) -> PlayerConfig {
        PlayerConfig {
            program: self.player.clone(),
            cache_secs: self.cache_secs,
            audio_only: self.audio_only,
            extra_args: self.player_args.clone(),
            ipc_timeout: Duration::from_secs(self.ipc_timeout_secs),
            stop_grace: Duration::from_secs(self.stop_grace_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.fetch_config().buffer_size, 10 * 1024 * 1024);
        assert_eq!(config.player_config().cache_secs, 600);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = AppConfig::from_toml_str(
            r#"
            downloader = "yt-dlp"
            buffer_size_mib = 4
            player_args = ["--volume=40"]
            "#,
        )
        .unwrap();

        assert_eq!(config.downloader, "yt-dlp");
        assert_eq!(config.buffer_size_mib, 4);
        assert_eq!(config.player, "mpv");
        assert_eq!(config.player_args, vec!["--volume=40"]);
    }

    #[test]
    fn test_invalid_toml_is_a_config_error() {
        let err = AppConfig::from_toml_str("buffer_size_mib = \"lots\"").unwrap_err();
        assert!(matches!(err, AppError::Configuration(_)));
    }

    #[test]
    fn test_explicit_missing_file_fails() {
        let temp = TempDir::new().unwrap();
        let err = AppConfig::load(Some(&temp.path().join("nope.toml"))).unwrap_err();
        assert!(matches!(err, AppError::Configuration(_)));
    }

    #[test]
    fn test_load_from_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(&path, "player = \"/usr/local/bin/mpv\"\naudio_only = true\n").unwrap();

        let config = AppConfig::load(Some(&path)).unwrap();
        assert_eq!(config.player, "/usr/local/bin/mpv");
        assert!(config.audio_only);
    }

    #[test]
    fn test_args_override_file_values() {
        let mut config =
            AppConfig::from_toml_str("downloader = \"yt-dlp\"\ncache_secs = 60").unwrap();
        let args = Args {
            downloader: Some("youtube-dl".to_string()),
            ipc_timeout: Some(3),
            player_args: vec!["--mute=yes".to_string()],
            ..Args::default()
        };
        config.apply_args(&args);

        assert_eq!(config.downloader, "youtube-dl");
        assert_eq!(config.cache_secs, 60);
        assert_eq!(config.player_config().ipc_timeout, Duration::from_secs(3));
        assert_eq!(config.player_args, vec!["--mute=yes"]);
    }

    #[test]
    fn test_validate_rejects_zero_buffer() {
        let config = AppConfig {
            buffer_size_mib: 0,
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
