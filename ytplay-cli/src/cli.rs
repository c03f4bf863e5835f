use std::path::PathBuf;

use clap::Parser;

/// Read video URLs from stdin and play them in order through mpv, buffering
/// each one in the background with youtube-dl.
#[derive(Parser, Debug, Clone, Default)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Downloader executable (youtube-dl compatible)
    #[arg(long, env = "YTPLAY_DOWNLOADER", value_name = "PROGRAM")]
    pub downloader: Option<String>,

    /// Player executable (mpv compatible)
    #[arg(long, env = "YTPLAY_PLAYER", value_name = "PROGRAM")]
    pub player: Option<String>,

    /// In-memory buffer per stream, in MiB
    #[arg(long, value_name = "MIB")]
    pub buffer_size: Option<usize>,

    /// Seconds of media the player should cache ahead
    #[arg(long, value_name = "SECS")]
    pub cache_secs: Option<u64>,

    /// How long to wait for the player's control socket, in seconds
    #[arg(long, value_name = "SECS")]
    pub ipc_timeout: Option<u64>,

    /// Play audio only (no video window)
    #[arg(long)]
    pub audio_only: bool,

    /// Extra argument passed to the player (repeatable)
    #[arg(long = "player-arg", value_name = "ARG", allow_hyphen_values = true)]
    pub player_args: Vec<String>,

    /// Configuration file (defaults to <config dir>/ytplay/config.toml)
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only log errors
    #[arg(short, long)]
    pub quiet: bool,
}
