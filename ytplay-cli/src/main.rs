use std::process;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{Level, error, info, warn};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use ytplay::cli::Args;
use ytplay::config::AppConfig;
use ytplay::error::{AppError, Result};
use ytplay::input::spawn_url_reader;
use ytplay::pipeline::Pipeline;
use ytplay::signals::wait_for_shutdown_signal;

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);

    let code = match run(args).await {
        Ok(()) => 0,
        Err(e) => {
            error!("Application error: {}", e);
            eprintln!("Error: {}", e);
            1
        }
    };

    // The stdin reader may still be parked in a blocking read.
    process::exit(code);
}

async fn run(args: Args) -> Result<()> {
    let mut config = AppConfig::load(args.config.as_deref())?;
    config.apply_args(&args);
    config.validate()?;

    let cancel = CancellationToken::new();
    let signals = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            match wait_for_shutdown_signal().await {
                Ok(()) => {
                    info!("Canceling due to signal");
                    cancel.cancel();
                }
                Err(e) => warn!("Failed to install signal handlers: {}", e),
            }
        }
    });

    let scratch = tempfile::Builder::new()
        .prefix("ytplay")
        .tempdir()
        .map_err(AppError::ScratchDir)?;
    info!("Using scratch directory {}", scratch.path().display());

    let (urls, reader) = spawn_url_reader(tokio::io::stdin(), tokio::io::stdout(), cancel.clone());

    let pipeline = Pipeline::new(
        scratch.path(),
        config.fetch_config(),
        config.player_config(),
        cancel.clone(),
    );
    let result = pipeline.run(urls).await;

    reader.abort();
    signals.abort();

    let path = scratch.path().to_path_buf();
    if let Err(e) = scratch.close() {
        warn!("Failed to remove scratch directory {}: {}", path.display(), e);
    }

    let report = result?;
    info!(
        "Done: {} played, {} skipped",
        report.accepted, report.skipped
    );
    Ok(())
}

fn init_logging(verbose: bool, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };

    // stdout carries the URL echo.
    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(verbose),
        )
        .init();
}
