use clap::Parser;
use error::AppError;
use tracing::{Level, error};
use tracing_subscriber::FmtSubscriber;

mod cli;
mod commands;
mod error;

use cli::{CliArgs, Command};

fn main() {
    if let Err(e) = bootstrap() {
        eprintln!("Error: {e}");
        error!(error = ?e, "Application failed");
        std::process::exit(1);
    }
}

fn bootstrap() -> Result<(), AppError> {
    // Parse command-line arguments
    let args = CliArgs::parse();

    // Setup logging, stdout is reserved for playlists
    let log_level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .with_ansi(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| AppError::Initialization(e.to_string()))?;

    match args.command {
        Command::Curate(args) => commands::curate(args),
        Command::Augment(args) => commands::augment(args),
        Command::FrameRate(args) => commands::frame_rate(args),
    }
}
