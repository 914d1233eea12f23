//! pushnotif command-line entry point.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use pushnotif::commands::{self, VERSION};
use pushnotif::Config;

// CLI
#[derive(Parser)]
#[command(name = "pushnotif")]
#[command(version = VERSION)]
#[command(about = "Web Push channel/event delivery tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the collaborator's VAPID public key
    VapidKey,
    /// Ask the collaborator to push an event to channels
    Trigger {
        /// Target channel (repeatable; none means every subscription)
        #[arg(long = "channel")]
        channels: Vec<String>,
        /// Event name
        #[arg(long)]
        event: String,
        /// Event data as a JSON object
        #[arg(long)]
        data: Option<String>,
    },
    /// Decode a raw push body and print the envelope tabs would receive
    Decode {
        /// Read the body from this file instead of stdin
        #[arg(long)]
        file: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .init();

    let cli = Cli::parse();
    let config = Config::load()?;
    log::debug!("Using collaborator at {}", config.api_base);

    match cli.command {
        Commands::VapidKey => commands::collaborator::vapid_key(&config).await?,
        Commands::Trigger {
            channels,
            event,
            data,
        } => commands::collaborator::trigger(&config, channels, &event, data.as_deref()).await?,
        Commands::Decode { file } => commands::decode::run(file.as_deref(), &config)?,
    }

    Ok(())
}
