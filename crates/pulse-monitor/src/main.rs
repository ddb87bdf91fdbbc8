//! Momentum feed monitor - entry point.

use anyhow::Result;
use clap::Parser;
use tracing::info;

/// Live momentum feed monitor
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via PULSE_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize TLS crypto provider (must be before any WS connections)
    pulse_ws::init_crypto();

    let args = Args::parse();

    pulse_monitor::init_logging()?;

    info!("Starting pulse monitor v{}", env!("CARGO_PKG_VERSION"));

    // Config path resolution: CLI arg > PULSE_CONFIG env var > default file.
    let config = pulse_monitor::AppConfig::load(args.config.as_deref())?;
    info!(
        games = config.games.len(),
        channel_endpoint = %config.channel_endpoint,
        "Configuration loaded"
    );

    let mut app = pulse_monitor::Application::new(config)?;
    app.run().await?;

    Ok(())
}
