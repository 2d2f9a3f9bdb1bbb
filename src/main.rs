// src/main.rs - Process bootstrap for the printer bridge daemon
use clap::Parser;
use std::path::PathBuf;
use tokio::sync::broadcast::error::RecvError;

use fdm_bridge::config;
use fdm_bridge::printer::PrinterController;

#[derive(Parser, Debug)]
#[command(name = "fdm-bridge", about = "Serial bridge exposing an FDM printer's thermal state")]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "printer.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let args = Args::parse();
    tracing::info!("Starting fdm-bridge");
    tracing::info!("Loading configuration from: {}", args.config.display());

    let config = config::load_config(&args.config).map_err(|e| {
        tracing::error!("Failed to load config from '{}': {}", args.config.display(), e);
        Box::new(e) as Box<dyn std::error::Error + Send + Sync + 'static>
    })?;

    tracing::info!(
        "Printer: {} ({} firmware)",
        config.device.name,
        config.device.firmware
    );
    tracing::info!("Serial: {}", config.link.port);

    let mut controller = PrinterController::new(&config)?;

    // Stand-in for the accessory layer: log every pushed state change.
    let mut events = controller.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => tracing::info!("state change: {:?}", event),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("event subscriber lagged, skipped {} updates", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    tokio::signal::ctrl_c().await?;
    tracing::info!("Received shutdown signal");
    controller.shutdown().await;

    Ok(())
}
