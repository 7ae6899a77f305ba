use clap::Parser;
use std::path::PathBuf;

use service_poller::config::{load_config, PollerConfig};
use service_poller::lifecycle::signals::wait_for_shutdown_signal;
use service_poller::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "service-poller", version, about = "Polls registered services and tracks their health")]
struct Args {
    /// Path to a TOML config file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => PollerConfig::default(),
    };

    logging::init(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "service-poller starting");

    tracing::info!(
        interval_ms = config.poller.interval_ms,
        probe_timeout_ms = config.probe.timeout_ms,
        failure_threshold = config.breaker.failure_threshold,
        open_cooldown_ms = config.breaker.open_cooldown_ms,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            metrics::init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    let running = service_poller::start(config).await?;
    if let Some(addr) = running.api_addr {
        tracing::info!(address = %addr, "Management API listening");
    }

    wait_for_shutdown_signal().await;
    running.stop().await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
