//! vigil-broker — PUB/SUB rendezvous for the event bus.
//!
//! Upstream detectors and the engine publish to the frontend; the
//! engine and downstream consumers subscribe on the backend.

use clap::Parser;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;

use vigil_bus::broker::{Broker, BrokerConfig};
use vigil_bus::Transport;

/// Vigil event-bus broker.
#[derive(Parser, Debug)]
#[command(name = "vigil-broker", version, about)]
struct Cli {
    /// Frontend endpoint (publishers connect here).
    #[arg(long, env = "BROKER_FRONTEND", default_value = "tcp://0.0.0.0:5555")]
    frontend: String,

    /// Backend endpoint (subscribers connect here).
    #[arg(long, env = "BROKER_BACKEND", default_value = "tcp://0.0.0.0:5556")]
    backend: String,

    /// Log filter.
    #[arg(long, env = "VIGIL_LOG", default_value = "info")]
    log: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&cli.log)?)
        .init();

    let config = BrokerConfig {
        frontend: Transport::parse(&cli.frontend)?,
        backend: Transport::parse(&cli.backend)?,
    };
    let broker = Broker::new(config);

    let (shutdown_tx, shutdown) = watch::channel(false);
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    broker.run(shutdown).await?;
    Ok(())
}
