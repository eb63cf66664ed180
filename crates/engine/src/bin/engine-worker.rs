//! engine-worker — the alert engine process.
//!
//! Consumes detection events from the input bus, evaluates the rule
//! catalog, materializes alerts and notifications, and runs the
//! periodic sweeps. Shut down with SIGINT; in-flight evaluations get a
//! bounded grace window.

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use vigil_core::config::{load_dotenv, Config};
use vigil_engine::Engine;

/// Vigil alert engine worker.
#[derive(Parser, Debug)]
#[command(name = "engine-worker", version, about)]
struct Cli {
    /// Log filter (overrides RUST_LOG).
    #[arg(long, env = "VIGIL_LOG", default_value = "info")]
    log: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&cli.log)?)
        .init();

    let config = Config::from_env();
    info!(
        input = %config.bus.input_endpoint,
        output = %config.bus.output_endpoint,
        workers = config.rules.pool_size(),
        "starting engine"
    );

    let engine = Engine::build(config).await?;
    engine.run().await;
    Ok(())
}
