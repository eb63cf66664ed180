//! vigil-server — HTTP management surface over the store and lifecycle
//! contracts.

mod api;
mod router;
mod state;

use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use vigil_bus::{EventPublisher, MemoryBus, Transport, ZmqPublisher};
use vigil_core::config::{load_dotenv, Config};
use vigil_engine::LifecycleManager;
use vigil_store::Store;

/// Vigil management API server.
#[derive(Parser, Debug)]
#[command(name = "vigil-server", version, about)]
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
    let store = Store::connect(&config.postgres).await?;

    // Lifecycle events from the management surface ride the same bus
    // as the engine's; without a broker they are dropped with a warning.
    let events: Arc<dyn EventPublisher> =
        match Transport::parse(&config.bus.output_endpoint) {
            Ok(output) => match ZmqPublisher::connect(&output).await {
                Ok(publisher) => Arc::new(publisher),
                Err(e) => {
                    warn!(error = %e, "bus unavailable; lifecycle events disabled");
                    Arc::new(MemoryBus::new())
                }
            },
            Err(e) => {
                warn!(error = %e, "bad bus endpoint; lifecycle events disabled");
                Arc::new(MemoryBus::new())
            }
        };

    let lifecycle = Arc::new(LifecycleManager::new(
        store.alerts(),
        events,
        config.lifecycle.clone(),
        config.security.hash_salt.clone(),
    ));

    let state = Arc::new(state::AppState::new(store, lifecycle));
    let app = router::build(state);

    let addr = config.server.bind_addr();
    info!(%addr, "management server listening");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
