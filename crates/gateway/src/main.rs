use anyhow::Context;
use shmgate::config::GatewayConfig;
use shmgate::hub::OrderEventsHub;
use shmgate::pubsub::{LocalBus, PubSubClient};
use shmgate::shm_manager::{ShmManager, TracingResponseSink};
use shmgate::shutdown::ShutdownSignal;
use shmgate::symbol_manager::SymbolManager;
use shmgate::ws::{router, AppState};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = GatewayConfig::from_env();
    info!(?config, "starting gateway");

    // The engine creates the queue files at boot; a missing or corrupt file
    // refuses the whole gateway before any listener binds.
    let shm = ShmManager::open_all(&config.queue_paths())
        .context("opening shared-memory queues")?;

    let symbols = SymbolManager::new();
    // Deployments implement MarketBus against their broker; the in-process
    // bus keeps the wiring whole until one is plugged in.
    let bus = LocalBus::new();
    let pubsub = PubSubClient::new(bus);
    symbols.set_uplink(pubsub.clone());
    pubsub.set_broadcaster(symbols.clone());

    let (hub, hub_task) = OrderEventsHub::start();

    let shutdown = ShutdownSignal::new();
    let pollers = shm
        .spawn_pollers(
            Arc::clone(&hub),
            Arc::new(TracingResponseSink),
            shutdown.clone(),
        )
        .context("spawning pollers")?;

    let state = AppState {
        symbols: Arc::clone(&symbols),
        hub: Arc::clone(&hub),
        shutdown: shutdown.clone(),
    };
    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("binding {}", config.listen_addr))?;
    info!(addr = %config.listen_addr, "listening");

    let serve_shutdown = shutdown.clone();
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("interrupt received, shutting down");
            serve_shutdown.shutdown();
        })
        .await
        .context("serving websocket endpoints")?;

    // Stop order: pollers drain the queues, then the hub loses its last
    // sender and exits, then the mappings are flushed.
    shutdown.shutdown();
    pollers.join();
    drop(hub);
    let _ = hub_task.await;
    if let Err(e) = shm.flush_all() {
        error!(error = %e, "flushing queues at shutdown");
    }
    info!("gateway stopped");
    Ok(())
}
