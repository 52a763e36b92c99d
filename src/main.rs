//! WashWise - reservation timers for shared laundry machines
//!
//! Entry point for the washwise service.

use std::sync::Arc;
use anyhow::Context;
use tokio::net::TcpListener;
use tracing::info;

use washwise::{
    api::create_router,
    clock::SystemClock,
    config::Config,
    engine::ReservationTimerEngine,
    state::AppState,
    store::InMemoryStore,
    tasks::{countdown_task, refresh_once, store_sync_task},
    utils::shutdown_signal,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();

    // Initialize tracing with appropriate log level
    tracing_subscriber::fmt()
        .with_env_filter(format!("washwise={},tower_http=info", config.log_level()))
        .init();

    info!("Starting washwise v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration: host={}, port={}, tick={}ms, presets={:?}min",
          config.host, config.port, config.tick_ms, config.presets);

    let store = match &config.machines {
        Some(path) => InMemoryStore::from_json_file(path)?,
        None => {
            info!("No machine list given, using built-in laundry room");
            InMemoryStore::with_default_machines()
        }
    };

    let engine = Arc::new(ReservationTimerEngine::new(Arc::new(store), Arc::new(SystemClock)));
    let state = Arc::new(AppState::new(engine, config.app_settings()));

    // Serve a populated machine list from the first request on
    refresh_once(&state).await;

    let sync_state = Arc::clone(&state);
    tokio::spawn(async move {
        store_sync_task(sync_state).await;
    });

    let countdown_state = Arc::clone(&state);
    tokio::spawn(async move {
        countdown_task(countdown_state).await;
    });

    let app = create_router(Arc::clone(&state));

    let addr = config.address();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("Server running on http://{}", addr);
    info!("Endpoints:");
    info!("  GET  /machines              - Machines with countdowns");
    info!("  POST /machines/:id/reserve  - Reserve a machine");
    info!("  POST /machines/:id/release  - Stop a machine early");
    info!("  POST /machines/:id/collect  - Acknowledge finished laundry");
    info!("  GET  /session               - Reservation session");
    info!("  POST /session/{{open,select,start,collect,cancel}}");
    info!("  GET  /status                - Full status");
    info!("  GET  /health                - Health check");

    let server = axum::serve(listener, app);

    tokio::select! {
        result = server => {
            if let Err(e) = result {
                tracing::error!("Server error: {}", e);
            }
        }
        _ = shutdown_signal() => {
            info!("Shutdown signal received");
        }
    }

    state.session.cancel();
    info!("Server shutdown complete");
    Ok(())
}
