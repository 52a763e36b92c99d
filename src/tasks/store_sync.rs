//! Store synchronisation background task

use std::sync::Arc;
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::state::AppState;

const STORE_READ_COMPONENT: &str = "store read";

/// Background task that keeps the engine's snapshot in line with the store.
///
/// Follows the store's change feed when it has one, and polls every
/// `sync_interval` otherwise (or once the feed closes).
pub async fn store_sync_task(state: Arc<AppState>) {
    info!("Starting store sync task");

    refresh_once(&state).await;

    if let Some(mut changes) = state.engine.store().subscribe() {
        info!("Following store change feed");
        while changes.changed().await.is_ok() {
            let resources = changes.borrow_and_update().clone();
            debug!("Store pushed {} machines", resources.len());
            state.engine.apply_snapshot(resources);
            state.publish_views(state.engine.views());
        }
        warn!("Store change feed closed, falling back to polling");
    }

    let mut poll = interval(state.sync_interval);
    loop {
        poll.tick().await;
        refresh_once(&state).await;
    }
}

/// Pull one snapshot, recording or clearing the read error in app state
pub async fn refresh_once(state: &AppState) {
    match state.engine.refresh().await {
        Ok(resources) => {
            debug!("Refreshed {} machines from store", resources.len());
            if let Err(e) = state.clear_errors_for(STORE_READ_COMPONENT) {
                warn!("Failed to clear store errors: {}", e);
            }
            state.publish_views(state.engine.views());
        }
        Err(e) => {
            warn!("Store refresh failed: {}", e);
            if let Err(e) = state.add_error(e.to_string()) {
                warn!("Failed to record store error: {}", e);
            }
        }
    }
}
