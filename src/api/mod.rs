//! HTTP API module
//!
//! This module contains all HTTP endpoint handlers and response structures.

pub mod handlers;
pub mod responses;

use std::sync::Arc;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::state::AppState;
use handlers::*;

/// Create the HTTP router with all endpoints
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/machines", get(machines_handler))
        .route("/machines/:resource_id/reserve", post(reserve_handler))
        .route("/machines/:resource_id/release", post(release_handler))
        .route("/machines/:resource_id/collect", post(collect_machine_handler))
        .route("/session", get(session_handler))
        .route("/session/open", post(session_open_handler))
        .route("/session/select", post(session_select_handler))
        .route("/session/start", post(session_start_handler))
        .route("/session/collect", post(session_collect_handler))
        .route("/session/cancel", post(session_cancel_handler))
        .route("/status", get(status_handler))
        .route("/health", get(health_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
