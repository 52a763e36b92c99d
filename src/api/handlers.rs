//! HTTP endpoint handlers

use std::sync::Arc;
use axum::{
    extract::{Path, State},
    response::Json,
};
use tracing::{info, warn};

use crate::{
    error::ReservationError,
    session::SessionSnapshot,
    state::{AppState, ResourceId},
};
use super::responses::{
    ApiError, ApiResponse, HealthResponse, MachinesResponse, ReserveRequest, SelectRequest,
    StatusResponse,
};

type ApiResult<T> = Result<Json<T>, ApiError>;

/// Handle GET /machines - List machines, available first
pub async fn machines_handler(State(state): State<Arc<AppState>>) -> Json<MachinesResponse> {
    Json(MachinesResponse::new(state.engine.views()))
}

/// Handle POST /machines/:id/reserve - Reserve a machine directly
pub async fn reserve_handler(
    State(state): State<Arc<AppState>>,
    Path(resource_id): Path<String>,
    Json(request): Json<ReserveRequest>,
) -> ApiResult<ApiResponse> {
    let resource_id = ResourceId::new(resource_id);
    state.record_action(format!("reserve {}", resource_id));

    match state.engine.reserve(&resource_id, request.duration_seconds).await {
        Ok(reservation) => {
            note_store_health(&state, None);
            state.publish_views(state.engine.views());
            Ok(Json(
                ApiResponse::ok(format!("Machine {} reserved", resource_id))
                    .with_reservation(reservation),
            ))
        }
        Err(e) => {
            warn!("Reserve of {} failed: {}", resource_id, e);
            note_store_health(&state, Some(&e));
            Err(e.into())
        }
    }
}

/// Handle POST /machines/:id/release - Stop a machine early
pub async fn release_handler(
    State(state): State<Arc<AppState>>,
    Path(resource_id): Path<String>,
) -> ApiResult<ApiResponse> {
    let resource_id = ResourceId::new(resource_id);
    state.record_action(format!("release {}", resource_id));

    match state.engine.release(&resource_id).await {
        Ok(()) => {
            state.publish_views(state.engine.views());
            Ok(Json(ApiResponse::ok(format!("Machine {} released", resource_id))))
        }
        Err(e) => {
            warn!("Release of {} failed: {}", resource_id, e);
            Err(e.into())
        }
    }
}

/// Handle POST /machines/:id/collect - Acknowledge a finished machine
pub async fn collect_machine_handler(
    State(state): State<Arc<AppState>>,
    Path(resource_id): Path<String>,
) -> ApiResult<ApiResponse> {
    let resource_id = ResourceId::new(resource_id);

    if !state.engine.acknowledge(&resource_id) {
        return Err(ApiError::NotCollectable(resource_id.to_string()));
    }

    state.record_action(format!("collect {}", resource_id));
    state.publish_views(state.engine.views());
    info!("Collected laundry from {}", resource_id);
    Ok(Json(ApiResponse::ok(format!("Laundry on {} collected", resource_id))))
}

/// Surface store write failures on `/status` until the next good write
fn note_store_health(state: &AppState, error: Option<&ReservationError>) {
    let result = match error {
        Some(e) if e.is_store_failure() => state.add_error(e.to_string()),
        Some(_) => Ok(()),
        None => state.clear_errors_for("store write"),
    };
    if let Err(e) = result {
        warn!("Failed to update error list: {}", e);
    }
}

/// Handle GET /session - Current reservation session
pub async fn session_handler(State(state): State<Arc<AppState>>) -> Json<SessionSnapshot> {
    Json(state.session.snapshot())
}

/// Handle POST /session/open - Start choosing a machine
pub async fn session_open_handler(State(state): State<Arc<AppState>>) -> ApiResult<ApiResponse> {
    let snapshot = state.session.open()?;
    state.record_action("session-open");
    Ok(Json(ApiResponse::ok("Session opened").with_session(snapshot)))
}

/// Handle POST /session/select - Pick a machine and duration
pub async fn session_select_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SelectRequest>,
) -> ApiResult<ApiResponse> {
    let snapshot = state
        .session
        .select(ResourceId::new(request.resource_id), request.duration_seconds)?;
    Ok(Json(ApiResponse::ok("Selection updated").with_session(snapshot)))
}

/// Handle POST /session/start - Reserve the selected machine
pub async fn session_start_handler(State(state): State<Arc<AppState>>) -> ApiResult<ApiResponse> {
    state.record_action("session-start");

    match state.session.start().await {
        Ok(reservation) => {
            state.publish_views(state.engine.views());
            Ok(Json(
                ApiResponse::ok(format!("Laundry started on {}", reservation.resource_id))
                    .with_reservation(reservation)
                    .with_session(state.session.snapshot()),
            ))
        }
        Err(e) => {
            warn!("Session start failed: {}", e);
            Err(e.into())
        }
    }
}

/// Handle POST /session/collect - Finish the session after pickup
pub async fn session_collect_handler(State(state): State<Arc<AppState>>) -> ApiResult<ApiResponse> {
    let snapshot = state.session.collect()?;
    state.record_action("session-collect");
    state.publish_views(state.engine.views());
    Ok(Json(ApiResponse::ok("Laundry collected").with_session(snapshot)))
}

/// Handle POST /session/cancel - Leave the session from any phase
pub async fn session_cancel_handler(State(state): State<Arc<AppState>>) -> Json<ApiResponse> {
    let snapshot = state.session.cancel();
    state.record_action("session-cancel");
    Json(ApiResponse::ok("Session cancelled").with_session(snapshot))
}

/// Handle GET /status - Return current service status
pub async fn status_handler(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    let (last_action, last_action_time) = state.get_last_action();

    Json(StatusResponse {
        machines: state.engine.views(),
        session: state.session.snapshot(),
        presets_minutes: state.presets_minutes.clone(),
        errors: state.get_errors(),
        uptime: state.get_uptime(),
        port: state.port,
        host: state.host.clone(),
        last_action,
        last_action_time,
    })
}

/// Handle GET /health - Health check endpoint
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::ok())
}
