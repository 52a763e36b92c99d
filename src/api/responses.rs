//! API response structures

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    error::{ReservationError, SessionError},
    session::SessionSnapshot,
    state::{Reservation, ReservationView},
};

/// Body of `POST /machines/:id/reserve`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReserveRequest {
    pub duration_seconds: i64,
}

/// Body of `POST /session/select`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectRequest {
    pub resource_id: String,
    pub duration_seconds: i64,
}

/// Machine list with countdowns
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MachinesResponse {
    pub timestamp: DateTime<Utc>,
    pub machines: Vec<ReservationView>,
}

impl MachinesResponse {
    pub fn new(machines: Vec<ReservationView>) -> Self {
        Self {
            timestamp: Utc::now(),
            machines,
        }
    }
}

/// API response structure for state change endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse {
    pub status: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reservation: Option<Reservation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<SessionSnapshot>,
}

impl ApiResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            status: "ok".to_string(),
            message: message.into(),
            timestamp: Utc::now(),
            reservation: None,
            session: None,
        }
    }

    pub fn with_reservation(mut self, reservation: Reservation) -> Self {
        self.reservation = Some(reservation);
        self
    }

    pub fn with_session(mut self, session: SessionSnapshot) -> Self {
        self.session = Some(session);
        self
    }
}

/// Full service status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub machines: Vec<ReservationView>,
    pub session: SessionSnapshot,
    pub presets_minutes: Vec<u64>,
    pub errors: Vec<String>,
    pub uptime: String,
    pub port: u16,
    pub host: String,
    pub last_action: Option<String>,
    pub last_action_time: Option<DateTime<Utc>>,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub version: String,
}

impl HealthResponse {
    pub fn ok() -> Self {
        Self {
            status: "ok".to_string(),
            timestamp: Utc::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Error body returned with every non-2xx response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub status: String,
    /// Stable machine-readable error kind
    pub code: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Handler error, mapped onto an HTTP status and an [`ErrorResponse`]
#[derive(Debug)]
pub enum ApiError {
    Reservation(ReservationError),
    Session(SessionError),
    NotCollectable(String),
}

impl From<ReservationError> for ApiError {
    fn from(e: ReservationError) -> Self {
        Self::Reservation(e)
    }
}

impl From<SessionError> for ApiError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::Reservation(inner) => Self::Reservation(inner),
            other => Self::Session(other),
        }
    }
}

impl ApiError {
    fn parts(&self) -> (StatusCode, &'static str, String) {
        match self {
            Self::Reservation(e) => {
                let (status, code) = match e {
                    ReservationError::InvalidDuration(_) => (StatusCode::BAD_REQUEST, "invalid_duration"),
                    ReservationError::ResourceNotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
                    ReservationError::AlreadyReserved(_) => (StatusCode::CONFLICT, "already_reserved"),
                    ReservationError::StoreWriteFailed(_) => {
                        (StatusCode::SERVICE_UNAVAILABLE, "store_write_failed")
                    }
                    ReservationError::StoreReadFailed(_) => {
                        (StatusCode::SERVICE_UNAVAILABLE, "store_read_failed")
                    }
                };
                let message = match e {
                    ReservationError::AlreadyReserved(id) => {
                        format!("Someone else just took machine {}", id)
                    }
                    other => other.to_string(),
                };
                (status, code, message)
            }
            Self::Session(e) => {
                let code = match e {
                    SessionError::InvalidTransition { .. } => "invalid_transition",
                    SessionError::NothingSelected => "nothing_selected",
                    SessionError::Abandoned(_) => "session_abandoned",
                    SessionError::Reservation(_) => "reservation_failed",
                };
                (StatusCode::CONFLICT, code, e.to_string())
            }
            Self::NotCollectable(id) => (
                StatusCode::CONFLICT,
                "not_finished",
                format!("No finished laundry to collect on machine {}", id),
            ),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = self.parts();
        let body = ErrorResponse {
            status: "error".to_string(),
            code: code.to_string(),
            message,
            timestamp: Utc::now(),
        };
        (status, Json(body)).into_response()
    }
}
