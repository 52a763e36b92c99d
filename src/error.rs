//! Error types for reservation and session operations

use thiserror::Error;

use crate::state::{Phase, ResourceId};

/// Transport or availability failure of the backing resource store
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }
}

/// Failure of an engine operation
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ReservationError {
    #[error("invalid reservation duration: {0}s")]
    InvalidDuration(i64),

    #[error("machine not found: {0}")]
    ResourceNotFound(ResourceId),

    /// Another client holds the machine. Expected outcome of a lost race.
    #[error("machine {0} is already reserved")]
    AlreadyReserved(ResourceId),

    #[error("store write failed: {0}")]
    StoreWriteFailed(StoreError),

    #[error("store read failed: {0}")]
    StoreReadFailed(StoreError),
}

impl ReservationError {
    /// Whether the failure came from the store transport rather than from
    /// the request itself
    pub fn is_store_failure(&self) -> bool {
        matches!(self, Self::StoreWriteFailed(_) | Self::StoreReadFailed(_))
    }
}

/// An automatic release that did not reach the store. Retried every tick
/// until it succeeds.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("auto-release of {resource_id} failed: {error}")]
pub struct ReleaseFailure {
    pub resource_id: ResourceId,
    pub error: ReservationError,
}

/// Failure of a reservation session transition
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("cannot {action} while session is {from}")]
    InvalidTransition { from: Phase, action: &'static str },

    #[error("no machine and duration selected")]
    NothingSelected,

    /// The session was cancelled while its reservation write was in flight.
    /// The reservation itself stands and expires normally.
    #[error("session closed before reservation of {0} completed")]
    Abandoned(ResourceId),

    #[error(transparent)]
    Reservation(#[from] ReservationError),
}

pub type Result<T> = std::result::Result<T, ReservationError>;
