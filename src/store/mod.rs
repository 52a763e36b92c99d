//! Resource store abstraction
//!
//! The machine records live in an external document store. The engine only
//! talks to it through [`ResourceStore`], which is the single arbiter of who
//! holds a machine.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::watch;

use crate::{
    error::StoreError,
    state::{Resource, ResourceId},
};

pub use memory::InMemoryStore;

/// Answer to a conditional reservation write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Written,
    /// The machine was no longer available when the write was applied
    Conflict,
    NotFound,
}

/// Answer to a reservation clear
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearOutcome {
    Cleared,
    /// The stored reservation is not the one the caller expected to clear
    Superseded,
    NotFound,
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Snapshot of every machine record
    async fn list_resources(&self) -> StoreResult<Vec<Resource>>;

    /// Push-based change feed. `None` means the store cannot push and
    /// callers fall back to polling [`ResourceStore::list_resources`].
    /// Dropping the receiver unsubscribes.
    fn subscribe(&self) -> Option<watch::Receiver<Vec<Resource>>> {
        None
    }

    /// Mark `resource_id` reserved until `reservation_end`, but only if the
    /// stored record is still available as of `available_as_of`.
    async fn write_reservation(
        &self,
        resource_id: &ResourceId,
        reservation_end: DateTime<Utc>,
        available_as_of: DateTime<Utc>,
    ) -> StoreResult<WriteOutcome>;

    /// Clear the reservation on `resource_id`. With `expected_end` set, only
    /// a record still ending at that instant is cleared; anything else is
    /// left alone and reported as [`ClearOutcome::Superseded`].
    async fn clear_reservation(
        &self,
        resource_id: &ResourceId,
        expected_end: Option<DateTime<Utc>>,
    ) -> StoreResult<ClearOutcome>;
}
