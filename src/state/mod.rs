//! State management module
//!
//! Machine records, countdown views and the shared application state.

pub mod app_state;
pub mod resource;
pub mod view;

// Re-export main types
pub use app_state::{AppSettings, AppState};
pub use resource::{by_availability, MachineKind, Resource, ResourceId, ResourceState};
pub use view::{format_countdown, Phase, Reservation, ReservationView};
