//! WashWise - reservation timers for shared laundry machines
//!
//! Derives each machine's remaining time from the end timestamp stored in the
//! resource store, arbitrates reservations through conditional store writes,
//! and drives the local user's reservation session. An HTTP API exposes all
//! of it to the presentation layer.

pub mod api;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod session;
pub mod state;
pub mod store;
pub mod tasks;
pub mod utils;

// Re-export commonly used types
pub use api::create_router;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use engine::{derive_remaining, ReservationTimerEngine};
pub use error::{ReservationError, SessionError, StoreError};
pub use session::ReservationSession;
pub use state::AppState;
pub use store::{InMemoryStore, ResourceStore};
pub use utils::signals::shutdown_signal;
