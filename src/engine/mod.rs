//! Reservation timer engine module
//!
//! Countdown derivation and the engine that owns reserve/release.

pub mod reservation;
pub mod timer;

pub use reservation::ReservationTimerEngine;
pub use timer::{derive_remaining, remaining_until, tick};
