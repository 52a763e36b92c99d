//! Background tasks module
//!
//! This module contains background tasks that run alongside the HTTP server.

pub mod countdown;
pub mod store_sync;

// Re-export main functions
pub use countdown::countdown_task;
pub use store_sync::{refresh_once, store_sync_task};
