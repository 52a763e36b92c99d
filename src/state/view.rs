//! Client-side projections of machine countdowns

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{MachineKind, Resource, ResourceId};

/// Reservation session phase, also used to tag each machine's view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    #[default]
    Idle,
    Selecting,
    Running,
    Finished,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Selecting => "selecting",
            Self::Running => "running",
            Self::Finished => "finished",
        };
        f.write_str(name)
    }
}

/// A confirmed claim on a machine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub resource_id: ResourceId,
    pub reservation_end: DateTime<Utc>,
}

/// Ephemeral view of one machine's countdown. Never persisted; it can be
/// rebuilt from the machine's end timestamp at any time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationView {
    pub resource_id: ResourceId,
    pub kind: MachineKind,
    pub number: u32,
    pub location: String,
    pub remaining_seconds: u64,
    pub phase: Phase,
    /// `MM:SS` rendering of `remaining_seconds`
    pub countdown: String,
}

impl ReservationView {
    pub fn new(resource: &Resource, remaining_seconds: u64, phase: Phase) -> Self {
        Self {
            resource_id: resource.id.clone(),
            kind: resource.kind,
            number: resource.number,
            location: resource.location.clone(),
            remaining_seconds,
            phase,
            countdown: format_countdown(remaining_seconds),
        }
    }

    /// Show the machine as done for the user who reserved it
    pub fn mark_finished(&mut self) {
        self.remaining_seconds = 0;
        self.phase = Phase::Finished;
        self.countdown = format_countdown(0);
    }

    pub fn is_available(&self) -> bool {
        self.remaining_seconds == 0
    }
}

/// Format seconds as zero-padded `MM:SS`. Minutes are not wrapped into hours.
pub fn format_countdown(seconds: u64) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}
