//! Shared machine records as held by the resource store

use std::{cmp::Ordering, fmt};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque machine identifier, stable for the machine's lifetime
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(String);

impl ResourceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ResourceId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ResourceId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Machine category, informational only
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MachineKind {
    Washer,
    Dryer,
}

impl fmt::Display for MachineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Washer => write!(f, "Washer"),
            Self::Dryer => write!(f, "Dryer"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceState {
    #[default]
    Available,
    Reserved,
}

/// A shared laundry machine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub id: ResourceId,
    pub kind: MachineKind,
    /// Number printed on the machine
    #[serde(default)]
    pub number: u32,
    pub location: String,
    /// State flag as last written to the store. May lag behind
    /// `reservation_end`; use [`Resource::effective_state`] for decisions.
    #[serde(default)]
    pub state: ResourceState,
    #[serde(default)]
    pub reservation_end: Option<DateTime<Utc>>,
}

impl Resource {
    /// Create an available machine
    pub fn new(
        id: impl Into<ResourceId>,
        kind: MachineKind,
        number: u32,
        location: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            kind,
            number,
            location: location.into(),
            state: ResourceState::Available,
            reservation_end: None,
        }
    }

    /// Same machine, reserved until `end`
    pub fn reserved_until(mut self, end: DateTime<Utc>) -> Self {
        self.state = ResourceState::Reserved;
        self.reservation_end = Some(end);
        self
    }

    /// Reserved iff an end timestamp is present and still in the future.
    /// An expired record counts as available even if the store never
    /// cleared it.
    pub fn effective_state(&self, now: DateTime<Utc>) -> ResourceState {
        match self.reservation_end {
            Some(end) if end > now => ResourceState::Reserved,
            _ => ResourceState::Available,
        }
    }

    pub fn is_available(&self, now: DateTime<Utc>) -> bool {
        self.effective_state(now) == ResourceState::Available
    }

    /// "Washer #3" style label
    pub fn label(&self) -> String {
        format!("{} #{}", self.kind, self.number)
    }
}

/// Orders available machines before reserved ones. Used with a stable sort,
/// machines in the same state keep their incoming order.
pub fn by_availability(a: &Resource, b: &Resource, now: DateTime<Utc>) -> Ordering {
    availability_rank(a.effective_state(now)).cmp(&availability_rank(b.effective_state(now)))
}

pub(crate) fn availability_rank(state: ResourceState) -> u8 {
    match state {
        ResourceState::Available => 0,
        ResourceState::Reserved => 1,
    }
}
