//! Reservation timer engine
//!
//! Keeps the last known snapshot of every machine, derives countdowns from
//! it, and routes reserve/release requests to the resource store. The store
//! decides who wins a machine; the engine only decides what to show and when
//! a reservation made by this client has run out.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use super::timer::{self, derive_remaining, remaining_until};
use crate::{
    clock::Clock,
    error::{ReleaseFailure, ReservationError, Result},
    state::{Phase, Reservation, ReservationView, Resource, ResourceId, ResourceState},
    store::{ClearOutcome, ResourceStore, WriteOutcome},
};

/// A reservation placed by this client
#[derive(Debug, Clone)]
struct LocalReservation {
    reservation: Reservation,
    /// Countdown reached zero, waiting for the user to collect
    finished: bool,
    /// A release has been issued (or is in flight) for this reservation
    released: bool,
}

pub struct ReservationTimerEngine {
    store: Arc<dyn ResourceStore>,
    clock: Arc<dyn Clock>,
    snapshot: Mutex<Vec<Resource>>,
    local: Mutex<HashMap<ResourceId, LocalReservation>>,
    /// Auto-releases that failed and are waiting for the next tick
    failed_releases: Mutex<HashMap<ResourceId, ReleaseFailure>>,
}

impl std::fmt::Debug for ReservationTimerEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReservationTimerEngine")
            .field("snapshot", &self.snapshot_lock().len())
            .field("local", &self.local_lock().len())
            .finish()
    }
}

impl ReservationTimerEngine {
    /// Create an engine with an empty snapshot. Call [`Self::refresh`] or
    /// [`Self::apply_snapshot`] before reserving.
    pub fn new(store: Arc<dyn ResourceStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            snapshot: Mutex::new(Vec::new()),
            local: Mutex::new(HashMap::new()),
            failed_releases: Mutex::new(HashMap::new()),
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn store(&self) -> &Arc<dyn ResourceStore> {
        &self.store
    }

    /// Re-read every machine from the store
    pub async fn refresh(&self) -> Result<Vec<Resource>> {
        let resources = self
            .store
            .list_resources()
            .await
            .map_err(ReservationError::StoreReadFailed)?;
        self.apply_snapshot(resources.clone());
        Ok(resources)
    }

    /// Replace the local snapshot with one pushed by the store
    pub fn apply_snapshot(&self, resources: Vec<Resource>) {
        debug!("Applying snapshot of {} machines", resources.len());
        *self.snapshot_lock() = resources;
    }

    pub fn snapshot(&self) -> Vec<Resource> {
        self.snapshot_lock().clone()
    }

    pub fn resource(&self, resource_id: &ResourceId) -> Option<Resource> {
        self.snapshot_lock()
            .iter()
            .find(|r| &r.id == resource_id)
            .cloned()
    }

    /// Remaining seconds for one machine as of now, from the last snapshot
    pub fn remaining(&self, resource_id: &ResourceId) -> Option<u64> {
        let now = self.now();
        self.resource(resource_id)
            .map(|resource| derive_remaining(&resource, now))
    }

    /// Reservation placed by this client on `resource_id`, if still tracked
    pub fn local_reservation(&self, resource_id: &ResourceId) -> Option<Reservation> {
        self.local_lock()
            .get(resource_id)
            .map(|entry| entry.reservation.clone())
    }

    /// Whether periodic ticks have anything to do
    pub fn needs_ticking(&self) -> bool {
        let now = self.now();
        let any_reserved = self
            .snapshot_lock()
            .iter()
            .any(|r| r.effective_state(now) == ResourceState::Reserved);
        any_reserved || self.local_lock().values().any(|entry| !entry.released)
    }

    /// Reserve `resource_id` for `duration_seconds` from now.
    ///
    /// The machine must look available in the last snapshot, and the store
    /// write only succeeds if it is still available when applied. A store
    /// failure is returned as-is; nothing is retried.
    pub async fn reserve(&self, resource_id: &ResourceId, duration_seconds: i64) -> Result<Reservation> {
        if duration_seconds <= 0 {
            return Err(ReservationError::InvalidDuration(duration_seconds));
        }

        let now = self.now();
        let reservation_end = Duration::try_seconds(duration_seconds)
            .and_then(|duration| now.checked_add_signed(duration))
            .ok_or(ReservationError::InvalidDuration(duration_seconds))?;

        let resource = self
            .resource(resource_id)
            .ok_or_else(|| ReservationError::ResourceNotFound(resource_id.clone()))?;
        if derive_remaining(&resource, now) > 0 {
            debug!("{} is reserved in the local snapshot", resource_id);
            return Err(ReservationError::AlreadyReserved(resource_id.clone()));
        }

        let outcome = self
            .store
            .write_reservation(resource_id, reservation_end, now)
            .await
            .map_err(ReservationError::StoreWriteFailed)?;

        match outcome {
            WriteOutcome::Written => {}
            WriteOutcome::Conflict => {
                info!("Lost reservation race for {}", resource_id);
                // Our snapshot was stale; pick up the winner's reservation
                if let Err(e) = self.refresh().await {
                    warn!("Refresh after losing {} failed: {}", resource_id, e);
                }
                return Err(ReservationError::AlreadyReserved(resource_id.clone()));
            }
            WriteOutcome::NotFound => {
                warn!("{} vanished from the store", resource_id);
                self.forget_resource(resource_id);
                return Err(ReservationError::ResourceNotFound(resource_id.clone()));
            }
        }

        self.update_resource(resource_id, |r| {
            r.state = ResourceState::Reserved;
            r.reservation_end = Some(reservation_end);
        });

        let reservation = Reservation {
            resource_id: resource_id.clone(),
            reservation_end,
        };
        self.local_lock().insert(
            resource_id.clone(),
            LocalReservation {
                reservation: reservation.clone(),
                finished: false,
                released: false,
            },
        );

        info!(
            "Reserved {} for {}s (until {})",
            resource_id, duration_seconds, reservation_end
        );
        Ok(reservation)
    }

    /// Make `resource_id` available again. Releasing an available machine
    /// succeeds and changes nothing.
    pub async fn release(&self, resource_id: &ResourceId) -> Result<()> {
        self.clear_in_store(resource_id, None).await?;

        // Stopped by hand, nothing left to collect
        self.local_lock().remove(resource_id);
        self.failures_lock().remove(resource_id);

        info!("Released {}", resource_id);
        Ok(())
    }

    /// Forget a finished local reservation once the user has collected
    pub fn acknowledge(&self, resource_id: &ResourceId) -> bool {
        let mut local = self.local_lock();
        let finished = local.get(resource_id).is_some_and(|entry| entry.finished);
        if finished {
            local.remove(resource_id);
            self.failures_lock().remove(resource_id);
        }
        finished
    }

    /// Recompute every countdown at the current time and release any of this
    /// client's reservations that have just run out.
    ///
    /// Only the reservation this client made is cleared: if the machine has
    /// since been taken by someone else, the store leaves it alone. A failed
    /// auto-release is tried again on the next tick and reported, together
    /// with every other release still outstanding, next to the views.
    pub async fn tick(&self) -> (Vec<ReservationView>, Vec<ReleaseFailure>) {
        let now = self.now();

        for reservation in self.claim_expired(now) {
            let resource_id = &reservation.resource_id;
            info!("Reservation on {} expired, releasing", resource_id);
            match self
                .clear_in_store(resource_id, Some(reservation.reservation_end))
                .await
            {
                Ok(()) => {
                    self.failures_lock().remove(resource_id);
                }
                Err(error) => {
                    warn!("Auto-release of {} failed: {}", resource_id, error);
                    if let Some(entry) = self.local_lock().get_mut(resource_id) {
                        entry.released = false;
                    }
                    self.failures_lock().insert(
                        resource_id.clone(),
                        ReleaseFailure {
                            resource_id: resource_id.clone(),
                            error,
                        },
                    );
                }
            }
        }

        (self.views_at(now), self.failed_releases())
    }

    /// Auto-releases that have failed and not yet gone through, by machine
    pub fn failed_releases(&self) -> Vec<ReleaseFailure> {
        let mut failures: Vec<_> = self.failures_lock().values().cloned().collect();
        failures.sort_by(|a, b| a.resource_id.as_str().cmp(b.resource_id.as_str()));
        failures
    }

    /// Current views without side effects
    pub fn views(&self) -> Vec<ReservationView> {
        self.views_at(self.now())
    }

    /// Views at `now`, with this client's finished reservations marked.
    /// A machine someone else has taken since keeps their countdown.
    pub fn views_at(&self, now: DateTime<Utc>) -> Vec<ReservationView> {
        let mut views = timer::tick(&self.snapshot_lock(), now);

        let local = self.local_lock();
        for view in &mut views {
            if let Some(entry) = local.get(&view.resource_id) {
                if entry.finished && view.remaining_seconds == 0 {
                    view.mark_finished();
                }
            }
        }
        views
    }

    /// Phase of one machine for this client
    pub fn phase_of(&self, resource_id: &ResourceId, now: DateTime<Utc>) -> Phase {
        if let Some(entry) = self.local_lock().get(resource_id) {
            if entry.finished {
                return Phase::Finished;
            }
        }
        match self.resource(resource_id) {
            Some(r) if derive_remaining(&r, now) > 0 => Phase::Running,
            _ => Phase::Idle,
        }
    }

    /// Mark local reservations whose end has passed as finished and claim
    /// them for release
    fn claim_expired(&self, now: DateTime<Utc>) -> Vec<Reservation> {
        let mut due = Vec::new();
        for entry in self.local_lock().values_mut() {
            if remaining_until(Some(entry.reservation.reservation_end), now) > 0 {
                continue;
            }
            entry.finished = true;
            if !entry.released {
                entry.released = true;
                due.push(entry.reservation.clone());
            }
        }
        due
    }

    async fn clear_in_store(
        &self,
        resource_id: &ResourceId,
        expected_end: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let outcome = self
            .store
            .clear_reservation(resource_id, expected_end)
            .await
            .map_err(ReservationError::StoreWriteFailed)?;

        match outcome {
            ClearOutcome::Cleared => {
                self.update_resource(resource_id, |r| {
                    r.state = ResourceState::Available;
                    r.reservation_end = None;
                });
                Ok(())
            }
            ClearOutcome::Superseded => {
                // Someone else holds the machine now; ours is already gone
                info!("{} was re-reserved after our reservation ended", resource_id);
                if let Err(e) = self.refresh().await {
                    warn!("Refresh after {} changed hands failed: {}", resource_id, e);
                }
                Ok(())
            }
            ClearOutcome::NotFound => {
                self.forget_resource(resource_id);
                Err(ReservationError::ResourceNotFound(resource_id.clone()))
            }
        }
    }

    fn update_resource(&self, resource_id: &ResourceId, update: impl FnOnce(&mut Resource)) {
        if let Some(resource) = self.snapshot_lock().iter_mut().find(|r| &r.id == resource_id) {
            update(resource);
        }
    }

    fn forget_resource(&self, resource_id: &ResourceId) {
        self.snapshot_lock().retain(|r| &r.id != resource_id);
        self.local_lock().remove(resource_id);
    }

    fn snapshot_lock(&self) -> MutexGuard<'_, Vec<Resource>> {
        self.snapshot.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn failures_lock(&self) -> MutexGuard<'_, HashMap<ResourceId, ReleaseFailure>> {
        self.failed_releases.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn local_lock(&self) -> MutexGuard<'_, HashMap<ResourceId, LocalReservation>> {
        self.local.lock().unwrap_or_else(|e| e.into_inner())
    }
}
