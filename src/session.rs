//! Client-local reservation session
//!
//! Drives one user through `Idle -> Selecting -> Running -> Finished -> Idle`.
//! The session owns its countdown ticker: it is started when the session is
//! opened and stopped on every way out (finish, collect, cancel, drop).

use std::{
    sync::{Arc, Mutex, MutexGuard, Weak},
    time::Duration,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::{
    sync::watch,
    task::JoinHandle,
    time::{interval, MissedTickBehavior},
};
use tracing::{debug, info, warn};

use crate::{
    engine::{remaining_until, ReservationTimerEngine},
    error::{ReservationError, SessionError},
    state::{format_countdown, Phase, Reservation, ReservationView, ResourceId},
};

/// Machine and duration picked in the selection step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub resource_id: ResourceId,
    pub duration_seconds: i64,
}

/// What the session looks like right now
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub phase: Phase,
    pub selection: Option<Selection>,
    pub reservation: Option<Reservation>,
    pub remaining_seconds: u64,
    pub countdown: String,
    /// Every machine, with the selected one tagged `selecting`
    pub machines: Vec<ReservationView>,
}

/// Aborts the ticker task when dropped
#[derive(Debug)]
struct TickerHandle(JoinHandle<()>);

impl Drop for TickerHandle {
    fn drop(&mut self) {
        self.0.abort();
    }
}

#[derive(Debug, Default)]
struct SessionInner {
    phase: Phase,
    selection: Option<Selection>,
    reservation: Option<Reservation>,
    /// Bumped on every teardown so late ticks and late writes can tell
    /// they belong to a session that no longer exists
    generation: u64,
    starting: bool,
    ticker: Option<TickerHandle>,
}

impl SessionInner {
    fn snapshot(&self, now: DateTime<Utc>, mut machines: Vec<ReservationView>) -> SessionSnapshot {
        let remaining_seconds = match (&self.reservation, self.phase) {
            (Some(reservation), Phase::Running) => {
                remaining_until(Some(reservation.reservation_end), now)
            }
            _ => 0,
        };

        if self.phase == Phase::Selecting {
            if let Some(selection) = &self.selection {
                for view in &mut machines {
                    if view.resource_id == selection.resource_id && view.phase == Phase::Idle {
                        view.phase = Phase::Selecting;
                    }
                }
            }
        }

        SessionSnapshot {
            phase: self.phase,
            selection: self.selection.clone(),
            reservation: self.reservation.clone(),
            remaining_seconds,
            countdown: format_countdown(remaining_seconds),
            machines,
        }
    }

    fn teardown(&mut self) {
        self.generation += 1;
        self.phase = Phase::Idle;
        self.selection = None;
        self.reservation = None;
        self.starting = false;
        self.ticker = None;
    }

    fn expect_phase(&self, expected: Phase, action: &'static str) -> Result<(), SessionError> {
        if self.phase == expected {
            Ok(())
        } else {
            Err(SessionError::InvalidTransition {
                from: self.phase,
                action,
            })
        }
    }
}

pub struct ReservationSession {
    engine: Arc<ReservationTimerEngine>,
    tick_period: Duration,
    inner: Arc<Mutex<SessionInner>>,
    updates_tx: watch::Sender<SessionSnapshot>,
}

impl ReservationSession {
    pub fn new(engine: Arc<ReservationTimerEngine>, tick_period: Duration) -> Self {
        let (updates_tx, _) = watch::channel(SessionSnapshot::default());
        Self {
            engine,
            tick_period,
            inner: Arc::new(Mutex::new(SessionInner::default())),
            updates_tx,
        }
    }

    /// Snapshot published on every tick and transition
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.updates_tx.subscribe()
    }

    pub fn phase(&self) -> Phase {
        self.lock().phase
    }

    /// Whether the countdown ticker is currently running
    pub fn is_ticking(&self) -> bool {
        self.lock()
            .ticker
            .as_ref()
            .is_some_and(|handle| !handle.0.is_finished())
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let machines = self.engine.views();
        let now = self.engine.now();
        self.lock().snapshot(now, machines)
    }

    /// Idle -> Selecting. Starts the session ticker.
    pub fn open(&self) -> Result<SessionSnapshot, SessionError> {
        {
            let mut inner = self.lock();
            inner.expect_phase(Phase::Idle, "open")?;
            inner.generation += 1;
            inner.phase = Phase::Selecting;
            let generation = inner.generation;
            inner.ticker = Some(self.spawn_ticker(generation));
        }
        info!("Reservation session opened");
        Ok(self.publish())
    }

    /// Record the machine and duration to reserve
    pub fn select(
        &self,
        resource_id: ResourceId,
        duration_seconds: i64,
    ) -> Result<SessionSnapshot, SessionError> {
        if duration_seconds <= 0 {
            return Err(ReservationError::InvalidDuration(duration_seconds).into());
        }
        if self.engine.resource(&resource_id).is_none() {
            return Err(ReservationError::ResourceNotFound(resource_id).into());
        }

        {
            let mut inner = self.lock();
            inner.expect_phase(Phase::Selecting, "select")?;
            debug!("Selected {} for {}s", resource_id, duration_seconds);
            inner.selection = Some(Selection {
                resource_id,
                duration_seconds,
            });
        }
        Ok(self.publish())
    }

    /// Selecting -> Running once the reservation is confirmed by the store.
    /// On failure the session stays in Selecting so the user can retry or
    /// pick another machine.
    pub async fn start(&self) -> Result<Reservation, SessionError> {
        let (selection, generation) = {
            let mut inner = self.lock();
            inner.expect_phase(Phase::Selecting, "start")?;
            if inner.starting {
                return Err(SessionError::InvalidTransition {
                    from: inner.phase,
                    action: "start",
                });
            }
            let selection = inner.selection.clone().ok_or(SessionError::NothingSelected)?;
            inner.starting = true;
            (selection, inner.generation)
        };

        let result = self
            .engine
            .reserve(&selection.resource_id, selection.duration_seconds)
            .await;

        {
            let mut inner = self.lock();
            if inner.generation != generation {
                // Session was torn down while the write was in flight
                return match result {
                    Ok(reservation) => {
                        warn!(
                            "Session closed before reservation of {} completed; it will expire on its own",
                            reservation.resource_id
                        );
                        Err(SessionError::Abandoned(reservation.resource_id))
                    }
                    Err(e) => Err(e.into()),
                };
            }

            inner.starting = false;
            let reservation = result?;
            inner.phase = Phase::Running;
            inner.selection = None;
            inner.reservation = Some(reservation.clone());
            info!("Session running on {}", reservation.resource_id);
            drop(inner);

            self.publish();
            Ok(reservation)
        }
    }

    /// Finished -> Idle. The user has picked up their laundry.
    pub fn collect(&self) -> Result<SessionSnapshot, SessionError> {
        {
            let mut inner = self.lock();
            inner.expect_phase(Phase::Finished, "collect")?;
            if let Some(reservation) = &inner.reservation {
                self.engine.acknowledge(&reservation.resource_id);
            }
            inner.teardown();
        }
        info!("Laundry collected, session idle");
        Ok(self.publish())
    }

    /// Any phase -> Idle. A running reservation is left in place and still
    /// expires on schedule.
    pub fn cancel(&self) -> SessionSnapshot {
        {
            let mut inner = self.lock();
            if inner.phase != Phase::Idle {
                info!("Reservation session cancelled from {}", inner.phase);
            }
            inner.teardown();
        }
        self.publish()
    }

    fn publish(&self) -> SessionSnapshot {
        let snapshot = self.snapshot();
        self.updates_tx.send_replace(snapshot.clone());
        snapshot
    }

    fn spawn_ticker(&self, generation: u64) -> TickerHandle {
        let engine = Arc::clone(&self.engine);
        let inner = Arc::downgrade(&self.inner);
        let updates_tx = self.updates_tx.clone();
        let period = self.tick_period;

        TickerHandle(tokio::spawn(async move {
            run_ticker(engine, inner, generation, period, updates_tx).await;
        }))
    }

    fn lock(&self) -> MutexGuard<'_, SessionInner> {
        lock_inner(&self.inner)
    }
}

impl Drop for ReservationSession {
    fn drop(&mut self) {
        self.lock().ticker = None;
    }
}

impl std::fmt::Debug for ReservationSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReservationSession")
            .field("phase", &self.phase())
            .field("tick_period", &self.tick_period)
            .finish()
    }
}

fn lock_inner(inner: &Mutex<SessionInner>) -> MutexGuard<'_, SessionInner> {
    inner.lock().unwrap_or_else(|e| e.into_inner())
}

async fn run_ticker(
    engine: Arc<ReservationTimerEngine>,
    inner: Weak<Mutex<SessionInner>>,
    generation: u64,
    period: Duration,
    updates_tx: watch::Sender<SessionSnapshot>,
) {
    debug!("Session ticker started (generation {})", generation);
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        let (machines, _) = engine.tick().await;
        let now = engine.now();

        let Some(inner) = inner.upgrade() else {
            break;
        };

        let (snapshot, finished) = {
            let mut state = lock_inner(&inner);
            if state.generation != generation {
                break;
            }

            if state.phase == Phase::Running {
                if let Some(reservation) = &state.reservation {
                    let expired = remaining_until(Some(reservation.reservation_end), now) == 0;
                    // Stopped early, by this user or another client
                    let stopped = engine.remaining(&reservation.resource_id).unwrap_or(0) == 0;
                    if expired || stopped {
                        info!("Laundry on {} finished", reservation.resource_id);
                        state.phase = Phase::Finished;
                    }
                }
            }

            let finished = state.phase == Phase::Finished;
            if finished {
                // Completion is an exit path: the ticker stops itself
                state.ticker = None;
            }
            (state.snapshot(now, machines), finished)
        };

        updates_tx.send_replace(snapshot);

        if finished {
            break;
        }
    }
    debug!("Session ticker stopped (generation {})", generation);
}
