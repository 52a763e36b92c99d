//! Shared state behind the HTTP API and background tasks

use std::{
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};
use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::{info, warn};

use super::ReservationView;
use crate::{engine::ReservationTimerEngine, session::ReservationSession};

#[derive(Debug)]
pub struct AppState {
    /// Reservation engine shared by every request and task
    pub engine: Arc<ReservationTimerEngine>,
    /// The local user's reservation session
    pub session: ReservationSession,
    /// Durations offered in the selection step, in minutes
    pub presets_minutes: Vec<u64>,
    pub tick_period: Duration,
    /// Poll interval used when the store cannot push changes
    pub sync_interval: Duration,
    pub started_at: Instant,
    pub port: u16,
    pub host: String,
    /// Most recent user request, shown on `/status`
    pub last_action: Mutex<Option<(String, DateTime<Utc>)>>,
    /// Current store or background task errors for client visibility
    pub errors: Arc<Mutex<Vec<String>>>,
    /// Channel for countdown updates
    pub views_tx: watch::Sender<Vec<ReservationView>>,
    /// Keep the receiver alive to prevent channel closure
    pub _views_rx: watch::Receiver<Vec<ReservationView>>,
}

/// Settings for [`AppState::new`]
#[derive(Debug, Clone)]
pub struct AppSettings {
    pub port: u16,
    pub host: String,
    pub presets_minutes: Vec<u64>,
    pub tick_period: Duration,
    pub sync_interval: Duration,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            port: 20554,
            host: "127.0.0.1".to_string(),
            presets_minutes: vec![30, 45, 60],
            tick_period: Duration::from_secs(1),
            sync_interval: Duration::from_secs(5),
        }
    }
}

impl AppState {
    pub fn new(engine: Arc<ReservationTimerEngine>, settings: AppSettings) -> Self {
        let (views_tx, views_rx) = watch::channel(engine.views());
        let session = ReservationSession::new(Arc::clone(&engine), settings.tick_period);

        Self {
            engine,
            session,
            presets_minutes: settings.presets_minutes,
            tick_period: settings.tick_period,
            sync_interval: settings.sync_interval,
            started_at: Instant::now(),
            port: settings.port,
            host: settings.host,
            last_action: Mutex::new(None),
            errors: Arc::new(Mutex::new(Vec::new())),
            views_tx,
            _views_rx: views_rx,
        }
    }

    /// Remember the last user-initiated action
    pub fn record_action(&self, action: impl Into<String>) {
        if let Ok(mut last) = self.last_action.lock() {
            *last = Some((action.into(), Utc::now()));
        }
    }

    /// Publish freshly computed countdowns to watchers
    pub fn publish_views(&self, views: Vec<ReservationView>) {
        self.views_tx.send_replace(views);
    }

    /// Latest published countdowns
    pub fn latest_views(&self) -> Vec<ReservationView> {
        self.views_tx.borrow().clone()
    }

    /// Record an error for `/status`, ignoring duplicates
    pub fn add_error(&self, error: String) -> Result<(), String> {
        let mut errors = self.errors.lock()
            .map_err(|e| format!("Failed to lock error list: {}", e))?;

        if errors.contains(&error) {
            return Ok(());
        }
        warn!("Recording error: {}", error);
        errors.push(error);
        Ok(())
    }

    /// Drop every error mentioning `component`
    pub fn clear_errors_for(&self, component: &str) -> Result<(), String> {
        let mut errors = self.errors.lock()
            .map_err(|e| format!("Failed to lock error list: {}", e))?;

        let initial_count = errors.len();
        let component = component.to_lowercase();
        errors.retain(|error| !error.to_lowercase().contains(&component));

        if errors.len() != initial_count {
            info!("Cleared {} errors for component: {}", initial_count - errors.len(), component);
        }
        Ok(())
    }

    pub fn get_errors(&self) -> Vec<String> {
        self.errors.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Uptime as `1h 2m 3s`, leading zero units omitted
    pub fn get_uptime(&self) -> String {
        let secs = self.started_at.elapsed().as_secs();
        let (h, m, s) = (secs / 3600, secs / 60 % 60, secs % 60);
        match (h, m) {
            (0, 0) => format!("{}s", s),
            (0, _) => format!("{}m {}s", m, s),
            _ => format!("{}h {}m {}s", h, m, s),
        }
    }

    pub fn get_last_action(&self) -> (Option<String>, Option<DateTime<Utc>>) {
        match self.last_action.lock().ok().and_then(|last| last.clone()) {
            Some((action, at)) => (Some(action), Some(at)),
            None => (None, None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{clock::SystemClock, store::InMemoryStore};

    fn app_state() -> AppState {
        let engine = Arc::new(ReservationTimerEngine::new(
            Arc::new(InMemoryStore::with_default_machines()),
            Arc::new(SystemClock),
        ));
        AppState::new(engine, AppSettings::default())
    }

    #[test]
    fn test_errors_are_deduplicated_and_cleared_by_component() {
        let state = app_state();
        state.add_error("Store sync failed: offline".to_string()).unwrap();
        state.add_error("Store sync failed: offline".to_string()).unwrap();
        state.add_error("Auto-release failed".to_string()).unwrap();
        assert_eq!(state.get_errors().len(), 2);

        state.clear_errors_for("store sync").unwrap();
        assert_eq!(state.get_errors(), vec!["Auto-release failed".to_string()]);
    }

    #[test]
    fn test_record_action() {
        let state = app_state();
        assert_eq!(state.get_last_action().0, None);

        state.record_action("reserve W1");
        let (action, at) = state.get_last_action();
        assert_eq!(action.as_deref(), Some("reserve W1"));
        assert!(at.is_some());
    }
}
