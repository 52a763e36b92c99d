//! Countdown background task

use std::sync::Arc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::{error::ReleaseFailure, state::AppState};

const AUTO_RELEASE_COMPONENT: &str = "auto-release";

/// Background task that re-derives every countdown once per tick period and
/// auto-releases this client's expired reservations
pub async fn countdown_task(state: Arc<AppState>) {
    info!("Starting countdown task ({}ms period)", state.tick_period.as_millis());

    let mut ticker = interval(state.tick_period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut was_idle = false;
    let mut reported: Vec<ReleaseFailure> = Vec::new();

    loop {
        ticker.tick().await;

        if !state.engine.needs_ticking() {
            if !was_idle {
                debug!("No reservations outstanding, countdown idle");
                // One last publish so watchers see the final zeroes
                state.publish_views(state.engine.views());
                was_idle = true;
            }
            // The session ticker may have finished a retry on its own
            report_release_failures(&state, &mut reported, state.engine.failed_releases());
            continue;
        }

        was_idle = false;
        let (views, failures) = state.engine.tick().await;
        state.publish_views(views);
        report_release_failures(&state, &mut reported, failures);
    }
}

/// Mirror outstanding auto-release failures into the app state error list,
/// touching it only when the set changes
fn report_release_failures(
    state: &AppState,
    reported: &mut Vec<ReleaseFailure>,
    failures: Vec<ReleaseFailure>,
) {
    if *reported == failures {
        return;
    }

    if let Err(e) = state.clear_errors_for(AUTO_RELEASE_COMPONENT) {
        warn!("Failed to clear auto-release errors: {}", e);
    }
    for failure in &failures {
        if let Err(e) = state.add_error(failure.to_string()) {
            warn!("Failed to record auto-release error: {}", e);
        }
    }
    *reported = failures;
}
