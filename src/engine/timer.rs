//! Countdown derivation
//!
//! Remaining time is recomputed from the absolute end timestamp on every
//! tick. Nothing here keeps a running counter, so missed ticks (a suspended
//! process, a slow store call) never cause drift.

use chrono::{DateTime, Utc};

use crate::state::{by_availability, Phase, Resource, ReservationView};

/// Whole seconds until `resource` becomes available, rounded up.
/// Zero when there is no reservation or it has already ended.
pub fn derive_remaining(resource: &Resource, now: DateTime<Utc>) -> u64 {
    remaining_until(resource.reservation_end, now)
}

/// Whole seconds from `now` until `end`, rounded up, zero once `end` is reached
pub fn remaining_until(end: Option<DateTime<Utc>>, now: DateTime<Utc>) -> u64 {
    let Some(end) = end else {
        return 0;
    };
    if now >= end {
        return 0;
    }

    let millis = (end - now).num_milliseconds();
    if millis <= 0 {
        // Sub-millisecond remainder
        return 1;
    }
    (millis as u64).div_ceil(1000)
}

/// Project every machine into a view, available machines first.
///
/// Phases are `Running` while time remains and `Idle` otherwise. Callers
/// that track their own reservations overlay `Finished` and `Selecting`.
pub fn tick(resources: &[Resource], now: DateTime<Utc>) -> Vec<ReservationView> {
    let mut ordered: Vec<&Resource> = resources.iter().collect();
    ordered.sort_by(|a, b| by_availability(a, b, now));

    ordered
        .into_iter()
        .map(|resource| {
            let remaining = derive_remaining(resource, now);
            let phase = if remaining > 0 { Phase::Running } else { Phase::Idle };
            ReservationView::new(resource, remaining, phase)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::MachineKind;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).unwrap()
    }

    fn washer(id: &str) -> Resource {
        Resource::new(id, MachineKind::Washer, 1, "Block A")
    }

    #[test]
    fn test_no_reservation_is_zero() {
        let machine = washer("W1");
        for offset in [-86_400, 0, 1, 86_400] {
            assert_eq!(derive_remaining(&machine, t0() + Duration::seconds(offset)), 0);
        }
    }

    #[test]
    fn test_zero_at_and_after_end() {
        let machine = washer("W1").reserved_until(t0() + Duration::seconds(30));
        assert_eq!(derive_remaining(&machine, t0() + Duration::seconds(30)), 0);
        assert_eq!(derive_remaining(&machine, t0() + Duration::seconds(31)), 0);
        assert_eq!(derive_remaining(&machine, t0() + Duration::days(3)), 0);
    }

    #[test]
    fn test_rounds_partial_seconds_up() {
        let machine = washer("W1").reserved_until(t0() + Duration::seconds(10));
        assert_eq!(derive_remaining(&machine, t0()), 10);
        assert_eq!(derive_remaining(&machine, t0() + Duration::milliseconds(1)), 10);
        assert_eq!(derive_remaining(&machine, t0() + Duration::milliseconds(9_001)), 1);
        assert_eq!(derive_remaining(&machine, t0() + Duration::milliseconds(9_999)), 1);
    }

    #[test]
    fn test_strictly_decreasing_until_end() {
        let machine = washer("W1").reserved_until(t0() + Duration::seconds(120));
        let mut previous = u64::MAX;
        for second in 0..120 {
            let remaining = derive_remaining(&machine, t0() + Duration::seconds(second));
            assert!(remaining < previous, "not decreasing at {second}s");
            assert!(remaining > 0);
            previous = remaining;
        }
    }

    #[test]
    fn test_tick_orders_and_tags_phases() {
        let machines = vec![
            washer("W1").reserved_until(t0() + Duration::seconds(90)),
            washer("W2"),
            // Stale record: store still says reserved, but the end has passed
            washer("W3").reserved_until(t0() - Duration::seconds(5)),
        ];

        let views = tick(&machines, t0());
        let summary: Vec<_> = views
            .iter()
            .map(|v| (v.resource_id.as_str(), v.remaining_seconds, v.phase))
            .collect();

        assert_eq!(
            summary,
            vec![
                ("W2", 0, Phase::Idle),
                ("W3", 0, Phase::Idle),
                ("W1", 90, Phase::Running),
            ]
        );
        assert_eq!(views[2].countdown, "01:30");
    }
}
