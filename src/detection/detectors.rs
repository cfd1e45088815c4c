// Copyright (c) 2026 roomwatch
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/roomwatch/roomwatch-rs

//! Occupancy pattern detectors.
//!
//! Each detector is a pure function over `(event, state, config)`. No I/O
//! happens here; persistence, dedup against stored alerts, and notification
//! are the engine's job. All four detectors run on every event,
//! independently, with no priority ordering.

use chrono::{Datelike, Timelike};
use serde_json::json;

use super::{AlertIntent, AlertKind, DetectorResult, DeviceTimelineState};
use crate::config::PatternConfig;
use crate::events::PresenceEvent;

/// Occupancy above the configured limit, debounced by a per-device cooldown
/// window rather than a single-ACTIVE-alert constraint. Multiple ACTIVE
/// MAX_OCCUPANCY alerts can coexist if the room stays over-limit across
/// cooldown boundaries.
pub fn detect_max_occupancy(
    event: &PresenceEvent,
    state: &DeviceTimelineState,
    config: &PatternConfig,
) -> DetectorResult {
    if event.occupancy <= config.max_occupancy {
        return DetectorResult::NoAction;
    }

    if let Some(last) = state.last_max_occupancy_alert_at {
        let since_ms = event
            .timestamp
            .signed_duration_since(last)
            .num_milliseconds();
        if since_ms <= config.max_occupancy_cooldown_ms {
            return DetectorResult::NoAction;
        }
    }

    let exceeded_by = event.occupancy - config.max_occupancy;
    DetectorResult::Raise(AlertIntent {
        kind: AlertKind::MaxOccupancy,
        title: "Maximum occupancy exceeded".to_string(),
        description: format!(
            "Room {} reached {} people, exceeding the limit of {}",
            event.device_id, event.occupancy, config.max_occupancy
        ),
        extra: json!({
            "limit": config.max_occupancy,
            "exceeded_by": exceeded_by,
        }),
        weekday: None,
    })
}

/// Room empty past the idle timeout. Any non-zero occupancy clears active
/// idle alerts and resets the window.
pub fn detect_idle_room(
    event: &PresenceEvent,
    state: &DeviceTimelineState,
    config: &PatternConfig,
) -> DetectorResult {
    if event.occupancy > 0 {
        return DetectorResult::ClearActive(AlertKind::IdleRoom);
    }

    let idle_ms = event
        .timestamp
        .signed_duration_since(state.last_idle_reset_at)
        .num_milliseconds();
    if idle_ms <= config.idle_timeout_ms {
        return DetectorResult::NoAction;
    }

    let idle_minutes = idle_ms / 60_000;
    DetectorResult::Raise(AlertIntent {
        kind: AlertKind::IdleRoom,
        title: "Idle room detected".to_string(),
        description: format!(
            "Room {} has been empty for {} minutes",
            event.device_id, idle_minutes
        ),
        extra: json!({
            "idle_minutes": idle_minutes,
            "last_activity": state.last_idle_reset_at.to_rfc3339(),
        }),
        weekday: None,
    })
}

/// Exactly one person alone past the anomaly timeout. Any other count
/// clears active alerts and resets the window.
pub fn detect_anomalous_presence(
    event: &PresenceEvent,
    state: &DeviceTimelineState,
    config: &PatternConfig,
) -> DetectorResult {
    if event.occupancy != 1 {
        return DetectorResult::ClearActive(AlertKind::AbnormalPresence);
    }

    let alone_ms = event
        .timestamp
        .signed_duration_since(state.last_anomaly_reset_at)
        .num_milliseconds();
    if alone_ms <= config.anomaly_timeout_ms {
        return DetectorResult::NoAction;
    }

    let duration_hours = alone_ms as f64 / 3_600_000.0;
    DetectorResult::Raise(AlertIntent {
        kind: AlertKind::AbnormalPresence,
        title: "Abnormal presence detected".to_string(),
        description: format!(
            "One person has been alone in room {} for {:.1} hours",
            event.device_id, duration_hours
        ),
        extra: json!({
            "duration_hours": duration_hours,
            "started_at": state.last_anomaly_reset_at.to_rfc3339(),
        }),
        weekday: None,
    })
}

/// Empty room during business hours (Mon-Fri, configured hour window,
/// inclusive). Deduplicated by the engine per `(device, weekday)`, so one
/// alert per weekday value can be ACTIVE at a time.
pub fn detect_time_pattern(
    event: &PresenceEvent,
    _state: &DeviceTimelineState,
    config: &PatternConfig,
) -> DetectorResult {
    let hour = event.timestamp.hour();
    let weekday = event.timestamp.weekday().number_from_monday();

    let business_hours = hour >= config.business_start_hour
        && hour <= config.business_end_hour
        && weekday <= 5;
    if !business_hours || event.occupancy > 0 {
        return DetectorResult::NoAction;
    }

    DetectorResult::Raise(AlertIntent {
        kind: AlertKind::TimePattern,
        title: "Abnormal schedule pattern".to_string(),
        description: format!(
            "Room {} empty during business hours ({}:00, weekday {})",
            event.device_id, hour, weekday
        ),
        extra: json!({
            "hour": hour,
            "weekday": weekday,
        }),
        weekday: Some(weekday),
    })
}

/// Run every detector against one event
pub fn run_detectors(
    event: &PresenceEvent,
    state: &DeviceTimelineState,
    config: &PatternConfig,
) -> Vec<DetectorResult> {
    vec![
        detect_max_occupancy(event, state, config),
        detect_idle_room(event, state, config),
        detect_anomalous_presence(event, state, config),
        detect_time_pattern(event, state, config),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn event(occupancy: u32, timestamp: DateTime<Utc>) -> PresenceEvent {
        PresenceEvent::new("room-a", occupancy, EventKind::Heartbeat, timestamp)
    }

    // Saturday 2026-01-03 03:00 UTC - outside business hours, keeps the
    // time-pattern detector quiet in tests that target other detectors
    fn quiet_ts(offset_secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 3, 3, 0, 0).unwrap() + Duration::seconds(offset_secs)
    }

    #[test]
    fn test_max_occupancy_fires_over_limit() {
        let config = PatternConfig::default();
        let state = DeviceTimelineState::new(ts(0));

        let result = detect_max_occupancy(&event(6, ts(10)), &state, &config);
        match result {
            DetectorResult::Raise(intent) => {
                assert_eq!(intent.kind, AlertKind::MaxOccupancy);
                assert_eq!(intent.extra["limit"], 5);
                assert_eq!(intent.extra["exceeded_by"], 1);
            }
            other => panic!("expected Raise, got {other:?}"),
        }
    }

    #[test]
    fn test_max_occupancy_at_limit_is_quiet() {
        let config = PatternConfig::default();
        let state = DeviceTimelineState::new(ts(0));
        assert_eq!(
            detect_max_occupancy(&event(5, ts(10)), &state, &config),
            DetectorResult::NoAction
        );
    }

    #[test]
    fn test_max_occupancy_cooldown_window() {
        let config = PatternConfig::default();
        let mut state = DeviceTimelineState::new(ts(0));
        state.record_max_occupancy_alert(ts(0));

        // 1 minute later: inside the 5 minute cooldown
        assert_eq!(
            detect_max_occupancy(&event(7, ts(60)), &state, &config),
            DetectorResult::NoAction
        );
        // 6 minutes later: past the cooldown, fires again
        assert!(matches!(
            detect_max_occupancy(&event(7, ts(360)), &state, &config),
            DetectorResult::Raise(_)
        ));
    }

    #[test]
    fn test_max_occupancy_older_event_suppressed() {
        // An out-of-order event dated before the last alert must not fire
        let config = PatternConfig::default();
        let mut state = DeviceTimelineState::new(ts(0));
        state.record_max_occupancy_alert(ts(1000));

        assert_eq!(
            detect_max_occupancy(&event(9, ts(500)), &state, &config),
            DetectorResult::NoAction
        );
    }

    #[test]
    fn test_idle_room_raises_after_timeout() {
        let config = PatternConfig::default();
        let state = DeviceTimelineState::new(quiet_ts(0));

        // Baseline event: window just opened
        assert_eq!(
            detect_idle_room(&event(0, quiet_ts(0)), &state, &config),
            DetectorResult::NoAction
        );

        // 31 minutes of zero occupancy
        let result = detect_idle_room(&event(0, quiet_ts(31 * 60)), &state, &config);
        match result {
            DetectorResult::Raise(intent) => {
                assert_eq!(intent.kind, AlertKind::IdleRoom);
                assert_eq!(intent.extra["idle_minutes"], 31);
            }
            other => panic!("expected Raise, got {other:?}"),
        }
    }

    #[test]
    fn test_idle_room_clears_on_activity() {
        let config = PatternConfig::default();
        let state = DeviceTimelineState::new(quiet_ts(0));
        assert_eq!(
            detect_idle_room(&event(2, quiet_ts(10)), &state, &config),
            DetectorResult::ClearActive(AlertKind::IdleRoom)
        );
    }

    #[test]
    fn test_anomalous_presence_after_two_hours() {
        let config = PatternConfig::default();
        let state = DeviceTimelineState::new(quiet_ts(0));

        assert_eq!(
            detect_anomalous_presence(&event(1, quiet_ts(0)), &state, &config),
            DetectorResult::NoAction
        );

        let result =
            detect_anomalous_presence(&event(1, quiet_ts(2 * 3600 + 60)), &state, &config);
        match result {
            DetectorResult::Raise(intent) => {
                assert_eq!(intent.kind, AlertKind::AbnormalPresence);
                assert!(intent.extra["duration_hours"].as_f64().unwrap() > 2.0);
            }
            other => panic!("expected Raise, got {other:?}"),
        }
    }

    #[test]
    fn test_anomalous_presence_clears_when_not_alone() {
        let config = PatternConfig::default();
        let state = DeviceTimelineState::new(quiet_ts(0));
        assert_eq!(
            detect_anomalous_presence(&event(0, quiet_ts(10)), &state, &config),
            DetectorResult::ClearActive(AlertKind::AbnormalPresence)
        );
        assert_eq!(
            detect_anomalous_presence(&event(3, quiet_ts(10)), &state, &config),
            DetectorResult::ClearActive(AlertKind::AbnormalPresence)
        );
    }

    #[test]
    fn test_time_pattern_business_hours_empty_room() {
        let config = PatternConfig::default();
        let state = DeviceTimelineState::new(ts(0));

        // Monday 2026-01-05 10:00 UTC
        let monday = Utc.with_ymd_and_hms(2026, 1, 5, 10, 0, 0).unwrap();
        let result = detect_time_pattern(&event(0, monday), &state, &config);
        match result {
            DetectorResult::Raise(intent) => {
                assert_eq!(intent.kind, AlertKind::TimePattern);
                assert_eq!(intent.extra["hour"], 10);
                assert_eq!(intent.extra["weekday"], 1);
                assert_eq!(intent.weekday, Some(1));
            }
            other => panic!("expected Raise, got {other:?}"),
        }
    }

    #[test]
    fn test_time_pattern_quiet_outside_window() {
        let config = PatternConfig::default();
        let state = DeviceTimelineState::new(ts(0));

        // Monday 07:00 - before opening
        let early = Utc.with_ymd_and_hms(2026, 1, 5, 7, 0, 0).unwrap();
        assert_eq!(
            detect_time_pattern(&event(0, early), &state, &config),
            DetectorResult::NoAction
        );

        // Saturday 10:00 - weekend
        let saturday = Utc.with_ymd_and_hms(2026, 1, 10, 10, 0, 0).unwrap();
        assert_eq!(
            detect_time_pattern(&event(0, saturday), &state, &config),
            DetectorResult::NoAction
        );

        // Monday 10:00 but occupied
        let monday = Utc.with_ymd_and_hms(2026, 1, 5, 10, 0, 0).unwrap();
        assert_eq!(
            detect_time_pattern(&event(4, monday), &state, &config),
            DetectorResult::NoAction
        );
    }

    #[test]
    fn test_all_detectors_run_independently() {
        // An over-limit event during business hours also clears idle and
        // anomaly windows; detectors never gate each other.
        let config = PatternConfig::default();
        let state = DeviceTimelineState::new(ts(0));
        let monday = Utc.with_ymd_and_hms(2026, 1, 5, 10, 0, 0).unwrap();

        let results = run_detectors(&event(8, monday), &state, &config);
        assert_eq!(results.len(), 4);
        assert!(matches!(results[0], DetectorResult::Raise(_)));
        assert_eq!(results[1], DetectorResult::ClearActive(AlertKind::IdleRoom));
        assert_eq!(
            results[2],
            DetectorResult::ClearActive(AlertKind::AbnormalPresence)
        );
        assert_eq!(results[3], DetectorResult::NoAction);
    }
}
