// Copyright (c) 2026 roomwatch
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/roomwatch/roomwatch-rs

//! Per-device timing state used by the detectors

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};

/// Cooldown and hysteresis timestamps for one device.
///
/// Process-lifetime only, never persisted: after a restart each device
/// re-baselines at its first observed event. All fields hold EVENT
/// timestamps and only move forward, so out-of-order delivery cannot rewind
/// a window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceTimelineState {
    /// When the last MAX_OCCUPANCY alert was raised; None until the first one
    pub last_max_occupancy_alert_at: Option<DateTime<Utc>>,
    /// Last observation that reset the idle window (non-zero occupancy,
    /// an idle alert being raised, or first sight of the device)
    pub last_idle_reset_at: DateTime<Utc>,
    /// Last observation that reset the lone-presence window
    pub last_anomaly_reset_at: DateTime<Utc>,
}

impl DeviceTimelineState {
    /// State for a device first seen at `first_seen`
    pub fn new(first_seen: DateTime<Utc>) -> Self {
        Self {
            last_max_occupancy_alert_at: None,
            last_idle_reset_at: first_seen,
            last_anomaly_reset_at: first_seen,
        }
    }

    /// Record a MAX_OCCUPANCY alert at `ts`, never moving backwards
    pub fn record_max_occupancy_alert(&mut self, ts: DateTime<Utc>) {
        self.last_max_occupancy_alert_at = Some(match self.last_max_occupancy_alert_at {
            Some(prev) => prev.max(ts),
            None => ts,
        });
    }

    /// Advance the idle window baseline, never moving backwards
    pub fn reset_idle_window(&mut self, ts: DateTime<Utc>) {
        self.last_idle_reset_at = self.last_idle_reset_at.max(ts);
    }

    /// Advance the lone-presence window baseline, never moving backwards
    pub fn reset_anomaly_window(&mut self, ts: DateTime<Utc>) {
        self.last_anomaly_reset_at = self.last_anomaly_reset_at.max(ts);
    }
}

/// Concurrent registry mapping `device_id` to its timeline state.
///
/// Each device's state is exclusively owned by that device's processing lane,
/// so the per-entry mutex is uncontended in normal operation; the registry
/// only guards lazy first-access creation.
#[derive(Default)]
pub struct StateRegistry {
    states: RwLock<HashMap<String, Arc<Mutex<DeviceTimelineState>>>>,
}

impl StateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch the state for `device_id`, creating it baselined at
    /// `first_seen` if this is the first event for the device.
    pub fn get_or_create(
        &self,
        device_id: &str,
        first_seen: DateTime<Utc>,
    ) -> Arc<Mutex<DeviceTimelineState>> {
        if let Some(state) = self.states.read().get(device_id) {
            return Arc::clone(state);
        }

        let mut states = self.states.write();
        Arc::clone(
            states
                .entry(device_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(DeviceTimelineState::new(first_seen)))),
        )
    }

    /// Number of devices seen so far
    pub fn device_count(&self) -> usize {
        self.states.read().len()
    }
}
