// Copyright (c) 2026 roomwatch
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/roomwatch/roomwatch-rs

//! Alert lifecycle engine.
//!
//! Runs the detectors over each event, deduplicates against stored ACTIVE
//! alerts, persists, auto-resolves, and hands finished alerts to the
//! injected notifier and broadcaster. Nothing here is fatal to the process:
//! every failure degrades to "this one event/alert was not fully processed"
//! while other devices keep flowing.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::detectors::run_detectors;
use super::state::{DeviceTimelineState, StateRegistry};
use super::{Alert, AlertIntent, AlertKind, AlertStatus, DetectorResult};
use crate::config::PatternConfig;
use crate::events::PresenceEvent;

/// Broadcast topics consumed by dashboards
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topic {
    /// Per-event occupancy updates
    Presence,
    /// Newly raised alerts
    Alert,
    /// Device status reports
    Status,
}

impl Topic {
    /// Wire name of the topic
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Presence => "presence",
            Self::Alert => "alert",
            Self::Status => "status",
        }
    }
}

/// Store failure; the affected write is dropped and processing continues
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// Backend unavailable or write failed
    #[error("storage backend failure: {0}")]
    Backend(String),
}

/// Notification delivery failure; the alert stays `notified = false`
#[derive(Debug, Error)]
pub enum NotifyError {
    /// Could not reach the relay
    #[error("notification transport failure: {0}")]
    Transport(String),
    /// Relay answered with a non-success status
    #[error("notification rejected by relay: HTTP {0}")]
    Rejected(u16),
    /// Delivery did not complete within the configured timeout
    #[error("notification timed out")]
    Timeout,
    /// Delivery is switched off in configuration
    #[error("notifier disabled")]
    Disabled,
}

/// Filter for bulk status transitions; empty matches every ACTIVE alert
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AlertFilter {
    pub device_id: Option<String>,
    pub kind: Option<AlertKind>,
}

impl AlertFilter {
    /// Filter on one `(device, kind)` pair
    pub fn device_kind(device_id: &str, kind: AlertKind) -> Self {
        Self {
            device_id: Some(device_id.to_string()),
            kind: Some(kind),
        }
    }
}

/// Persistence collaborator.
///
/// Status transitions only ever touch ACTIVE rows: updating an alert that is
/// already terminal is a no-op, never an error, which makes resolve/ignore
/// idempotent by construction.
pub trait Store: Send + Sync {
    /// Persist one raw telemetry event
    fn save_event(&self, event: &PresenceEvent) -> Result<(), PersistenceError>;

    /// Persist a freshly raised alert
    fn save_alert(&self, alert: &Alert) -> Result<(), PersistenceError>;

    /// Find the ACTIVE alert for `(device, kind)`, optionally narrowed to a
    /// weekday (TIME_PATTERN dedup)
    fn find_active_alert(
        &self,
        device_id: &str,
        kind: AlertKind,
        weekday: Option<u32>,
    ) -> Result<Option<Alert>, PersistenceError>;

    /// Transition one ACTIVE alert; returns whether a row changed
    fn update_status(&self, alert_id: &str, status: AlertStatus)
        -> Result<bool, PersistenceError>;

    /// Transition every ACTIVE alert matching `filter`; returns the count
    fn bulk_update_status(
        &self,
        filter: &AlertFilter,
        status: AlertStatus,
    ) -> Result<usize, PersistenceError>;

    /// Record successful notification delivery
    fn mark_notified(&self, alert_id: &str, at: DateTime<Utc>) -> Result<(), PersistenceError>;

    /// List ACTIVE alerts, optionally for one device
    fn active_alerts(&self, device_id: Option<&str>) -> Result<Vec<Alert>, PersistenceError>;
}

/// Best-effort alert delivery; carries its own timeout and never blocks a
/// processing lane beyond it
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, alert: &Alert) -> Result<(), NotifyError>;
}

/// Real-time fan-out to connected dashboards. Non-blocking; injected at
/// engine construction rather than reached through a global.
pub trait Broadcaster: Send + Sync {
    fn publish(&self, topic: Topic, payload: serde_json::Value);
}

/// The pattern-detection and alert-lifecycle engine
pub struct AlertEngine {
    config: PatternConfig,
    store: Arc<dyn Store>,
    notifier: Arc<dyn Notifier>,
    broadcaster: Arc<dyn Broadcaster>,
    states: StateRegistry,
}

impl AlertEngine {
    pub fn new(
        config: PatternConfig,
        store: Arc<dyn Store>,
        notifier: Arc<dyn Notifier>,
        broadcaster: Arc<dyn Broadcaster>,
    ) -> Self {
        Self {
            config,
            store,
            notifier,
            broadcaster,
            states: StateRegistry::new(),
        }
    }

    /// Process one validated event.
    ///
    /// Called from the device's lane, one event at a time per device. Must
    /// run inside a tokio runtime (notification delivery is spawned).
    pub fn process(&self, event: &PresenceEvent) {
        let state = self.states.get_or_create(&event.device_id, event.timestamp);
        let mut state = state.lock();

        for result in run_detectors(event, &state, &self.config) {
            match result {
                DetectorResult::NoAction => {}
                DetectorResult::ClearActive(kind) => self.clear_active(event, kind, &mut state),
                DetectorResult::Raise(intent) => self.raise(event, intent, &mut state),
            }
        }
        drop(state);

        if let Err(e) = self.store.save_event(event) {
            warn!(
                "failed to persist event from {}: {} (continuing)",
                event.device_id, e
            );
        }
        self.broadcaster.publish(
            Topic::Presence,
            json!({
                "device_id": event.device_id,
                "occupancy": event.occupancy,
                "event": event.kind.as_str(),
                "timestamp": event.timestamp.to_rfc3339(),
            }),
        );
    }

    /// Auto-resolve ACTIVE alerts of `kind` for the event's device and reset
    /// the matching window. No notification is sent on this path.
    fn clear_active(&self, event: &PresenceEvent, kind: AlertKind, state: &mut DeviceTimelineState) {
        match kind {
            AlertKind::IdleRoom => state.reset_idle_window(event.timestamp),
            AlertKind::AbnormalPresence => state.reset_anomaly_window(event.timestamp),
            AlertKind::MaxOccupancy | AlertKind::TimePattern => {}
        }

        let filter = AlertFilter::device_kind(&event.device_id, kind);
        match self.store.bulk_update_status(&filter, AlertStatus::Resolved) {
            // Nothing was active: clearing is a no-op, not an error
            Ok(0) => {}
            Ok(n) => debug!(
                "auto-resolved {} {} alert(s) for {}",
                n,
                kind.as_str(),
                event.device_id
            ),
            Err(e) => warn!(
                "failed to auto-resolve {} alerts for {}: {}",
                kind.as_str(),
                event.device_id,
                e
            ),
        }
    }

    fn raise(&self, event: &PresenceEvent, intent: AlertIntent, state: &mut DeviceTimelineState) {
        // Hard single-ACTIVE dedup for every kind except MAX_OCCUPANCY,
        // which relies on its cooldown window alone.
        if intent.kind != AlertKind::MaxOccupancy {
            match self
                .store
                .find_active_alert(&event.device_id, intent.kind, intent.weekday)
            {
                Ok(Some(existing)) => {
                    debug!(
                        "suppressed {} for {}: alert {} still active",
                        intent.kind.as_str(),
                        event.device_id,
                        existing.id
                    );
                    return;
                }
                Ok(None) => {}
                Err(e) => {
                    // Cannot prove there is no duplicate; drop rather than
                    // double-raise a single-instance kind
                    warn!(
                        "dedup lookup failed, dropping {} alert for {}: {}",
                        intent.kind.as_str(),
                        event.device_id,
                        e
                    );
                    return;
                }
            }
        }

        // The detector fired: advance its window now. A failed persist below
        // must not un-fire the cooldown.
        match intent.kind {
            AlertKind::MaxOccupancy => state.record_max_occupancy_alert(event.timestamp),
            AlertKind::IdleRoom => state.reset_idle_window(event.timestamp),
            AlertKind::AbnormalPresence => state.reset_anomaly_window(event.timestamp),
            AlertKind::TimePattern => {}
        }

        let alert = Alert {
            id: uuid::Uuid::new_v4().to_string(),
            kind: intent.kind,
            status: AlertStatus::Active,
            title: intent.title,
            description: intent.description,
            occupancy_at_trigger: event.occupancy,
            device_id: event.device_id.clone(),
            triggered_at: event.timestamp,
            weekday: intent.weekday,
            extra: intent.extra,
            notified: false,
            notified_at: None,
        };

        if let Err(e) = self.store.save_alert(&alert) {
            warn!(
                "dropping {} alert for {}: {}",
                alert.kind.as_str(),
                alert.device_id,
                e
            );
            return;
        }

        info!(
            "alert raised: {} [{}] {} (occupancy {})",
            alert.kind.as_str(),
            alert.device_id,
            alert.title,
            alert.occupancy_at_trigger
        );

        // Ordered after the persist: listeners must never see an alert the
        // store does not yet have.
        match serde_json::to_value(&alert) {
            Ok(payload) => self.broadcaster.publish(Topic::Alert, payload),
            Err(e) => warn!("failed to serialize alert {}: {}", alert.id, e),
        }

        self.dispatch_notification(alert);
    }

    /// Fire-and-forget delivery; success marks the alert notified, failure
    /// is logged and never retried by the core
    fn dispatch_notification(&self, alert: Alert) {
        let notifier = Arc::clone(&self.notifier);
        let store = Arc::clone(&self.store);
        tokio::spawn(async move {
            match notifier.notify(&alert).await {
                Ok(()) => {
                    if let Err(e) = store.mark_notified(&alert.id, Utc::now()) {
                        warn!("failed to mark alert {} notified: {}", alert.id, e);
                    }
                }
                Err(e) => warn!(
                    "notification failed for {} alert {} (stays unnotified): {}",
                    alert.kind.as_str(),
                    alert.id,
                    e
                ),
            }
        });
    }

    /// Operator action: ACTIVE -> RESOLVED. Idempotent.
    pub fn resolve(&self, alert_id: &str) -> Result<(), PersistenceError> {
        if self.store.update_status(alert_id, AlertStatus::Resolved)? {
            info!("alert {} resolved", alert_id);
        }
        Ok(())
    }

    /// Operator action: ACTIVE -> IGNORED. Idempotent.
    pub fn ignore(&self, alert_id: &str) -> Result<(), PersistenceError> {
        if self.store.update_status(alert_id, AlertStatus::Ignored)? {
            info!("alert {} ignored", alert_id);
        }
        Ok(())
    }

    /// Operator action: resolve every ACTIVE alert matching `filter`
    pub fn bulk_resolve(&self, filter: &AlertFilter) -> Result<usize, PersistenceError> {
        let count = self.store.bulk_update_status(filter, AlertStatus::Resolved)?;
        if count > 0 {
            info!("bulk-resolved {} alert(s)", count);
        }
        Ok(count)
    }

    /// Number of devices with timeline state in this process
    pub fn device_count(&self) -> usize {
        self.states.device_count()
    }
}
