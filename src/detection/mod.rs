//! Detection module - occupancy pattern detectors and the alert lifecycle engine

mod detectors;
mod engine;
mod state;

pub use detectors::{
    detect_anomalous_presence, detect_idle_room, detect_max_occupancy, detect_time_pattern,
    run_detectors,
};
pub use engine::{
    AlertEngine, AlertFilter, Broadcaster, Notifier, NotifyError, PersistenceError, Store, Topic,
};
pub use state::{DeviceTimelineState, StateRegistry};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Alert categories raised by the detectors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertKind {
    /// Room over its configured occupancy limit
    MaxOccupancy,
    /// Room empty past the idle timeout
    IdleRoom,
    /// A single person alone past the anomaly timeout
    AbnormalPresence,
    /// Room empty during business hours
    TimePattern,
}

impl AlertKind {
    /// Stable identifier used in storage and on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MaxOccupancy => "MAX_OCCUPANCY",
            Self::IdleRoom => "IDLE_ROOM",
            Self::AbnormalPresence => "ABNORMAL_PRESENCE",
            Self::TimePattern => "TIME_PATTERN",
        }
    }

    /// Inverse of [`as_str`](Self::as_str)
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "MAX_OCCUPANCY" => Some(Self::MaxOccupancy),
            "IDLE_ROOM" => Some(Self::IdleRoom),
            "ABNORMAL_PRESENCE" => Some(Self::AbnormalPresence),
            "TIME_PATTERN" => Some(Self::TimePattern),
            _ => None,
        }
    }
}

/// Alert lifecycle status. `Resolved` and `Ignored` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertStatus {
    /// Raised and not yet acted on
    Active,
    /// Cleared, either by an operator or by auto-resolution
    Resolved,
    /// Dismissed by an operator
    Ignored,
}

impl AlertStatus {
    /// Stable identifier used in storage
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Resolved => "RESOLVED",
            Self::Ignored => "IGNORED",
        }
    }

    /// Inverse of [`as_str`](Self::as_str)
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ACTIVE" => Some(Self::Active),
            "RESOLVED" => Some(Self::Resolved),
            "IGNORED" => Some(Self::Ignored),
            _ => None,
        }
    }
}

/// An operator-facing alert.
///
/// Created exclusively by the [`AlertEngine`] when a detector fires and no
/// suppressing ACTIVE alert exists. Mutated only through explicit
/// resolve/ignore actions or engine auto-resolution; never deleted by the
/// core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    /// UUID v4, assigned at construction
    pub id: String,
    pub kind: AlertKind,
    pub status: AlertStatus,
    pub title: String,
    pub description: String,
    /// Occupancy reported by the event that triggered the alert
    pub occupancy_at_trigger: u32,
    pub device_id: String,
    pub triggered_at: DateTime<Utc>,
    /// TIME_PATTERN dedup key (ISO weekday, Mon=1); None for other kinds
    pub weekday: Option<u32>,
    /// Kind-specific structured payload
    pub extra: serde_json::Value,
    /// Whether the notifier confirmed delivery
    pub notified: bool,
    pub notified_at: Option<DateTime<Utc>>,
}

/// A detector's request to raise an alert, before dedup and persistence
#[derive(Debug, Clone, PartialEq)]
pub struct AlertIntent {
    pub kind: AlertKind,
    pub title: String,
    pub description: String,
    /// Kind-specific structured payload
    pub extra: serde_json::Value,
    /// Dedup key for TIME_PATTERN intents
    pub weekday: Option<u32>,
}

/// Outcome of one detector over one event
#[derive(Debug, Clone, PartialEq)]
pub enum DetectorResult {
    /// Nothing to do
    NoAction,
    /// Raise an alert (subject to engine-side dedup)
    Raise(AlertIntent),
    /// Auto-resolve any ACTIVE alert of this kind for the device and reset
    /// the associated timing window
    ClearActive(AlertKind),
}
