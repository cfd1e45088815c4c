// Copyright (c) 2026 roomwatch
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/roomwatch/roomwatch-rs

//! Presence telemetry model and payload validation

mod validator;

pub use validator::{EventValidator, ValidationError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What a sensor observed when it published the event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    /// A person entered the room
    Enter,
    /// A person left the room
    Exit,
    /// Periodic report with no count change
    Heartbeat,
}

impl EventKind {
    /// Parse the wire representation used by the devices
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ENTER" => Some(Self::Enter),
            "EXIT" => Some(Self::Exit),
            "HEARTBEAT" => Some(Self::Heartbeat),
            _ => None,
        }
    }

    /// Wire representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Enter => "ENTER",
            Self::Exit => "EXIT",
            Self::Heartbeat => "HEARTBEAT",
        }
    }
}

/// A single validated occupancy report from a room-presence device.
///
/// One event per telemetry message. Timestamps are device-reported and are
/// NOT guaranteed monotonic per device; duplicates and out-of-order delivery
/// happen on flaky links.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenceEvent {
    /// Reporting device
    pub device_id: String,
    /// People count reported by the device
    pub occupancy: u32,
    /// Event kind
    pub kind: EventKind,
    /// Device-reported timestamp (ingestion time when the device omits it)
    pub timestamp: DateTime<Utc>,
    /// Which of the two door sensors reported (1 or 2)
    pub sensor_id: u8,
    /// WiFi RSSI in dBm, diagnostics only
    pub signal_strength: Option<i32>,
    /// Device uptime in seconds, diagnostics only
    pub uptime: Option<u64>,
}

impl PresenceEvent {
    /// Convenience constructor used by tests and the simulator-free demo path
    pub fn new(device_id: &str, occupancy: u32, kind: EventKind, timestamp: DateTime<Utc>) -> Self {
        Self {
            device_id: device_id.to_string(),
            occupancy,
            kind,
            timestamp,
            sensor_id: 1,
            signal_strength: None,
            uptime: None,
        }
    }
}
