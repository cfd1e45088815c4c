// Copyright (c) 2026 roomwatch
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/roomwatch/roomwatch-rs

//! Raw payload validation

use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;
use thiserror::Error;

use super::{EventKind, PresenceEvent};

/// Why a raw telemetry payload was rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required field is absent
    #[error("missing required field `{0}`")]
    MissingField(&'static str),
    /// A field carries a value outside its enum domain
    #[error("field `{field}` has unrecognized value `{value}`")]
    InvalidEnum {
        /// Offending field
        field: &'static str,
        /// Value as received
        value: String,
    },
    /// A field is present but out of range or the wrong shape
    #[error("field `{field}` is invalid: {reason}")]
    InvalidValue {
        /// Offending field
        field: &'static str,
        /// What was wrong with it
        reason: String,
    },
}

/// Normalizes raw device payloads into [`PresenceEvent`]s.
///
/// Stateless and side-effect free. A rejected payload must never affect the
/// processing of other devices' events; callers log and drop.
#[derive(Debug, Default, Clone, Copy)]
pub struct EventValidator;

impl EventValidator {
    pub fn new() -> Self {
        Self
    }

    /// Validate one raw JSON payload.
    ///
    /// `sensor` defaults to 1 and `timestamp` (epoch milliseconds on the
    /// wire) to ingestion time when the device omits them.
    pub fn validate(&self, raw: &Value) -> Result<PresenceEvent, ValidationError> {
        let device_id = raw
            .get("device_id")
            .ok_or(ValidationError::MissingField("device_id"))?
            .as_str()
            .ok_or_else(|| invalid("device_id", "not a string"))?;
        if device_id.is_empty() {
            return Err(invalid("device_id", "empty"));
        }

        let occupancy_raw = raw
            .get("occupancy")
            .ok_or(ValidationError::MissingField("occupancy"))?
            .as_i64()
            .ok_or_else(|| invalid("occupancy", "not an integer"))?;
        let occupancy = u32::try_from(occupancy_raw)
            .map_err(|_| invalid("occupancy", &format!("out of range: {occupancy_raw}")))?;

        let kind_raw = raw
            .get("event")
            .ok_or(ValidationError::MissingField("event"))?
            .as_str()
            .ok_or_else(|| invalid("event", "not a string"))?;
        let kind = EventKind::parse(kind_raw).ok_or_else(|| ValidationError::InvalidEnum {
            field: "event",
            value: kind_raw.to_string(),
        })?;

        // Absent fields get defaults; present-but-malformed ones are errors
        let timestamp = match raw.get("timestamp") {
            Some(value) => {
                let ms = value
                    .as_i64()
                    .ok_or_else(|| invalid("timestamp", "not an integer"))?;
                parse_epoch_ms(ms)?
            }
            None => Utc::now(),
        };

        let sensor_id = match raw.get("sensor") {
            Some(value) => match value.as_i64() {
                Some(s @ 1..=2) => s as u8,
                Some(s) => return Err(invalid("sensor", &format!("expected 1 or 2, got {s}"))),
                None => return Err(invalid("sensor", "not an integer")),
            },
            None => 1,
        };

        Ok(PresenceEvent {
            device_id: device_id.to_string(),
            occupancy,
            kind,
            timestamp,
            sensor_id,
            signal_strength: raw
                .get("wifi_rssi")
                .and_then(Value::as_i64)
                .map(|v| v as i32),
            uptime: raw.get("uptime").and_then(Value::as_u64),
        })
    }
}

fn invalid(field: &'static str, reason: &str) -> ValidationError {
    ValidationError::InvalidValue {
        field,
        reason: reason.to_string(),
    }
}

fn parse_epoch_ms(ms: i64) -> Result<DateTime<Utc>, ValidationError> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| invalid("timestamp", &format!("not a valid epoch-millisecond value: {ms}")))
}
