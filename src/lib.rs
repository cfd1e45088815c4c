// Copyright (c) 2026 roomwatch
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/roomwatch/roomwatch-rs

//! roomwatch - Room Occupancy Monitoring & Alerting
//!
//! Ingests periodic occupancy telemetry from room-presence devices over
//! MQTT, detects anomalous patterns, and manages the alert lifecycle:
//! raise, suppress, auto-resolve, notify, broadcast.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      roomwatch Engine                        │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌──────────┐   ┌───────────┐   ┌────────────┐               │
//! │  │   MQTT   │ → │ Validator │ → │ Dispatcher │ (lane per     │
//! │  │ Ingestion│   └───────────┘   └────────────┘  device)      │
//! │  └──────────┘                        ↓                       │
//! │                               ┌─────────────┐                │
//! │                               │ AlertEngine │ ← detectors    │
//! │                               └─────────────┘                │
//! │                      ↓               ↓              ↓        │
//! │                ┌──────────┐   ┌──────────┐   ┌───────────┐   │
//! │                │  SQLite  │   │ Notifier │   │ Event Bus │   │
//! │                │  Store   │   │  (mail)  │   │ WebSocket │   │
//! │                └──────────┘   └──────────┘   └───────────┘   │
//! └──────────────────────────────────────────────────────────────┘
//! ```

#![warn(missing_docs)]
#![allow(dead_code)]

pub mod config;
pub mod core;
pub mod db;
pub mod detection;
pub mod events;
pub mod notify;
pub mod streaming;

// Re-exports for convenience
pub use config::Config;
pub use core::{Dispatcher, EventBus};
pub use db::SqliteStore;
pub use detection::{Alert, AlertEngine, AlertKind, AlertStatus};
pub use events::{EventValidator, PresenceEvent};
pub use notify::MailNotifier;
pub use streaming::{MqttService, WebSocketServer};

/// roomwatch version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// roomwatch name
pub const NAME: &str = "roomwatch";
