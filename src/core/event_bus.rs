// Copyright (c) 2026 roomwatch
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/roomwatch/roomwatch-rs

//! Event bus for dashboard fan-out

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;

use crate::detection::{Broadcaster, Topic};

/// One published bus message
#[derive(Debug, Clone, Serialize)]
pub struct BusMessage {
    /// Monotonic sequence number within this process
    pub seq: u64,
    /// Topic name: "presence", "alert", or "status"
    pub topic: &'static str,
    pub timestamp: DateTime<Utc>,
    pub payload: serde_json::Value,
}

/// Broadcast-channel fan-out implementing the engine's [`Broadcaster`] seam.
///
/// Injected into the engine at construction; the WebSocket server and tests
/// subscribe. Publishing never blocks: with no subscribers (or lagging ones)
/// the message is simply dropped by the channel.
pub struct EventBus {
    tx: broadcast::Sender<BusMessage>,
    seq: std::sync::atomic::AtomicU64,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            seq: std::sync::atomic::AtomicU64::new(0),
        }
    }

    /// Subscribe to every subsequent message
    pub fn subscribe(&self) -> broadcast::Receiver<BusMessage> {
        self.tx.subscribe()
    }

    /// Number of connected subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Broadcaster for EventBus {
    fn publish(&self, topic: Topic, payload: serde_json::Value) {
        let seq = self.seq.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        let _ = self.tx.send(BusMessage {
            seq,
            topic: topic.as_str(),
            timestamp: Utc::now(),
            payload,
        });
    }
}
