// Copyright (c) 2026 roomwatch
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/roomwatch/roomwatch-rs

//! MQTT ingestion and outbound device commands

use anyhow::{anyhow, Result};
use chrono::Utc;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::StreamingConfig;
use crate::config::PatternConfig;
use crate::core::Dispatcher;
use crate::detection::{AlertKind, Broadcaster, Topic};
use crate::events::EventValidator;

/// What a broker topic carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TopicClass {
    Presence,
    Status,
}

/// `room/presence`, `room/<device>/presence`, and the status equivalents
fn classify_topic(topic: &str, prefix: &str) -> Option<TopicClass> {
    let rest = topic.strip_prefix(prefix)?.strip_prefix('/')?;
    match rest.rsplit('/').next() {
        Some("presence") => Some(TopicClass::Presence),
        Some("status") => Some(TopicClass::Status),
        _ => None,
    }
}

/// MQTT service: subscribes to the device topics, validates presence
/// payloads, and feeds them to the dispatcher. Status payloads are relayed
/// to the dashboard bus untouched.
pub struct MqttService {
    client: AsyncClient,
    eventloop: EventLoop,
    topic_prefix: String,
    validator: EventValidator,
    dispatcher: Arc<Dispatcher>,
    broadcaster: Arc<dyn Broadcaster>,
}

impl MqttService {
    pub fn new(
        config: &StreamingConfig,
        dispatcher: Arc<Dispatcher>,
        broadcaster: Arc<dyn Broadcaster>,
    ) -> Self {
        let mut options = MqttOptions::new(
            &config.mqtt_client_id,
            &config.mqtt_broker,
            config.mqtt_port,
        );
        options.set_keep_alive(Duration::from_secs(30));

        if let (Some(username), Some(password)) =
            (&config.mqtt_username, &config.mqtt_password)
        {
            options.set_credentials(username, password);
        }

        let (client, eventloop) = AsyncClient::new(options, 100);

        Self {
            client,
            eventloop,
            topic_prefix: config.mqtt_topic_prefix.clone(),
            validator: EventValidator::new(),
            dispatcher,
            broadcaster,
        }
    }

    /// Handle for outbound device commands, usable while `run` owns the
    /// service
    pub fn commands(&self) -> MqttCommands {
        MqttCommands {
            client: self.client.clone(),
            topic_prefix: self.topic_prefix.clone(),
        }
    }

    /// Poll the broker until shutdown. Connection errors back off and retry;
    /// a malformed payload never stops the stream.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) -> Result<()> {
        info!("Starting MQTT ingestion...");

        loop {
            tokio::select! {
                event = self.eventloop.poll() => {
                    match event {
                        Ok(Event::Incoming(Packet::ConnAck(_))) => {
                            info!("MQTT connected");
                            Self::subscribe_topics(&self.client, &self.topic_prefix).await;
                        }
                        Ok(Event::Incoming(Packet::Publish(publish))) => {
                            self.handle_publish(&publish.topic, &publish.payload);
                        }
                        Ok(_) => {}
                        Err(e) => {
                            warn!("MQTT error: {:?}, retrying in 5s", e);
                            tokio::time::sleep(Duration::from_secs(5)).await;
                        }
                    }
                }
                _ = shutdown.recv() => {
                    info!("MQTT ingestion shutting down...");
                    let _ = self.client.disconnect().await;
                    break;
                }
            }
        }

        Ok(())
    }

    async fn subscribe_topics(client: &AsyncClient, prefix: &str) {
        let topics = [
            format!("{prefix}/presence"),
            format!("{prefix}/status"),
            format!("{prefix}/+/presence"),
            format!("{prefix}/+/status"),
        ];

        for topic in topics {
            match client.subscribe(topic.as_str(), QoS::AtLeastOnce).await {
                Ok(_) => info!("Subscribed to MQTT topic: {}", topic),
                Err(e) => warn!("Failed to subscribe {}: {}", topic, e),
            }
        }
    }

    fn handle_publish(&self, topic: &str, payload: &[u8]) {
        let class = match classify_topic(topic, &self.topic_prefix) {
            Some(class) => class,
            None => {
                debug!("unhandled MQTT topic: {}", topic);
                return;
            }
        };

        let raw: Value = match serde_json::from_slice(payload) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("dropping unparseable payload on {}: {}", topic, e);
                return;
            }
        };

        match class {
            TopicClass::Presence => match self.validator.validate(&raw) {
                Ok(event) => {
                    debug!(
                        "presence event from {}: {} ({})",
                        event.device_id,
                        event.occupancy,
                        event.kind.as_str()
                    );
                    self.dispatcher.submit(event);
                }
                Err(e) => warn!("dropping invalid presence payload on {}: {}", topic, e),
            },
            TopicClass::Status => {
                debug!("status update on {}", topic);
                self.broadcaster.publish(Topic::Status, raw);
            }
        }
    }
}

/// Outbound command publisher; cheap to clone
#[derive(Clone)]
pub struct MqttCommands {
    client: AsyncClient,
    topic_prefix: String,
}

impl MqttCommands {
    /// Send a command envelope to one device
    pub async fn send_command(
        &self,
        device_id: &str,
        command: &str,
        data: Value,
    ) -> Result<()> {
        let topic = format!("{}/{}/command", self.topic_prefix, device_id);
        let payload = serde_json::to_vec(&command_envelope(command, data))?;

        self.client
            .publish(topic, QoS::AtLeastOnce, false, payload)
            .await
            .map_err(|e| anyhow!("MQTT publish failed: {}", e))?;

        info!("Command {} sent to {}", command, device_id);
        Ok(())
    }

    /// Push detection thresholds to a device
    pub async fn send_config(&self, device_id: &str, config: &PatternConfig) -> Result<()> {
        self.send_command(
            device_id,
            "CONFIG",
            json!({
                "max_occupancy": config.max_occupancy,
                "idle_timeout_ms": config.idle_timeout_ms,
                "anomaly_timeout_ms": config.anomaly_timeout_ms,
            }),
        )
        .await
    }

    /// Flash an alert on a device's local indicator
    pub async fn send_alert(&self, device_id: &str, kind: AlertKind, message: &str) -> Result<()> {
        self.send_command(
            device_id,
            "ALERT",
            json!({
                "kind": kind.as_str(),
                "message": message,
            }),
        )
        .await
    }
}

fn command_envelope(command: &str, data: Value) -> Value {
    let mut envelope = json!({
        "command": command,
        "timestamp": Utc::now().timestamp_millis(),
    });
    if let (Some(envelope), Some(data)) = (envelope.as_object_mut(), data.as_object()) {
        for (key, value) in data {
            envelope.insert(key.clone(), value.clone());
        }
    }
    envelope
}
