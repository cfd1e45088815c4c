//! Streaming module - MQTT ingestion and WebSocket fan-out

mod mqtt;
mod websocket;

pub use mqtt::{MqttCommands, MqttService};
pub use websocket::WebSocketServer;

use serde::{Deserialize, Serialize};

/// Streaming configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamingConfig {
    /// Enable MQTT ingestion
    pub mqtt_enabled: bool,
    pub mqtt_broker: String,
    pub mqtt_port: u16,
    pub mqtt_client_id: String,
    pub mqtt_username: Option<String>,
    pub mqtt_password: Option<String>,
    /// Leading topic segment, e.g. `room` for `room/+/presence`
    pub mqtt_topic_prefix: String,

    /// Enable the WebSocket dashboard server
    pub websocket_enabled: bool,
    pub websocket_port: u16,
    pub websocket_max_clients: usize,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            mqtt_enabled: true,
            mqtt_broker: "localhost".to_string(),
            mqtt_port: 1883,
            mqtt_client_id: "roomwatch".to_string(),
            mqtt_username: None,
            mqtt_password: None,
            mqtt_topic_prefix: "room".to_string(),

            websocket_enabled: true,
            websocket_port: 8765,
            websocket_max_clients: 32,
        }
    }
}
