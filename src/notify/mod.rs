// Copyright (c) 2026 roomwatch
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/roomwatch/roomwatch-rs

//! Alert mail delivery through an HTTP mail relay

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;

use crate::detection::{Alert, AlertKind, Notifier, NotifyError};

/// Mail delivery configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifierConfig {
    /// Master switch; when off, alerts simply stay `notified = false`
    pub enabled: bool,

    /// Mail relay endpoint accepting a JSON message
    pub endpoint: String,

    /// Bearer token for the relay, if it requires one
    pub api_token: Option<String>,

    /// Sender address
    pub from: String,

    /// Receives MAX_OCCUPANCY and ABNORMAL_PRESENCE alerts
    pub admin_email: String,

    /// Receives IDLE_ROOM and TIME_PATTERN alerts
    pub manager_email: String,

    /// Per-delivery timeout in ms; a slow relay must never stall a lane
    /// beyond this
    pub timeout_ms: u64,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: "http://localhost:8025/api/send".to_string(),
            api_token: None,
            from: "roomwatch@localhost".to_string(),
            admin_email: "admin@localhost".to_string(),
            manager_email: "manager@localhost".to_string(),
            timeout_ms: 10_000,
        }
    }
}

/// Best-effort [`Notifier`] posting alert mails to the configured relay.
///
/// Delivery is fire-and-forget from the engine's point of view; failures are
/// logged there and never retried by the core.
pub struct MailNotifier {
    config: NotifierConfig,
    client: reqwest::Client,
}

impl MailNotifier {
    pub fn new(config: NotifierConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;
        Ok(Self { config, client })
    }

    /// Occupancy-limit and lone-presence alerts go to the admin, the rest to
    /// the facility manager
    fn recipient(&self, kind: AlertKind) -> &str {
        match kind {
            AlertKind::MaxOccupancy | AlertKind::AbnormalPresence => &self.config.admin_email,
            AlertKind::IdleRoom | AlertKind::TimePattern => &self.config.manager_email,
        }
    }

    fn subject(kind: AlertKind) -> &'static str {
        match kind {
            AlertKind::MaxOccupancy => "Alert: Maximum occupancy exceeded",
            AlertKind::IdleRoom => "Alert: Idle room",
            AlertKind::AbnormalPresence => "Alert: Abnormal presence",
            AlertKind::TimePattern => "Alert: Abnormal schedule pattern",
        }
    }

    fn message(&self, alert: &Alert) -> serde_json::Value {
        json!({
            "from": self.config.from,
            "to": self.recipient(alert.kind),
            "subject": Self::subject(alert.kind),
            "text": alert.description,
            "alert": {
                "id": alert.id,
                "kind": alert.kind.as_str(),
                "device_id": alert.device_id,
                "occupancy": alert.occupancy_at_trigger,
                "triggered_at": alert.triggered_at.to_rfc3339(),
                "extra": alert.extra,
            },
        })
    }
}

#[async_trait]
impl Notifier for MailNotifier {
    async fn notify(&self, alert: &Alert) -> Result<(), NotifyError> {
        if !self.config.enabled {
            return Err(NotifyError::Disabled);
        }

        let mut request = self
            .client
            .post(&self.config.endpoint)
            .json(&self.message(alert));
        if let Some(token) = &self.config.api_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                NotifyError::Timeout
            } else {
                NotifyError::Transport(e.to_string())
            }
        })?;

        if !response.status().is_success() {
            return Err(NotifyError::Rejected(response.status().as_u16()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::AlertStatus;
    use chrono::Utc;

    fn notifier(enabled: bool) -> MailNotifier {
        MailNotifier::new(NotifierConfig {
            enabled,
            admin_email: "admin@example.org".to_string(),
            manager_email: "manager@example.org".to_string(),
            ..NotifierConfig::default()
        })
        .unwrap()
    }

    fn alert(kind: AlertKind) -> Alert {
        Alert {
            id: "a1".to_string(),
            kind,
            status: AlertStatus::Active,
            title: "t".to_string(),
            description: "d".to_string(),
            occupancy_at_trigger: 6,
            device_id: "d1".to_string(),
            triggered_at: Utc::now(),
            weekday: None,
            extra: serde_json::json!({}),
            notified: false,
            notified_at: None,
        }
    }

    #[test]
    fn test_recipient_routing() {
        let n = notifier(true);
        assert_eq!(n.recipient(AlertKind::MaxOccupancy), "admin@example.org");
        assert_eq!(n.recipient(AlertKind::AbnormalPresence), "admin@example.org");
        assert_eq!(n.recipient(AlertKind::IdleRoom), "manager@example.org");
        assert_eq!(n.recipient(AlertKind::TimePattern), "manager@example.org");
    }

    #[test]
    fn test_message_carries_alert_details() {
        let n = notifier(true);
        let msg = n.message(&alert(AlertKind::IdleRoom));
        assert_eq!(msg["to"], "manager@example.org");
        assert_eq!(msg["subject"], "Alert: Idle room");
        assert_eq!(msg["alert"]["device_id"], "d1");
        assert_eq!(msg["alert"]["kind"], "IDLE_ROOM");
    }

    #[tokio::test]
    async fn test_disabled_notifier_reports_disabled() {
        let n = notifier(false);
        let err = n.notify(&alert(AlertKind::IdleRoom)).await.unwrap_err();
        assert!(matches!(err, NotifyError::Disabled));
    }
}
