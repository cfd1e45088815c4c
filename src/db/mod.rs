// Copyright (c) 2026 roomwatch
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/roomwatch/roomwatch-rs

//! Database module for persistent storage

use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter, Connection};
use std::sync::{Arc, Mutex};
use tracing::info;

use crate::config::DatabaseConfig;
use crate::detection::{Alert, AlertFilter, AlertKind, AlertStatus, PersistenceError, Store};
use crate::events::PresenceEvent;

impl From<rusqlite::Error> for PersistenceError {
    fn from(e: rusqlite::Error) -> Self {
        PersistenceError::Backend(e.to_string())
    }
}

/// SQLite-backed [`Store`]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open or create the database at the configured path
    pub fn open(config: &DatabaseConfig) -> Result<Self, PersistenceError> {
        if let Some(parent) = config.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| PersistenceError::Backend(e.to_string()))?;
        }

        let conn = Connection::open(&config.path)?;

        // Configure SQLite for performance
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA cache_size = -64000;
            PRAGMA temp_store = MEMORY;
        "#,
        )?;

        let store = Self::with_connection(conn)?;
        info!("Database opened at {:?}", config.path);
        Ok(store)
    }

    /// In-memory database, used by tests
    pub fn open_in_memory() -> Result<Self, PersistenceError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, PersistenceError> {
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.create_tables()?;
        Ok(store)
    }

    fn create_tables(&self) -> Result<(), PersistenceError> {
        let conn = self.conn.lock().unwrap();

        conn.execute_batch(
            r#"
            -- Raw presence telemetry
            CREATE TABLE IF NOT EXISTS events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                device_id TEXT NOT NULL,
                occupancy INTEGER NOT NULL,
                event_kind TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                sensor_id INTEGER NOT NULL,
                signal_strength INTEGER,
                uptime INTEGER,
                created_at TEXT DEFAULT CURRENT_TIMESTAMP
            );

            CREATE INDEX IF NOT EXISTS idx_events_timestamp ON events(timestamp);
            CREATE INDEX IF NOT EXISTS idx_events_device ON events(device_id, timestamp);

            -- Alerts raised by the engine
            CREATE TABLE IF NOT EXISTS alerts (
                id TEXT PRIMARY KEY,
                kind TEXT NOT NULL,
                status TEXT NOT NULL,
                title TEXT NOT NULL,
                description TEXT NOT NULL,
                occupancy INTEGER NOT NULL,
                device_id TEXT NOT NULL,
                triggered_at TEXT NOT NULL,
                weekday INTEGER,
                extra TEXT NOT NULL,
                notified INTEGER NOT NULL DEFAULT 0,
                notified_at TEXT,
                created_at TEXT DEFAULT CURRENT_TIMESTAMP
            );

            CREATE INDEX IF NOT EXISTS idx_alerts_timestamp ON alerts(triggered_at);
            CREATE INDEX IF NOT EXISTS idx_alerts_kind_status ON alerts(kind, status);
            CREATE INDEX IF NOT EXISTS idx_alerts_device ON alerts(device_id, triggered_at);
        "#,
        )?;

        Ok(())
    }

    /// Delete events and terminal alerts older than the retention window;
    /// returns how many rows were removed
    pub fn cleanup(&self, retention_days: u32) -> Result<usize, PersistenceError> {
        let conn = self.conn.lock().unwrap();
        let cutoff = (Utc::now() - chrono::Duration::days(retention_days as i64)).to_rfc3339();

        let deleted_events =
            conn.execute("DELETE FROM events WHERE timestamp < ?1", params![cutoff])?;
        let deleted_alerts = conn.execute(
            "DELETE FROM alerts WHERE triggered_at < ?1 AND status != 'ACTIVE'",
            params![cutoff],
        )?;

        if deleted_events + deleted_alerts > 0 {
            info!(
                "Cleaned up {} events and {} alerts older than {} days",
                deleted_events, deleted_alerts, retention_days
            );
        }
        Ok(deleted_events + deleted_alerts)
    }
}

const ALERT_COLUMNS: &str = "id, kind, status, title, description, occupancy, device_id, \
                             triggered_at, weekday, extra, notified, notified_at";

fn row_to_alert(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawAlertRow> {
    Ok(RawAlertRow {
        id: row.get(0)?,
        kind: row.get(1)?,
        status: row.get(2)?,
        title: row.get(3)?,
        description: row.get(4)?,
        occupancy: row.get(5)?,
        device_id: row.get(6)?,
        triggered_at: row.get(7)?,
        weekday: row.get(8)?,
        extra: row.get(9)?,
        notified: row.get(10)?,
        notified_at: row.get(11)?,
    })
}

struct RawAlertRow {
    id: String,
    kind: String,
    status: String,
    title: String,
    description: String,
    occupancy: i64,
    device_id: String,
    triggered_at: String,
    weekday: Option<i64>,
    extra: String,
    notified: i64,
    notified_at: Option<String>,
}

impl RawAlertRow {
    fn into_alert(self) -> Result<Alert, PersistenceError> {
        let kind = AlertKind::parse(&self.kind)
            .ok_or_else(|| PersistenceError::Backend(format!("unknown alert kind {}", self.kind)))?;
        let status = AlertStatus::parse(&self.status).ok_or_else(|| {
            PersistenceError::Backend(format!("unknown alert status {}", self.status))
        })?;

        Ok(Alert {
            id: self.id,
            kind,
            status,
            title: self.title,
            description: self.description,
            occupancy_at_trigger: self.occupancy as u32,
            device_id: self.device_id,
            triggered_at: parse_ts(&self.triggered_at)?,
            weekday: self.weekday.map(|w| w as u32),
            extra: serde_json::from_str(&self.extra)
                .map_err(|e| PersistenceError::Backend(e.to_string()))?,
            notified: self.notified != 0,
            notified_at: self.notified_at.as_deref().map(parse_ts).transpose()?,
        })
    }
}

fn parse_ts(s: &str) -> Result<DateTime<Utc>, PersistenceError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| PersistenceError::Backend(format!("bad timestamp {s}: {e}")))
}

impl Store for SqliteStore {
    fn save_event(&self, event: &PresenceEvent) -> Result<(), PersistenceError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"INSERT INTO events (device_id, occupancy, event_kind, timestamp, sensor_id,
                                   signal_strength, uptime)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"#,
            params![
                event.device_id,
                event.occupancy,
                event.kind.as_str(),
                event.timestamp.to_rfc3339(),
                event.sensor_id,
                event.signal_strength,
                event.uptime,
            ],
        )?;
        Ok(())
    }

    fn save_alert(&self, alert: &Alert) -> Result<(), PersistenceError> {
        let extra = serde_json::to_string(&alert.extra)
            .map_err(|e| PersistenceError::Backend(e.to_string()))?;

        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"INSERT INTO alerts (id, kind, status, title, description, occupancy, device_id,
                                   triggered_at, weekday, extra, notified, notified_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)"#,
            params![
                alert.id,
                alert.kind.as_str(),
                alert.status.as_str(),
                alert.title,
                alert.description,
                alert.occupancy_at_trigger,
                alert.device_id,
                alert.triggered_at.to_rfc3339(),
                alert.weekday,
                extra,
                alert.notified as i64,
                alert.notified_at.map(|t| t.to_rfc3339()),
            ],
        )?;
        Ok(())
    }

    fn find_active_alert(
        &self,
        device_id: &str,
        kind: AlertKind,
        weekday: Option<u32>,
    ) -> Result<Option<Alert>, PersistenceError> {
        let conn = self.conn.lock().unwrap();

        let row = if let Some(weekday) = weekday {
            let sql = format!(
                "SELECT {ALERT_COLUMNS} FROM alerts
                 WHERE device_id = ?1 AND kind = ?2 AND status = 'ACTIVE' AND weekday = ?3
                 ORDER BY triggered_at DESC LIMIT 1"
            );
            conn.query_row(&sql, params![device_id, kind.as_str(), weekday], row_to_alert)
        } else {
            let sql = format!(
                "SELECT {ALERT_COLUMNS} FROM alerts
                 WHERE device_id = ?1 AND kind = ?2 AND status = 'ACTIVE'
                 ORDER BY triggered_at DESC LIMIT 1"
            );
            conn.query_row(&sql, params![device_id, kind.as_str()], row_to_alert)
        };

        match row {
            Ok(raw) => Ok(Some(raw.into_alert()?)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn update_status(
        &self,
        alert_id: &str,
        status: AlertStatus,
    ) -> Result<bool, PersistenceError> {
        let conn = self.conn.lock().unwrap();
        // Only ACTIVE rows transition; terminal alerts stay as they are
        let changed = conn.execute(
            "UPDATE alerts SET status = ?1 WHERE id = ?2 AND status = 'ACTIVE'",
            params![status.as_str(), alert_id],
        )?;
        Ok(changed > 0)
    }

    fn bulk_update_status(
        &self,
        filter: &AlertFilter,
        status: AlertStatus,
    ) -> Result<usize, PersistenceError> {
        let mut sql = "UPDATE alerts SET status = ?1 WHERE status = 'ACTIVE'".to_string();
        let mut values: Vec<String> = vec![status.as_str().to_string()];

        if let Some(device_id) = &filter.device_id {
            values.push(device_id.clone());
            sql.push_str(&format!(" AND device_id = ?{}", values.len()));
        }
        if let Some(kind) = filter.kind {
            values.push(kind.as_str().to_string());
            sql.push_str(&format!(" AND kind = ?{}", values.len()));
        }

        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(&sql, params_from_iter(values.iter()))?;
        Ok(changed)
    }

    fn mark_notified(&self, alert_id: &str, at: DateTime<Utc>) -> Result<(), PersistenceError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE alerts SET notified = 1, notified_at = ?1 WHERE id = ?2",
            params![at.to_rfc3339(), alert_id],
        )?;
        Ok(())
    }

    fn active_alerts(&self, device_id: Option<&str>) -> Result<Vec<Alert>, PersistenceError> {
        let conn = self.conn.lock().unwrap();

        let mut results = Vec::new();
        if let Some(device_id) = device_id {
            let sql = format!(
                "SELECT {ALERT_COLUMNS} FROM alerts
                 WHERE status = 'ACTIVE' AND device_id = ?1
                 ORDER BY triggered_at DESC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params![device_id], row_to_alert)?;
            for row in rows {
                results.push(row?.into_alert()?);
            }
        } else {
            let sql = format!(
                "SELECT {ALERT_COLUMNS} FROM alerts
                 WHERE status = 'ACTIVE'
                 ORDER BY triggered_at DESC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map([], row_to_alert)?;
            for row in rows {
                results.push(row?.into_alert()?);
            }
        }

        Ok(results)
    }
}
