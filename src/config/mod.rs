// Copyright (c) 2026 roomwatch
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/roomwatch/roomwatch-rs

//! Configuration module

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::notify::NotifierConfig;
use crate::streaming::StreamingConfig;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Application name
    pub app_name: String,

    /// Data directory
    pub data_dir: PathBuf,

    /// Log level
    pub log_level: String,

    /// Pattern detection thresholds
    pub patterns: PatternConfig,

    /// MQTT ingestion and WebSocket fan-out
    pub streaming: StreamingConfig,

    /// Alert mail delivery
    pub notifier: NotifierConfig,

    /// Database configuration
    pub database: DatabaseConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app_name: "roomwatch".to_string(),
            data_dir: PathBuf::from("./data"),
            log_level: "info".to_string(),
            patterns: PatternConfig::default(),
            streaming: StreamingConfig::default(),
            notifier: NotifierConfig::default(),
            database: DatabaseConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Load or create default configuration
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            let config = Self::default();

            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            config.save(path)?;
            Ok(config)
        }
    }

    /// Get configuration directory
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|d| d.join("roomwatch"))
            .unwrap_or_else(|| PathBuf::from("./config"))
    }

    /// Get default configuration path
    pub fn default_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }
}

/// Pattern detection thresholds consumed by the alert engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternConfig {
    /// Occupancy limit; counts above this raise MAX_OCCUPANCY
    pub max_occupancy: u32,

    /// Minimum gap between MAX_OCCUPANCY alerts for a device, in ms
    pub max_occupancy_cooldown_ms: i64,

    /// How long a room must sit at zero occupancy before IDLE_ROOM, in ms
    pub idle_timeout_ms: i64,

    /// How long one person may be alone before ABNORMAL_PRESENCE, in ms
    pub anomaly_timeout_ms: i64,

    /// Business hours start, inclusive (UTC hour of the event timestamp)
    pub business_start_hour: u32,

    /// Business hours end, inclusive
    pub business_end_hour: u32,
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self {
            max_occupancy: 5,
            max_occupancy_cooldown_ms: 300_000, // 5 min
            idle_timeout_ms: 1_800_000,         // 30 min
            anomaly_timeout_ms: 7_200_000,      // 2 h
            business_start_hour: 8,
            business_end_hour: 18,
        }
    }
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database path
    pub path: PathBuf,

    /// Retention period in days
    pub retention_days: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./data/roomwatch.db"),
            retention_days: 90,
        }
    }
}
