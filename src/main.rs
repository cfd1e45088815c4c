// Copyright (c) 2026 roomwatch
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/roomwatch/roomwatch-rs

//! roomwatch - Room Occupancy Monitoring & Alerting
//!
//! Consumes presence telemetry from room sensors over MQTT, detects
//! occupancy anomalies (over-limit, idle, abnormal presence, schedule
//! patterns), and manages alert lifecycle with mail notification and
//! real-time dashboard streaming.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use roomwatch::detection::{Broadcaster, Store};
use roomwatch::{
    AlertEngine, Config, Dispatcher, EventBus, MailNotifier, MqttService, SqliteStore,
    WebSocketServer, VERSION,
};

/// roomwatch - Room Occupancy Monitoring & Alerting
#[derive(Parser, Debug)]
#[command(name = "roomwatch")]
#[command(version = VERSION)]
#[command(about = "Room occupancy telemetry ingestion and alerting engine")]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Enable trace-level logging
    #[arg(long)]
    trace: bool,

    /// MQTT broker address
    #[arg(long)]
    mqtt_broker: Option<String>,

    /// WebSocket server port
    #[arg(long)]
    ws_port: Option<u16>,

    /// Data output directory
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Push the current detection thresholds to a device at startup
    #[arg(long, value_name = "DEVICE_ID")]
    push_config: Option<String>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.trace {
        Level::TRACE
    } else if args.debug {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_file(args.debug)
        .with_line_number(args.debug)
        .with_ansi(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("roomwatch v{} - Room Occupancy Monitoring & Alerting", VERSION);

    // Load or create configuration
    let config_path = args.config.clone().unwrap_or_else(Config::default_path);
    let mut config = Config::load_or_create(&config_path)?;

    // Override with command line args
    if let Some(data_dir) = args.data_dir {
        config.database.path = data_dir.join("roomwatch.db");
        config.data_dir = data_dir;
    }
    if let Some(port) = args.ws_port {
        config.streaming.websocket_port = port;
    }
    if let Some(broker) = args.mqtt_broker {
        config.streaming.mqtt_enabled = true;
        config.streaming.mqtt_broker = broker;
    }

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run(config, args.push_config))
}

async fn run(config: Config, push_config: Option<String>) -> Result<()> {
    // Storage
    let store = Arc::new(SqliteStore::open(&config.database)?);
    store.cleanup(config.database.retention_days)?;
    let active = store.active_alerts(None)?;
    info!("{} alert(s) active at startup", active.len());

    // Engine wiring: collaborators are injected, never global
    let bus = Arc::new(EventBus::new(1000));
    let notifier = Arc::new(MailNotifier::new(config.notifier.clone())?);
    let engine = Arc::new(AlertEngine::new(
        config.patterns.clone(),
        Arc::clone(&store) as Arc<dyn Store>,
        notifier,
        Arc::clone(&bus) as Arc<dyn Broadcaster>,
    ));
    let dispatcher = Arc::new(Dispatcher::new(Arc::clone(&engine)));

    let (shutdown_tx, _) = broadcast::channel::<()>(4);

    // Dashboard fan-out
    if config.streaming.websocket_enabled {
        let server = WebSocketServer::new(
            config.streaming.websocket_port,
            config.streaming.websocket_max_clients,
            Arc::clone(&bus),
        );
        server.start(shutdown_tx.subscribe()).await?;
    }

    // MQTT ingestion
    let mqtt_task = if config.streaming.mqtt_enabled {
        let service = MqttService::new(
            &config.streaming,
            Arc::clone(&dispatcher),
            Arc::clone(&bus) as Arc<dyn Broadcaster>,
        );

        if let Some(device_id) = push_config {
            service
                .commands()
                .send_config(&device_id, &config.patterns)
                .await?;
        }

        Some(tokio::spawn(service.run(shutdown_tx.subscribe())))
    } else {
        info!("MQTT ingestion disabled");
        None
    };

    info!("roomwatch running, press Ctrl+C to shutdown");
    tokio::signal::ctrl_c().await?;

    info!("Shutdown signal received, draining...");
    let _ = shutdown_tx.send(());

    // Stop ingestion first, then drain the per-device lanes
    if let Some(task) = mqtt_task {
        let _ = task.await;
    }
    dispatcher.shutdown().await;

    info!(
        "Shutdown complete ({} device(s) seen this run)",
        engine.device_count()
    );
    Ok(())
}
