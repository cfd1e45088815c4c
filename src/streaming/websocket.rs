// Copyright (c) 2026 roomwatch
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/roomwatch/roomwatch-rs

//! WebSocket server for real-time dashboard streaming

use anyhow::Result;
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, info, warn};

use crate::core::{BusMessage, EventBus};

/// Fans every bus message out to connected dashboard clients as JSON text
/// frames. A slow or dead client is dropped; it can never block the bus or
/// the other clients.
pub struct WebSocketServer {
    port: u16,
    max_clients: usize,
    bus: Arc<EventBus>,
    clients: Arc<AtomicUsize>,
}

impl WebSocketServer {
    pub fn new(port: u16, max_clients: usize, bus: Arc<EventBus>) -> Self {
        Self {
            port,
            max_clients,
            bus,
            clients: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Bind and start accepting clients; returns the bound address
    pub async fn start(&self, mut shutdown: broadcast::Receiver<()>) -> Result<SocketAddr> {
        let addr = format!("0.0.0.0:{}", self.port);
        let listener = TcpListener::bind(&addr).await?;
        let local_addr = listener.local_addr()?;

        info!("WebSocket server listening on ws://{}", local_addr);

        let bus = Arc::clone(&self.bus);
        let clients = Arc::clone(&self.clients);
        let max_clients = self.max_clients;

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    accepted = listener.accept() => {
                        match accepted {
                            Ok((stream, peer)) => {
                                if clients.load(Ordering::SeqCst) >= max_clients {
                                    warn!("Max clients reached, rejecting {}", peer);
                                    continue;
                                }
                                let rx = bus.subscribe();
                                let clients = Arc::clone(&clients);
                                tokio::spawn(async move {
                                    clients.fetch_add(1, Ordering::SeqCst);
                                    handle_connection(stream, peer, rx).await;
                                    clients.fetch_sub(1, Ordering::SeqCst);
                                });
                            }
                            Err(e) => warn!("Accept failed: {}", e),
                        }
                    }
                    _ = shutdown.recv() => {
                        info!("WebSocket server shutting down...");
                        break;
                    }
                }
            }
        });

        Ok(local_addr)
    }

    /// Currently connected dashboard clients
    pub fn client_count(&self) -> usize {
        self.clients.load(Ordering::SeqCst)
    }
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    mut rx: broadcast::Receiver<BusMessage>,
) {
    let ws = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!("Handshake failed with {}: {}", peer, e);
            return;
        }
    };
    info!("Dashboard client connected: {}", peer);

    let (mut sink, mut source) = ws.split();

    loop {
        tokio::select! {
            msg = rx.recv() => {
                match msg {
                    Ok(msg) => {
                        let frame = match serde_json::to_string(&msg) {
                            Ok(frame) => frame,
                            Err(e) => {
                                warn!("Failed to serialize bus message: {}", e);
                                continue;
                            }
                        };
                        if sink.send(Message::Text(frame)).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        debug!("Client {} lagged, skipped {} messages", peer, n);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            incoming = source.next() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    // Dashboards only listen; other frames are ignored
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    info!("Dashboard client disconnected: {}", peer);
}
