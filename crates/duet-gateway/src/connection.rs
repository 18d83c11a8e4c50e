use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use duet_types::events::GatewayEvent;

use crate::dispatcher::{DirectedReceiver, Dispatcher};
use crate::presence::next_event;
use crate::registry::UserId;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Query string of the gateway upgrade request.
#[derive(Debug, Default, Deserialize)]
pub struct GatewayQuery {
    #[serde(rename = "userId")]
    pub user_id: Option<String>,
}

impl GatewayQuery {
    /// The user this connection speaks for. Absent, empty or malformed ids
    /// yield `None`: the connection still works but is never registered.
    pub fn user_id(&self) -> Option<UserId> {
        let raw = self.user_id.as_deref()?.trim();
        if raw.is_empty() {
            return None;
        }
        match raw.parse::<Uuid>() {
            Ok(id) => Some(id),
            Err(e) => {
                let shown: String = raw.chars().take(64).collect();
                warn!("Ignoring malformed userId '{}' on gateway connect: {}", shown, e);
                None
            }
        }
    }
}

/// Drive one WebSocket connection until it closes.
///
/// With a `user_id` the connection is registered for presence and directed
/// delivery; without one it only receives presence snapshots.
pub async fn handle_connection(socket: WebSocket, dispatcher: Dispatcher, user_id: Option<UserId>) {
    let (mut sender, receiver) = socket.split();

    // Subscribe before registering so this connection also gets the snapshot
    // that announces it.
    let broadcast_rx = dispatcher.subscribe();

    let registration = match user_id {
        Some(uid) => {
            let (conn_id, directed_rx) = dispatcher.register(uid).await;
            info!("User {} connected to gateway (connection {})", uid, conn_id);
            Some((uid, conn_id, directed_rx))
        }
        None => {
            info!("Anonymous client connected to gateway");
            // Nothing was mutated, so nothing was broadcast: hand this client
            // the current snapshot directly.
            let snapshot = GatewayEvent::OnlineUsers(dispatcher.online_users().await);
            if let Some(frame) = encode(&snapshot) {
                if sender.send(frame).await.is_err() {
                    return;
                }
            }
            None
        }
    };

    let (directed_rx, owner) = match registration {
        Some((uid, conn_id, rx)) => (Some(rx), Some((uid, conn_id))),
        None => (None, None),
    };

    run_connection_loop(sender, receiver, broadcast_rx, directed_rx).await;

    match owner {
        Some((uid, conn_id)) => {
            dispatcher.unregister(uid, conn_id).await;
            info!("User {} disconnected from gateway (connection {})", uid, conn_id);
        }
        None => info!("Anonymous client disconnected from gateway"),
    }
}

async fn run_connection_loop(
    mut sender: SplitSink<WebSocket, Message>,
    mut receiver: SplitStream<WebSocket>,
    mut broadcast_rx: tokio::sync::broadcast::Receiver<GatewayEvent>,
    mut directed_rx: Option<DirectedReceiver>,
) {
    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Forward broadcasts + directed events -> client, with heartbeat
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                event = next_event(&mut broadcast_rx) => {
                    let Some(event) = event else { break };
                    if let Some(frame) = encode(&event) {
                        if sender.send(frame).await.is_err() {
                            break;
                        }
                    }
                }
                event = next_directed(&mut directed_rx) => {
                    match event {
                        Some(event) => {
                            if let Some(frame) = encode(&event) {
                                if sender.send(frame).await.is_err() {
                                    break;
                                }
                            }
                        }
                        // Superseded by a newer connection for the same user.
                        // Keep serving presence, stop waiting for directed events.
                        None => {
                            debug!("Directed queue closed, connection superseded");
                            directed_rx = None;
                        }
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(Bytes::new())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // The protocol is server -> client only; client frames are just liveness.
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Pong(_) => pong_flag_recv.store(true, Ordering::Release),
                Message::Close(_) => break,
                Message::Text(text) => {
                    debug!("Ignoring client text frame ({} bytes)", text.as_str().len());
                }
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }
}

async fn next_directed(rx: &mut Option<DirectedReceiver>) -> Option<GatewayEvent> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

fn encode(event: &GatewayEvent) -> Option<Message> {
    match serde_json::to_string(event) {
        Ok(text) => Some(Message::Text(text.into())),
        Err(e) => {
            warn!("Failed to encode {} event: {}", event.name(), e);
            None
        }
    }
}
