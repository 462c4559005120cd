//! Subscriber sessions.
//!
//! One session per connected viewer. A session optionally authenticates a
//! bearer token passed as a query parameter; an absent or invalid token
//! downgrades to a read-only guest identity instead of rejecting the
//! connection. On open the session sends `welcome` and the full device
//! snapshot, then forwards the broadcast stream until the transport closes.
//! The snapshot on (re)connect is the sole resynchronization primitive.

use std::sync::atomic::Ordering;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::{broadcast, mpsc};

use beacon_core::{BroadcastMessage, ClientMessage, SessionUser};

use crate::{history, AppState};

/// Capacity of the per-session reply queue (history answers, error echoes).
const REPLY_QUEUE: usize = 16;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub token: Option<String>,
}

/// `GET /ws` — upgrade to a subscriber session.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let user = match query.token.as_deref() {
        Some(token) => match state.auth.verify(token) {
            Ok(user) => user,
            Err(_) => {
                // Viewing stays open to guests even with a bad token.
                tracing::info!("session connect: invalid token, continuing as guest");
                SessionUser::guest()
            }
        },
        None => SessionUser::guest(),
    };
    ws.on_upgrade(move |socket| handle_session(socket, state, user))
}

async fn handle_session(socket: WebSocket, state: AppState, user: SessionUser) {
    let count = state.ws_connections.fetch_add(1, Ordering::Relaxed) + 1;
    tracing::info!(active = count, user = %user.email, "subscriber session opened");

    let (mut sender, mut receiver) = socket.split();

    // Subscribe before sending the snapshot so no delta emitted in between
    // can be missed; at worst a delta arrives again after the snapshot,
    // which is harmless because payloads are full state.
    let bus_rx = state.bus.subscribe();

    let devices = state.store.snapshot().await;
    let bootstrap_ok = send_message(&mut sender, &BroadcastMessage::Welcome { user })
        .await
        && send_message(&mut sender, &BroadcastMessage::Devices { devices }).await;

    if bootstrap_ok {
        let (reply_tx, reply_rx) = mpsc::channel::<BroadcastMessage>(REPLY_QUEUE);

        let mut send_task = tokio::spawn(forward_outbound(sender, bus_rx, reply_rx));

        let store = state.store.clone();
        let mut recv_task = tokio::spawn(async move {
            while let Some(Ok(msg)) = receiver.next().await {
                match msg {
                    Message::Text(text) => {
                        // Malformed inbound frames are ignored, not echoed.
                        let Ok(request) = serde_json::from_str::<ClientMessage>(&text) else {
                            tracing::debug!("ignoring malformed session message");
                            continue;
                        };
                        let ClientMessage::History { device_id } = request;
                        let reply = match store.device(&device_id).await {
                            Some(device) => BroadcastMessage::History {
                                device_id: device.id,
                                points: history::synthetic_track(device.lat, device.lng),
                            },
                            None => BroadcastMessage::Error {
                                error: "device not found".to_string(),
                            },
                        };
                        if reply_tx.send(reply).await.is_err() {
                            break;
                        }
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
        });

        // Whichever side finishes first, delivery to this session stops
        // immediately.
        tokio::select! {
            _ = &mut send_task => recv_task.abort(),
            _ = &mut recv_task => send_task.abort(),
        }
    }

    let count = state.ws_connections.fetch_sub(1, Ordering::Relaxed) - 1;
    tracing::info!(active = count, "subscriber session closed");
}

/// Forward broadcast frames and session-local replies to one socket,
/// pinging periodically to detect dead transports.
async fn forward_outbound(
    mut sender: futures::stream::SplitSink<WebSocket, Message>,
    mut bus_rx: broadcast::Receiver<std::sync::Arc<str>>,
    mut reply_rx: mpsc::Receiver<BroadcastMessage>,
) {
    let mut ping = tokio::time::interval(std::time::Duration::from_secs(30));
    loop {
        tokio::select! {
            frame = bus_rx.recv() => match frame {
                Ok(frame) => {
                    if sender.send(Message::Text(frame.to_string())).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    // A lagged viewer just misses frames; the next
                    // reconnect snapshot catches it up.
                    tracing::debug!(missed = n, "subscriber session lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            reply = reply_rx.recv() => match reply {
                Some(message) => {
                    if !send_message(&mut sender, &message).await {
                        break;
                    }
                }
                None => break,
            },
            _ = ping.tick() => {
                if sender.send(Message::Ping(vec![])).await.is_err() {
                    break;
                }
            }
        }
    }
}

async fn send_message(
    sender: &mut futures::stream::SplitSink<WebSocket, Message>,
    message: &BroadcastMessage,
) -> bool {
    match serde_json::to_string(message) {
        Ok(json) => sender.send(Message::Text(json)).await.is_ok(),
        Err(err) => {
            tracing::error!(error = %err, "failed to serialize session message");
            false
        }
    }
}
