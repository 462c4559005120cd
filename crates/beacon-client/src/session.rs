//! Reconnecting WebSocket feed.
//!
//! `FeedClient::run` owns the connection lifecycle: connect, stream
//! messages into the mirror in arrival order, and on closure retry per the
//! reconnect policy until it is exhausted. Message handling is
//! single-threaded per session; each message is applied before the next is
//! read, so the mirror never mixes two messages' effects.

use std::sync::{Arc, Mutex};

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::{connect_async, tungstenite::Message};

use beacon_core::{BroadcastMessage, ClientMessage, Error, Result};

use crate::mirror::ClientMirror;
use crate::reconnect::{ConnectionStatus, ReconnectPolicy};

/// Feed connection settings.
#[derive(Debug, Clone)]
pub struct FeedConfig {
    /// WebSocket endpoint, e.g. `ws://localhost:3000/ws`.
    pub url: String,
    /// Optional bearer token; omitted means a guest session.
    pub token: Option<String>,
    pub policy: ReconnectPolicy,
}

impl FeedConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            token: None,
            policy: ReconnectPolicy::default(),
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }
}

/// Cloneable handle for observing the feed and issuing queries.
#[derive(Clone)]
pub struct FeedHandle {
    mirror: Arc<Mutex<ClientMirror>>,
    status_rx: watch::Receiver<ConnectionStatus>,
    cmd_tx: mpsc::UnboundedSender<ClientMessage>,
}

impl FeedHandle {
    /// Shared mirror; lock it briefly to read state or derive views.
    pub fn mirror(&self) -> Arc<Mutex<ClientMirror>> {
        self.mirror.clone()
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.status_rx.borrow()
    }

    /// Watch stream of status transitions.
    pub fn status_stream(&self) -> watch::Receiver<ConnectionStatus> {
        self.status_rx.clone()
    }

    /// Ask the server for a device's position history. The reply arrives
    /// on the feed as a `history` (or `error`) message.
    pub fn request_history(&self, device_id: impl Into<String>) -> Result<()> {
        self.cmd_tx
            .send(ClientMessage::History {
                device_id: device_id.into(),
            })
            .map_err(|_| Error::Transport("feed closed".to_string()))
    }
}

/// One viewer's connection supervisor.
pub struct FeedClient {
    config: FeedConfig,
    mirror: Arc<Mutex<ClientMirror>>,
    status_tx: watch::Sender<ConnectionStatus>,
    status_rx: watch::Receiver<ConnectionStatus>,
    cmd_tx: mpsc::UnboundedSender<ClientMessage>,
    cmd_rx: mpsc::UnboundedReceiver<ClientMessage>,
}

impl FeedClient {
    pub fn new(config: FeedConfig) -> Self {
        let (status_tx, status_rx) = watch::channel(ConnectionStatus::Disconnected);
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        Self {
            config,
            mirror: Arc::new(Mutex::new(ClientMirror::new())),
            status_tx,
            status_rx,
            cmd_tx,
            cmd_rx,
        }
    }

    pub fn handle(&self) -> FeedHandle {
        FeedHandle {
            mirror: self.mirror.clone(),
            status_rx: self.status_rx.clone(),
            cmd_tx: self.cmd_tx.clone(),
        }
    }

    /// Drive the feed until reconnect attempts are exhausted.
    ///
    /// Only one attempt is ever in flight: the loop connects, streams until
    /// the transport drops, then sleeps out the retry delay.
    pub async fn run(mut self) -> Result<()> {
        loop {
            self.status_tx.send_replace(ConnectionStatus::Connecting);
            if let Err(err) = self.stream_session().await {
                tracing::warn!(error = %err, "feed session ended");
            }
            self.status_tx.send_replace(ConnectionStatus::Disconnected);

            match self.config.policy.next_attempt() {
                Some(delay) => {
                    tracing::info!(
                        attempt = self.config.policy.attempts(),
                        delay_ms = delay.as_millis() as u64,
                        "scheduling reconnect"
                    );
                    tokio::time::sleep(delay).await;
                }
                None => {
                    tracing::error!("reconnect attempts exhausted");
                    return Err(Error::Transport(
                        "reconnect attempts exhausted".to_string(),
                    ));
                }
            }
        }
    }

    /// Connect once and stream messages until the transport closes.
    async fn stream_session(&mut self) -> Result<()> {
        let url = match &self.config.token {
            Some(token) => format!("{}?token={}", self.config.url, token),
            None => self.config.url.clone(),
        };
        let (stream, _) = connect_async(&url)
            .await
            .map_err(|e| Error::Transport(e.to_string()))?;

        self.config.policy.connected();
        self.status_tx.send_replace(ConnectionStatus::Connected);
        tracing::info!(url = %self.config.url, "feed connected");

        let (mut sink, mut stream) = stream.split();
        let mirror = self.mirror.clone();
        loop {
            tokio::select! {
                frame = stream.next() => match frame {
                    Some(Ok(Message::Text(text))) => apply_frame(&mirror, &text),
                    Some(Ok(Message::Close(_))) | None => {
                        return Err(Error::Transport("connection closed".to_string()));
                    }
                    Some(Ok(_)) => {} // pings are answered by the transport
                    Some(Err(err)) => {
                        return Err(Error::Transport(err.to_string()));
                    }
                },
                Some(cmd) = self.cmd_rx.recv() => {
                    let json = serde_json::to_string(&cmd)?;
                    if sink.send(Message::Text(json)).await.is_err() {
                        return Err(Error::Transport("send failed".to_string()));
                    }
                }
            }
        }
    }

}

fn apply_frame(mirror: &Mutex<ClientMirror>, text: &str) {
    match serde_json::from_str::<BroadcastMessage>(text) {
        Ok(message) => match mirror.lock() {
            Ok(mut mirror) => mirror.apply(message),
            Err(err) => tracing::error!(error = %err, "mirror lock poisoned"),
        },
        Err(err) => {
            tracing::debug!(error = %err, "ignoring unparseable feed frame");
        }
    }
}
