//! Broadcast message protocol and fan-out bus.
//!
//! Every state change is pushed to all live subscriber sessions as a tagged
//! JSON message carrying full payloads, never diffs, so the stream stays
//! idempotent and replay-safe for late joiners. The bus is backed by
//! `tokio::sync::broadcast`: delivery to one session is independent of the
//! others, and a slow receiver that falls behind gets a `Lagged` error and
//! misses frames. The device snapshot sent on (re)connect is the only
//! recovery path.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::models::{Device, SessionUser, SosEvent, TrackPoint};

/// Server-to-client notification, one of the seven wire tags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum BroadcastMessage {
    /// Session opened; echoes the resolved identity.
    Welcome { user: SessionUser },
    /// Full current device set, the bootstrap/resync primitive.
    Devices { devices: Vec<Device> },
    /// A new SOS event was created.
    Sos { event: SosEvent, device: Device },
    /// An event was marked resolved.
    SosResolved {
        event_id: u64,
        event: SosEvent,
        device: Device,
    },
    /// An event was reopened.
    SosUnresolved {
        event_id: u64,
        event: SosEvent,
        device: Device,
    },
    /// Reply to an in-session history query.
    History {
        device_id: String,
        points: Vec<TrackPoint>,
    },
    /// Session-scoped error notification (never broadcast).
    Error { error: String },
}

impl BroadcastMessage {
    /// Wire tag of this message.
    pub fn message_type(&self) -> &'static str {
        match self {
            BroadcastMessage::Welcome { .. } => "welcome",
            BroadcastMessage::Devices { .. } => "devices",
            BroadcastMessage::Sos { .. } => "sos",
            BroadcastMessage::SosResolved { .. } => "sos_resolved",
            BroadcastMessage::SosUnresolved { .. } => "sos_unresolved",
            BroadcastMessage::History { .. } => "history",
            BroadcastMessage::Error { .. } => "error",
        }
    }
}

/// Client-to-server messages. Anything that does not parse to one of these
/// is ignored by the session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    /// Ad-hoc position history request for one device.
    History { device_id: String },
}

/// Fan-out bus for distributing broadcast messages to subscriber sessions.
///
/// Messages are serialized once on emit and shared as `Arc<str>` frames.
/// If there are no subscribers the frame is silently dropped.
pub struct BroadcastBus {
    tx: broadcast::Sender<Arc<str>>,
}

impl BroadcastBus {
    /// Create a bus with the given per-subscriber buffer capacity.
    ///
    /// Recommended: 256 for production, 32 for tests.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Serialize and deliver a message to every live subscriber.
    pub fn broadcast(&self, message: &BroadcastMessage) {
        let json = match serde_json::to_string(message) {
            Ok(json) => json,
            Err(err) => {
                tracing::error!(error = %err, "failed to serialize broadcast message");
                return;
            }
        };
        tracing::debug!(
            message_type = message.message_type(),
            subscriber_count = self.tx.receiver_count(),
            "broadcast"
        );
        let _ = self.tx.send(Arc::from(json));
    }

    /// Subscribe to serialized frames. Each subscriber gets an independent
    /// stream; dropping the receiver removes it from the live set.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<str>> {
        self.tx.subscribe()
    }

    /// Number of live subscriber sessions.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SosReport;
    use crate::store::EventStore;

    fn sample_device() -> Device {
        Device {
            id: "dev1".to_string(),
            name: "Unit 1".to_string(),
            phone: String::new(),
            lat: 25.5,
            lng: 91.9,
            sos: true,
            last_seen: 1_700_000_000_000,
        }
    }

    fn sample_event() -> SosEvent {
        SosEvent {
            id: 7,
            device_id: "dev1".to_string(),
            time: 1_700_000_000_000,
            lat: 25.5,
            lng: 91.9,
            resolved: false,
            resolved_at: None,
            resolved_by: None,
        }
    }

    #[test]
    fn test_message_wire_tags() {
        let msg = BroadcastMessage::Sos {
            event: sample_event(),
            device: sample_device(),
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains(r#""type":"sos""#));
        assert!(json.contains(r#""deviceId":"dev1""#));

        let msg = BroadcastMessage::SosResolved {
            event_id: 7,
            event: sample_event(),
            device: sample_device(),
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains(r#""type":"sos_resolved""#));
        assert!(json.contains(r#""eventId":7"#));
    }

    #[test]
    fn test_welcome_roundtrip() {
        let msg = BroadcastMessage::Welcome {
            user: SessionUser::guest(),
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert_eq!(json, r#"{"type":"welcome","user":{"email":"guest"}}"#);
        let back: BroadcastMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn test_client_message_parsing() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"history","deviceId":"dev1"}"#).unwrap();
        assert_eq!(
            msg,
            ClientMessage::History {
                device_id: "dev1".to_string()
            }
        );
        assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"nope"}"#).is_err());
    }

    #[tokio::test]
    async fn test_bus_delivers_to_all_subscribers() {
        let bus = BroadcastBus::new(32);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.broadcast(&BroadcastMessage::Sos {
            event: sample_event(),
            device: sample_device(),
        });

        for rx in [&mut rx1, &mut rx2] {
            let frame = rx.recv().await.unwrap();
            let msg: BroadcastMessage = serde_json::from_str(&frame).unwrap();
            assert_eq!(msg.message_type(), "sos");
        }
    }

    #[tokio::test]
    async fn test_bus_no_subscribers_ok() {
        let bus = BroadcastBus::new(32);
        // Should not panic or error with nobody listening
        bus.broadcast(&BroadcastMessage::Devices { devices: vec![] });
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_bus_subscriber_count_tracks_drops() {
        let bus = BroadcastBus::new(32);
        let rx1 = bus.subscribe();
        let _rx2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);
        drop(rx1);
        assert_eq!(bus.subscriber_count(), 1);
    }

    #[tokio::test]
    async fn test_store_mutation_then_broadcast_frame_parses() {
        // The ingestion path serializes the store output unchanged.
        let store = EventStore::new();
        let bus = BroadcastBus::new(32);
        let mut rx = bus.subscribe();

        let (device, event) = store
            .report_sos(&SosReport::new("dev1", 25.5, 91.9))
            .await
            .unwrap();
        bus.broadcast(&BroadcastMessage::Sos { event, device });

        let frame = rx.recv().await.unwrap();
        let msg: BroadcastMessage = serde_json::from_str(&frame).unwrap();
        match msg {
            BroadcastMessage::Sos { event, device } => {
                assert_eq!(event.device_id, "dev1");
                assert!(device.sos);
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }
}
