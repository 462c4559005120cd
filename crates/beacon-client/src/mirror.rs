//! Local mirror of the server's devices and events.
//!
//! The mirror is rebuilt and patched only from broadcast messages, never
//! inferred independently. Messages must be applied in arrival order; the
//! server emits to each session over one ordered transport, so arrival
//! order matches emission order.

use std::collections::HashMap;

use beacon_core::{BroadcastMessage, Device, SessionUser, SosRow};

/// Mirror of server state for one subscriber session.
///
/// Devices are monotonic for the session lifetime: snapshots and deltas
/// replace or insert entries, never delete them. Events are kept in the
/// most-recent-first order the server transmits them.
#[derive(Debug, Default)]
pub struct ClientMirror {
    devices: HashMap<String, Device>,
    events: Vec<SosRow>,
    session_user: Option<SessionUser>,
}

impl ClientMirror {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one message from the session stream.
    pub fn apply(&mut self, message: BroadcastMessage) {
        match message {
            BroadcastMessage::Welcome { user } => {
                self.session_user = Some(user);
            }
            BroadcastMessage::Devices { devices } => {
                for device in devices {
                    self.devices.insert(device.id.clone(), device);
                }
            }
            BroadcastMessage::Sos { event, device } => {
                self.devices.insert(device.id.clone(), device.clone());
                self.events.insert(0, SosRow { event, device });
            }
            BroadcastMessage::SosResolved {
                event_id,
                event,
                device,
            }
            | BroadcastMessage::SosUnresolved {
                event_id,
                event,
                device,
            } => {
                // Replace the event in place; its position in the recency
                // order does not change.
                if let Some(row) = self.events.iter_mut().find(|r| r.event.id == event_id) {
                    row.event = event;
                    row.device = device.clone();
                }
                self.devices.insert(device.id.clone(), device);
            }
            BroadcastMessage::History { device_id, .. } => {
                // Presentation-only payload; nothing to merge.
                tracing::debug!(device_id = %device_id, "history reply received");
            }
            BroadcastMessage::Error { error } => {
                tracing::debug!(error = %error, "session error notification");
            }
        }
    }

    /// Identity echoed by the server's welcome, once seen.
    pub fn session_user(&self) -> Option<&SessionUser> {
        self.session_user.as_ref()
    }

    pub fn device(&self, id: &str) -> Option<&Device> {
        self.devices.get(id)
    }

    pub fn devices(&self) -> impl Iterator<Item = &Device> {
        self.devices.values()
    }

    /// Event rows, most recent first.
    pub fn events(&self) -> &[SosRow] {
        &self.events
    }
}
