//! Authoritative in-memory ledger of devices and SOS events.
//!
//! The store is the single source of truth on the server side. State is
//! volatile by design; there is no persistence across restarts. All
//! mutations run under one writer lock so a device's `sos` recomputation
//! always observes a consistent event set, while snapshot/list readers may
//! run concurrently with each other.

use std::collections::{HashMap, VecDeque};

use tokio::sync::RwLock;

use crate::error::{Error, Result};
use crate::models::{now_ms, Device, SosEvent, SosReport, SosRow};

/// Maximum number of events retained, oldest evicted first.
pub const EVENT_LEDGER_CAP: usize = 500;

/// Default `limit` for list/history queries.
pub const DEFAULT_LIST_LIMIT: usize = 50;

#[derive(Default)]
struct StoreInner {
    devices: HashMap<String, Device>,
    /// Recency-ordered ledger, newest first.
    events: VecDeque<SosEvent>,
    next_event_id: u64,
}

/// In-memory event store. Cheap to share behind an `Arc`.
pub struct EventStore {
    inner: RwLock<StoreInner>,
}

impl Default for EventStore {
    fn default() -> Self {
        Self::new()
    }
}

impl EventStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(StoreInner {
                devices: HashMap::new(),
                events: VecDeque::new(),
                next_event_id: 1,
            }),
        }
    }

    /// Ingest one SOS report.
    ///
    /// Validates that `deviceId` is present and `lat`/`lng` parse to finite
    /// degrees; nothing is mutated on validation failure. Creates the device
    /// on first contact, otherwise updates position, `sos`, last-seen, and
    /// any newly supplied name/phone (omitted fields keep their prior
    /// values). Appends a new event at the head of the ledger and evicts the
    /// oldest entry past [`EVENT_LEDGER_CAP`].
    pub async fn report_sos(&self, report: &SosReport) -> Result<(Device, SosEvent)> {
        let device_id = report
            .device_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| Error::InvalidInput("deviceId, lat and lng required".to_string()))?;
        let (lat, lng) = match (&report.lat, &report.lng) {
            (Some(lat), Some(lng)) => match (lat.as_degrees(), lng.as_degrees()) {
                (Some(lat), Some(lng)) => (lat, lng),
                _ => {
                    return Err(Error::InvalidInput(
                        "lat and lng must be numbers".to_string(),
                    ))
                }
            },
            _ => {
                return Err(Error::InvalidInput(
                    "deviceId, lat and lng required".to_string(),
                ))
            }
        };

        let mut inner = self.inner.write().await;
        let now = now_ms();

        let device = inner
            .devices
            .entry(device_id.to_string())
            .or_insert_with(|| Device {
                id: device_id.to_string(),
                name: report.name.clone().unwrap_or_else(|| device_id.to_string()),
                phone: report.phone.clone().unwrap_or_default(),
                lat,
                lng,
                sos: true,
                last_seen: now,
            });
        device.lat = lat;
        device.lng = lng;
        device.sos = true;
        device.last_seen = now;
        if let Some(name) = &report.name {
            device.name = name.clone();
        }
        if let Some(phone) = &report.phone {
            device.phone = phone.clone();
        }
        let device = device.clone();

        let event = SosEvent {
            id: inner.next_event_id,
            device_id: device_id.to_string(),
            time: now,
            lat,
            lng,
            resolved: false,
            resolved_at: None,
            resolved_by: None,
        };
        inner.next_event_id += 1;
        inner.events.push_front(event.clone());
        if inner.events.len() > EVENT_LEDGER_CAP {
            inner.events.pop_back();
        }

        tracing::info!(device_id = %device.id, event_id = event.id, lat, lng, "SOS received");
        Ok((device, event))
    }

    /// Mark an event resolved, recording timestamp and actor.
    ///
    /// The owning device's `sos` flag is cleared only if no other unresolved
    /// event remains for it.
    pub async fn resolve(&self, event_id: u64, actor: &str) -> Result<(SosEvent, Device)> {
        let mut inner = self.inner.write().await;

        let event = inner
            .events
            .iter_mut()
            .find(|e| e.id == event_id)
            .ok_or(Error::EventNotFound(event_id))?;
        event.resolved = true;
        event.resolved_at = Some(now_ms());
        event.resolved_by = Some(actor.to_string());
        let event = event.clone();

        let still_alerting = inner
            .events
            .iter()
            .any(|e| e.device_id == event.device_id && !e.resolved);
        let device = inner
            .devices
            .get_mut(&event.device_id)
            .ok_or_else(|| Error::DeviceNotFound(event.device_id.clone()))?;
        if !still_alerting {
            device.sos = false;
        }
        let device = device.clone();

        tracing::info!(event_id, actor, "SOS event resolved");
        Ok((event, device))
    }

    /// Reopen a resolved event, discarding its resolution metadata.
    ///
    /// Reopening always implies the device is alerting again, regardless of
    /// its other events.
    pub async fn unresolve(&self, event_id: u64) -> Result<(SosEvent, Device)> {
        let mut inner = self.inner.write().await;

        let event = inner
            .events
            .iter_mut()
            .find(|e| e.id == event_id)
            .ok_or(Error::EventNotFound(event_id))?;
        event.resolved = false;
        event.resolved_at = None;
        event.resolved_by = None;
        let event = event.clone();

        let device = inner
            .devices
            .get_mut(&event.device_id)
            .ok_or_else(|| Error::DeviceNotFound(event.device_id.clone()))?;
        device.sos = true;
        let device = device.clone();

        tracing::info!(event_id, "SOS event reopened");
        Ok((event, device))
    }

    /// The most recent event with its device, if any exist.
    pub async fn latest(&self) -> Option<(SosEvent, Device)> {
        let inner = self.inner.read().await;
        let event = inner.events.front()?.clone();
        let device = inner.devices.get(&event.device_id)?.clone();
        Some((event, device))
    }

    /// Recent events, newest first, optionally filtered by device.
    /// `limit` clamps the result length.
    pub async fn list_recent(&self, device_id: Option<&str>, limit: usize) -> Vec<SosRow> {
        let inner = self.inner.read().await;
        inner
            .events
            .iter()
            .filter(|e| device_id.map_or(true, |id| e.device_id == id))
            .take(limit)
            .filter_map(|event| {
                let device = inner.devices.get(&event.device_id)?.clone();
                Some(SosRow {
                    event: event.clone(),
                    device,
                })
            })
            .collect()
    }

    /// A device's recent events in chronological (oldest-first) order, for
    /// track drawing. The device is `None` when the id is unknown.
    pub async fn history(&self, device_id: &str, limit: usize) -> (Option<Device>, Vec<SosEvent>) {
        let inner = self.inner.read().await;
        let mut events: Vec<SosEvent> = inner
            .events
            .iter()
            .filter(|e| e.device_id == device_id)
            .take(limit)
            .cloned()
            .collect();
        events.reverse();
        (inner.devices.get(device_id).cloned(), events)
    }

    /// Full current device set, used for session bootstrap.
    pub async fn snapshot(&self) -> Vec<Device> {
        let inner = self.inner.read().await;
        inner.devices.values().cloned().collect()
    }

    /// Look up one device by id.
    pub async fn device(&self, device_id: &str) -> Option<Device> {
        let inner = self.inner.read().await;
        inner.devices.get(device_id).cloned()
    }
}
