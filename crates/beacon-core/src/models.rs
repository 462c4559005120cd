//! Domain model for the beacon alert service.
//!
//! Wire names are camelCase to match the viewer protocol (`deviceId`,
//! `lastSeen`, `resolvedAt`). Timestamps are wall-clock milliseconds since
//! the Unix epoch.

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Current time in milliseconds since the Unix epoch.
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// A field unit identified by a stable opaque id, tracked for position and
/// alert status.
///
/// Devices are created on the first report referencing an unknown id and are
/// never deleted. `sos` is true while at least one of the device's events is
/// unresolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub id: String,
    pub name: String,
    pub phone: String,
    /// WGS84 degrees.
    pub lat: f64,
    pub lng: f64,
    /// True iff the device has at least one unresolved event.
    pub sos: bool,
    /// Milliseconds since epoch of the last inbound report.
    pub last_seen: i64,
}

/// One discrete SOS report instance.
///
/// Event ids are allocated in strictly increasing order for the process
/// lifetime. Resolution metadata is present iff `resolved` is true.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SosEvent {
    pub id: u64,
    pub device_id: String,
    /// Creation time, milliseconds since epoch.
    pub time: i64,
    pub lat: f64,
    pub lng: f64,
    pub resolved: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_by: Option<String>,
}

/// A coordinate as submitted by a field device: either a JSON number or a
/// numeric string (older firmware sends strings).
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum CoordInput {
    Number(f64),
    Text(String),
}

impl CoordInput {
    /// Parse to finite WGS84 degrees. Returns `None` for non-numeric text,
    /// NaN, and infinities.
    pub fn as_degrees(&self) -> Option<f64> {
        let value = match self {
            CoordInput::Number(n) => *n,
            CoordInput::Text(s) => s.trim().parse::<f64>().ok()?,
        };
        value.is_finite().then_some(value)
    }
}

impl From<f64> for CoordInput {
    fn from(value: f64) -> Self {
        CoordInput::Number(value)
    }
}

/// Inbound SOS report body.
///
/// All fields are optional at the wire level; [`crate::EventStore::report_sos`]
/// validates presence of `deviceId` and numeric `lat`/`lng`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SosReport {
    #[serde(default)]
    pub device_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub lat: Option<CoordInput>,
    #[serde(default)]
    pub lng: Option<CoordInput>,
}

impl SosReport {
    /// Convenience constructor for the common device/position case.
    pub fn new(device_id: impl Into<String>, lat: f64, lng: f64) -> Self {
        Self {
            device_id: Some(device_id.into()),
            lat: Some(lat.into()),
            lng: Some(lng.into()),
            ..Self::default()
        }
    }
}

/// One ledger row: an event paired with its owning device as of the query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SosRow {
    pub event: SosEvent,
    pub device: Device,
}

/// A single point of a device position track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackPoint {
    pub lat: f64,
    pub lng: f64,
    pub time: i64,
}

/// Resolved identity of a subscriber session or mutation actor.
///
/// Unauthenticated viewers get the guest identity rather than a rejection;
/// mutation endpoints require a verified (non-guest) identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionUser {
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl SessionUser {
    /// Read-only guest identity for sessions with no (valid) token.
    pub fn guest() -> Self {
        Self {
            email: "guest".to_string(),
            name: None,
        }
    }

    pub fn is_guest(&self) -> bool {
        self.email == "guest"
    }
}
