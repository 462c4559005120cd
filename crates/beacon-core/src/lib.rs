//! # beacon-core
//!
//! Core types and state for the beacon distress-alert service.
//!
//! This crate provides the domain model (devices and SOS events), the
//! authoritative in-memory event store, the broadcast bus that fans state
//! changes out to subscriber sessions, and the demo auth collaborator.

pub mod auth;
pub mod error;
pub mod events;
pub mod models;
pub mod store;

// Re-export commonly used types at crate root
pub use auth::{Claims, TokenAuthority, DEMO_EMAIL, DEMO_NAME, DEMO_PASSWORD};
pub use error::{Error, Result};
pub use events::{BroadcastBus, BroadcastMessage, ClientMessage};
pub use models::{CoordInput, Device, SessionUser, SosEvent, SosReport, SosRow, TrackPoint};
pub use store::{EventStore, DEFAULT_LIST_LIMIT, EVENT_LEDGER_CAP};
