//! # beacon-client
//!
//! Viewer-side companion to the beacon server: a local mirror of devices
//! and events rebuilt purely from the pushed message stream, derived views
//! for human consumption, and a reconnecting WebSocket feed.

pub mod mirror;
pub mod reconnect;
pub mod session;
pub mod views;

pub use mirror::ClientMirror;
pub use reconnect::{
    ConnectionStatus, ReconnectPolicy, MAX_RECONNECT_ATTEMPTS, RECONNECT_DELAY,
};
pub use session::{FeedClient, FeedConfig, FeedHandle};
pub use views::{follow_up_groups, recent_activity, FollowUpGroup, RECENT_ACTIVITY_CAP};
