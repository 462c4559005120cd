//! Derived views over the client mirror.
//!
//! These are recomputed on demand from the mirror and are not part of the
//! mirrored state itself.

use std::collections::{HashMap, HashSet};

use beacon_core::{Device, SosEvent, SosRow};

use crate::mirror::ClientMirror;

/// Maximum entries in the recent-activity view.
pub const RECENT_ACTIVITY_CAP: usize = 10;

/// The most recent event per device, most-recently-active device first,
/// capped at [`RECENT_ACTIVITY_CAP`].
pub fn recent_activity(mirror: &ClientMirror) -> Vec<&SosRow> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for row in mirror.events() {
        if seen.insert(row.event.device_id.as_str()) {
            out.push(row);
            if out.len() >= RECENT_ACTIVITY_CAP {
                break;
            }
        }
    }
    out
}

/// Aggregation of a device's repeated alerts beyond its most recent one.
#[derive(Debug)]
pub struct FollowUpGroup<'a> {
    pub device_id: &'a str,
    /// Device as of the device's newest event.
    pub device: &'a Device,
    /// The most recent follow-up in the group.
    pub latest: &'a SosEvent,
    /// Number of follow-up alerts in the group.
    pub count: usize,
}

/// Group repeated alerts per device.
///
/// For each device with more than one event, the events after the newest
/// one form the follow-up pool; the unresolved subset is preferred, falling
/// back to the whole pool when everything is resolved. A lone alert is not
/// a follow-up and produces no group. Groups are ordered by latest
/// follow-up time, newest first.
pub fn follow_up_groups(mirror: &ClientMirror) -> Vec<FollowUpGroup<'_>> {
    let mut order: Vec<&str> = Vec::new();
    let mut by_device: HashMap<&str, Vec<&SosRow>> = HashMap::new();
    for row in mirror.events() {
        let id = row.event.device_id.as_str();
        if !by_device.contains_key(id) {
            order.push(id);
        }
        by_device.entry(id).or_default().push(row);
    }

    let mut groups = Vec::new();
    for device_id in order {
        let rows = &by_device[device_id];
        if rows.len() <= 1 {
            continue;
        }
        let extras = &rows[1..];
        let unresolved: Vec<&SosRow> = extras
            .iter()
            .copied()
            .filter(|r| !r.event.resolved)
            .collect();
        // Rows are newest-first, so the first relevant extra is the latest.
        let (latest, count) = if unresolved.is_empty() {
            (&extras[0].event, extras.len())
        } else {
            (&unresolved[0].event, unresolved.len())
        };
        groups.push(FollowUpGroup {
            device_id,
            device: &rows[0].device,
            latest,
            count,
        });
    }

    groups.sort_by(|a, b| b.latest.time.cmp(&a.latest.time));
    groups
}
