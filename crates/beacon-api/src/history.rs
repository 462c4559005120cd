//! Synthetic position history.
//!
//! Field devices only report positions alongside SOS events, so ad-hoc
//! history queries are answered with a generated walk around the device's
//! current location: 31 points, one minute apart, newest first, with the
//! wander radius shrinking toward the oldest point.

use beacon_core::models::now_ms;
use beacon_core::TrackPoint;
use rand::Rng;

/// Points per generated track.
pub const TRACK_POINTS: usize = 31;

/// Generate a synthetic track around `(lat, lng)`.
pub fn synthetic_track(lat: f64, lng: f64) -> Vec<TrackPoint> {
    let mut rng = rand::thread_rng();
    let now = now_ms();
    (0..=30i64)
        .rev()
        .map(|i| {
            let spread = i as f64 / 30.0;
            TrackPoint {
                lat: lat + (rng.gen::<f64>() - 0.5) / 100.0 * spread,
                lng: lng + (rng.gen::<f64>() - 0.5) / 100.0 * spread,
                time: now - (30 - i) * 60_000,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_track_shape() {
        let points = synthetic_track(25.5788, 91.8933);
        assert_eq!(points.len(), TRACK_POINTS);

        // Newest first, one minute apart.
        for pair in points.windows(2) {
            assert_eq!(pair[0].time - pair[1].time, 60_000);
        }

        // Every point stays within the wander radius of the base position.
        for p in &points {
            assert!((p.lat - 25.5788).abs() <= 0.005);
            assert!((p.lng - 91.8933).abs() <= 0.005);
        }
    }
}
