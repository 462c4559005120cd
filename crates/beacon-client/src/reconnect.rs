//! Reconnection policy for the viewer feed.
//!
//! One reconnect attempt is scheduled after a fixed delay on unexpected
//! closure; after a fixed cap of consecutive failures the feed stops
//! retrying and reports a terminal disconnected status. A successful
//! connection resets the counter.

use std::time::Duration;

/// Fixed delay before each reconnect attempt.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Consecutive failed attempts tolerated before giving up.
pub const MAX_RECONNECT_ATTEMPTS: u32 = 10;

/// Connection state of the feed, observable by the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
}

/// Tracks consecutive failures and gates reconnect scheduling.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    delay: Duration,
    max_attempts: u32,
    failed_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new(RECONNECT_DELAY, MAX_RECONNECT_ATTEMPTS)
    }
}

impl ReconnectPolicy {
    pub fn new(delay: Duration, max_attempts: u32) -> Self {
        Self {
            delay,
            max_attempts,
            failed_attempts: 0,
        }
    }

    /// Record a successful connection, resetting the failure counter.
    pub fn connected(&mut self) {
        self.failed_attempts = 0;
    }

    /// Record a lost or failed connection. Returns the delay before the
    /// next attempt, or `None` once retries are exhausted.
    pub fn next_attempt(&mut self) -> Option<Duration> {
        if self.failed_attempts >= self.max_attempts {
            return None;
        }
        self.failed_attempts += 1;
        Some(self.delay)
    }

    pub fn attempts(&self) -> u32 {
        self.failed_attempts
    }

    pub fn exhausted(&self) -> bool {
        self.failed_attempts >= self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stops_after_cap() {
        let mut policy = ReconnectPolicy::new(Duration::from_millis(1), 10);
        for attempt in 1..=10 {
            assert_eq!(policy.next_attempt(), Some(Duration::from_millis(1)));
            assert_eq!(policy.attempts(), attempt);
        }
        // No 11th attempt is scheduled.
        assert_eq!(policy.next_attempt(), None);
        assert!(policy.exhausted());
    }

    #[test]
    fn test_success_resets_counter() {
        let mut policy = ReconnectPolicy::new(Duration::from_millis(1), 3);
        assert!(policy.next_attempt().is_some());
        assert!(policy.next_attempt().is_some());
        policy.connected();
        assert_eq!(policy.attempts(), 0);
        assert!(!policy.exhausted());
        assert!(policy.next_attempt().is_some());
    }

    #[test]
    fn test_default_matches_reference_behavior() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.attempts(), 0);
        let mut policy = policy;
        assert_eq!(policy.next_attempt(), Some(RECONNECT_DELAY));
    }
}
