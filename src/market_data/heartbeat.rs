//! Inbound-idle watchdog.
//!
//! Any inbound frame (quote, ping, control, even an undecodable one) counts
//! as liveness. When nothing arrives for `idle_timeout` the connection is
//! considered dead and the connector tears it down.

use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct IdleWatchdog {
    idle_timeout: Duration,
    last_inbound: Instant,
}

impl IdleWatchdog {
    /// Starts the idle window at `now`.
    pub fn new(idle_timeout: Duration, now: Instant) -> Self {
        Self { idle_timeout, last_inbound: now }
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    /// Records inbound traffic at `now`.
    pub fn touch(&mut self, now: Instant) {
        if now > self.last_inbound {
            self.last_inbound = now;
        }
    }

    /// Time left before the connection counts as idle; zero once expired.
    pub fn remaining(&self, now: Instant) -> Duration {
        self.idle_timeout.saturating_sub(now.saturating_duration_since(self.last_inbound))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remaining_counts_down_from_last_inbound() {
        let start = Instant::now();
        let mut dog = IdleWatchdog::new(Duration::from_secs(60), start);
        assert_eq!(dog.remaining(start + Duration::from_secs(15)), Duration::from_secs(45));

        dog.touch(start + Duration::from_secs(30));
        assert_eq!(dog.remaining(start + Duration::from_secs(45)), Duration::from_secs(45));
        assert!(!dog.remaining(start + Duration::from_secs(89)).is_zero());
        assert!(dog.remaining(start + Duration::from_secs(90)).is_zero());
    }

    #[test]
    fn test_touch_never_moves_backwards() {
        let start = Instant::now();
        let mut dog = IdleWatchdog::new(Duration::from_secs(10), start + Duration::from_secs(5));
        dog.touch(start);
        assert_eq!(dog.remaining(start + Duration::from_secs(5)), Duration::from_secs(10));
    }
}
