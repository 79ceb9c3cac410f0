//! Cancellable deadline handles for the framer's timers.

use std::time::Duration;
use tokio::time::Instant;

/// A one-shot timer represented by its deadline.
///
/// The framer never sleeps itself; the driver waits until the earliest
/// armed deadline and then reports the current time back. Re-arming
/// replaces the previous deadline.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Timer {
    deadline: Option<Instant>,
}

impl Timer {
    #[must_use]
    pub const fn new() -> Self {
        Self { deadline: None }
    }

    /// Arm the timer to fire `after` from `now`.
    pub fn arm(&mut self, now: Instant, after: Duration) {
        self.deadline = Some(now + after);
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Disarm and return `true` if the deadline has passed.
    pub fn fire_if_due(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if deadline <= now => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fires_once_at_deadline() {
        let now = Instant::now();
        let mut timer = Timer::new();
        timer.arm(now, Duration::from_secs(5));

        assert!(!timer.fire_if_due(now + Duration::from_secs(4)));
        assert!(timer.fire_if_due(now + Duration::from_secs(5)));
        assert!(!timer.is_armed());
        assert!(!timer.fire_if_due(now + Duration::from_secs(6)));
    }

    #[test]
    fn test_rearm_replaces_deadline() {
        let now = Instant::now();
        let mut timer = Timer::new();
        timer.arm(now, Duration::from_secs(1));
        timer.arm(now, Duration::from_secs(10));

        assert_eq!(timer.deadline(), Some(now + Duration::from_secs(10)));
        assert!(!timer.fire_if_due(now + Duration::from_secs(2)));
    }

    #[test]
    fn test_cancelled_never_fires() {
        let now = Instant::now();
        let mut timer = Timer::new();
        timer.arm(now, Duration::ZERO);
        timer.cancel();
        assert!(!timer.fire_if_due(now + Duration::from_secs(1)));
    }
}
