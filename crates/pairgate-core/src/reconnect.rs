// ── Reconnect delay policy ──
//
// By default the delay between a drop and the next attempt is fixed.
// Setting `max_delay` above `initial_delay` turns consecutive
// failures into exponential backoff, capped at `max_delay`.

use std::time::Duration;

/// Backoff configuration for autonomous reconnects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Delay before the first reconnection attempt. Default: 5s.
    pub initial_delay: Duration,

    /// Upper bound on the delay. Default: 5s (no growth).
    pub max_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl ReconnectPolicy {
    /// `delay = min(initial * 2^attempt, max)`, never below `initial`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2_u32.saturating_pow(attempt.min(16));
        let grown = self.initial_delay.saturating_mul(factor);
        grown.min(self.max_delay.max(self.initial_delay))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_is_fixed() {
        let policy = ReconnectPolicy::default();
        for attempt in [0, 1, 5, 40] {
            assert_eq!(policy.delay_for(attempt), Duration::from_secs(5));
        }
    }

    #[test]
    fn backoff_doubles_until_capped() {
        let policy = ReconnectPolicy {
            initial_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(60),
        };
        assert_eq!(policy.delay_for(0), Duration::from_secs(5));
        assert_eq!(policy.delay_for(1), Duration::from_secs(10));
        assert_eq!(policy.delay_for(2), Duration::from_secs(20));
        assert_eq!(policy.delay_for(3), Duration::from_secs(40));
        assert_eq!(policy.delay_for(4), Duration::from_secs(60));
        assert_eq!(policy.delay_for(u32::MAX), Duration::from_secs(60));
    }

    #[test]
    fn max_below_initial_keeps_initial() {
        let policy = ReconnectPolicy {
            initial_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(1),
        };
        assert_eq!(policy.delay_for(3), Duration::from_secs(5));
    }
}
