//! Reconnection Policy with Exponential Backoff and Additive Jitter

use std::time::Duration;

use rand::Rng;

use crate::config::ReconnectSettings;

/// Reconnection policy with exponential backoff and additive jitter.
///
/// The delay grows `initial_delay * multiplier^attempt`, capped at
/// `max_delay`; a random `0..=jitter` slice rides on top of the capped
/// value so venues failing together do not retry in lockstep.
#[derive(Debug)]
pub struct ReconnectPolicy {
    /// Delay before the first attempt.
    initial_delay: Duration,
    /// Multiplicative growth per attempt.
    multiplier: f64,
    /// Upper bound of the additive jitter.
    jitter: Duration,
    /// Hard cap on the exponential term.
    max_delay: Duration,
    /// Attempts before giving up for good.
    max_attempts: u32,
    /// Current attempt count.
    current_attempt: u32,
}

impl ReconnectPolicy {
    /// Create a policy from settings.
    #[must_use]
    pub const fn new(settings: &ReconnectSettings) -> Self {
        Self {
            initial_delay: settings.initial_delay,
            multiplier: settings.multiplier,
            jitter: settings.jitter,
            max_delay: settings.max_delay,
            max_attempts: settings.max_attempts,
            current_attempt: 0,
        }
    }

    /// Calculate the next backoff duration.
    ///
    /// Returns `None` once max attempts are exhausted; the caller must
    /// treat that as a permanent failure and stop retrying.
    #[must_use]
    pub fn next_backoff(&mut self) -> Option<Duration> {
        if self.current_attempt >= self.max_attempts {
            return None;
        }

        let base_ms = self.initial_delay.as_millis() as f64;
        let exponential = base_ms
            * self
                .multiplier
                .powi(i32::try_from(self.current_attempt).unwrap_or(i32::MAX));
        let capped = exponential.min(self.max_delay.as_millis() as f64);

        let jitter_ms = self.jitter.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            0
        } else {
            rand::rng().random_range(0..=jitter_ms)
        };

        self.current_attempt += 1;

        Some(Duration::from_millis(capped as u64 + jitter))
    }

    /// Reset after a successful reconnect.
    pub const fn reset(&mut self) {
        self.current_attempt = 0;
    }

    /// Current attempt count.
    #[must_use]
    pub const fn current_attempt(&self) -> u32 {
        self.current_attempt
    }

    /// Maximum attempts allowed.
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new(&ReconnectSettings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(
        initial_ms: u64,
        multiplier: f64,
        jitter_ms: u64,
        max_secs: u64,
        max_attempts: u32,
    ) -> ReconnectSettings {
        ReconnectSettings {
            initial_delay: Duration::from_millis(initial_ms),
            multiplier,
            jitter: Duration::from_millis(jitter_ms),
            max_delay: Duration::from_secs(max_secs),
            max_attempts,
        }
    }

    #[test]
    fn defaults_allow_eight_attempts() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.current_attempt(), 0);
        assert_eq!(policy.max_attempts(), 8);
    }

    #[test]
    fn backoff_grows_exponentially_within_jitter_bound() {
        let mut policy = ReconnectPolicy::new(&settings(100, 2.0, 50, 10, 5));

        let first = policy.next_backoff().unwrap();
        assert!(first >= Duration::from_millis(100));
        assert!(first <= Duration::from_millis(150));

        let second = policy.next_backoff().unwrap();
        assert!(second >= Duration::from_millis(200));
        assert!(second <= Duration::from_millis(250));

        let third = policy.next_backoff().unwrap();
        assert!(third >= Duration::from_millis(400));
        assert!(third <= Duration::from_millis(450));

        assert_eq!(policy.current_attempt(), 3);
    }

    #[test]
    fn exponential_term_is_capped() {
        let mut policy = ReconnectPolicy::new(&settings(1_000, 10.0, 0, 5, 10));

        for _ in 0..6 {
            let backoff = policy.next_backoff().unwrap();
            assert!(backoff <= Duration::from_secs(5));
        }
    }

    #[test]
    fn zero_jitter_is_deterministic() {
        let mut policy = ReconnectPolicy::new(&settings(250, 2.0, 0, 60, 4));
        assert_eq!(policy.next_backoff(), Some(Duration::from_millis(250)));
        assert_eq!(policy.next_backoff(), Some(Duration::from_millis(500)));
        assert_eq!(policy.next_backoff(), Some(Duration::from_millis(1_000)));
    }

    #[test]
    fn exhausted_policy_stops_for_good() {
        let mut policy = ReconnectPolicy::new(&settings(100, 2.0, 0, 1, 3));

        assert!(policy.next_backoff().is_some());
        assert!(policy.next_backoff().is_some());
        assert!(policy.next_backoff().is_some());
        assert!(policy.next_backoff().is_none());
        assert!(policy.next_backoff().is_none());
    }

    #[test]
    fn reset_restores_the_schedule() {
        let mut policy = ReconnectPolicy::new(&settings(100, 2.0, 0, 1, 3));

        let _ = policy.next_backoff();
        let _ = policy.next_backoff();
        assert_eq!(policy.current_attempt(), 2);

        policy.reset();
        assert_eq!(policy.current_attempt(), 0);
        assert_eq!(policy.next_backoff(), Some(Duration::from_millis(100)));
    }
}
