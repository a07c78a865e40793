//! Reconnection and retry configuration.

use std::time::Duration;

/// Tuning knobs for connection retry and send retry behaviour.
#[derive(Debug, Clone)]
pub struct SockConfig {
    /// First delay after a failed connection attempt or an empty peer set.
    pub initial_backoff: Duration,

    /// Multiplier applied to the delay after every failure.
    pub backoff_multiplier: f64,

    /// Upper bound on the delay.
    pub max_backoff: Duration,

    /// Full cap-length waits tolerated before a round-robin frame waiting
    /// for a live peer is dropped.
    pub max_capped_waits: u32,
}

impl Default for SockConfig {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_millis(100),
            backoff_multiplier: 1.5,
            max_backoff: Duration::from_millis(5000),
            max_capped_waits: 3,
        }
    }
}

/// Exponential backoff state for one retry loop.
#[derive(Debug, Clone)]
pub(crate) struct Backoff {
    initial: Duration,
    multiplier: f64,
    max: Duration,
    current: Duration,
    capped_waits: u32,
}

impl Backoff {
    pub(crate) fn new(config: &SockConfig) -> Self {
        Self {
            initial: config.initial_backoff,
            multiplier: config.backoff_multiplier,
            max: config.max_backoff,
            current: config.initial_backoff,
            capped_waits: 0,
        }
    }

    /// The delay to sleep for this failure.
    ///
    /// Grows by the multiplier up to the cap; waits spent at the cap are
    /// counted until the next [`reset`](Self::reset).
    pub(crate) fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        if delay >= self.max {
            self.capped_waits += 1;
        }
        self.current = self.current.mul_f64(self.multiplier).min(self.max);
        delay
    }

    /// Full cap-length waits taken since the last reset.
    pub(crate) fn capped_waits(&self) -> u32 {
        self.capped_waits
    }

    /// Back to the initial delay, clearing the cap-wait count.
    pub(crate) fn reset(&mut self) {
        self.current = self.initial;
        self.capped_waits = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_grows_to_cap() {
        let config = SockConfig::default();
        let mut backoff = Backoff::new(&config);

        assert_eq!(backoff.next_delay(), Duration::from_millis(100));
        assert_eq!(backoff.next_delay(), Duration::from_millis(150));
        assert_eq!(backoff.next_delay(), Duration::from_millis(225));

        for _ in 0..20 {
            backoff.next_delay();
        }
        assert_eq!(backoff.next_delay(), Duration::from_millis(5000));
    }

    #[test]
    fn test_capped_waits_counted_at_cap_only() {
        let config = SockConfig::default();
        let mut backoff = Backoff::new(&config);

        while backoff.capped_waits() == 0 {
            backoff.next_delay();
        }
        // The first counted wait is the first full cap-length delay.
        assert_eq!(backoff.capped_waits(), 1);

        backoff.next_delay();
        backoff.next_delay();
        assert_eq!(backoff.capped_waits(), 3);
    }

    #[test]
    fn test_reset_restores_initial_delay() {
        let config = SockConfig::default();
        let mut backoff = Backoff::new(&config);

        for _ in 0..15 {
            backoff.next_delay();
        }
        backoff.reset();

        assert_eq!(backoff.next_delay(), Duration::from_millis(100));
        assert_eq!(backoff.capped_waits(), 0);
    }
}
