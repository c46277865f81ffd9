//! Exponential backoff with jitter between feed reconnection attempts.

use std::time::Duration;

use rand::Rng;

/// Backoff settings for the liquidation ingestor.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectConfig {
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Ceiling for the growing delay.
    pub max_delay: Duration,
    /// Growth factor applied after every attempt.
    pub multiplier: f64,
    /// Random spread as a fraction of the delay (0.1 = ±10%).
    pub jitter_factor: f64,
    /// Attempts allowed before giving up; 0 retries forever.
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(64),
            multiplier: 2.0,
            jitter_factor: 0.1,
            max_attempts: 0,
        }
    }
}

/// Tracks the delay sequence for consecutive failed attempts.
///
/// ```
/// use std::time::Duration;
/// use xvenue::streaming::reconnect::{ReconnectConfig, ReconnectPolicy};
///
/// let mut policy = ReconnectPolicy::new(ReconnectConfig {
///     jitter_factor: 0.0,
///     ..Default::default()
/// });
/// assert_eq!(policy.next_delay(), Some(Duration::from_secs(1)));
/// assert_eq!(policy.next_delay(), Some(Duration::from_secs(2)));
/// policy.reset();
/// assert_eq!(policy.next_delay(), Some(Duration::from_secs(1)));
/// ```
#[derive(Debug)]
pub struct ReconnectPolicy {
    config: ReconnectConfig,
    current_delay: Duration,
    attempts: u32,
}

impl ReconnectPolicy {
    pub fn new(config: ReconnectConfig) -> Self {
        let current_delay = config.initial_delay;
        Self {
            config,
            current_delay,
            attempts: 0,
        }
    }

    /// Delay before the next attempt, or None once the budget is spent.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if !self.should_retry() {
            return None;
        }
        self.attempts += 1;

        let delay = self.jittered(self.current_delay);
        // Cap in f64 before converting: Duration panics above u64::MAX seconds
        let cap = self.config.max_delay.as_secs_f64();
        let grown = (self.current_delay.as_secs_f64() * self.config.multiplier).min(cap);
        self.current_delay = if grown.is_finite() && grown > 0.0 {
            Duration::from_secs_f64(grown)
        } else {
            self.config.max_delay
        };

        Some(delay)
    }

    /// Back to the initial delay after a healthy connection.
    pub fn reset(&mut self) {
        self.current_delay = self.config.initial_delay;
        self.attempts = 0;
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn should_retry(&self) -> bool {
        self.config.max_attempts == 0 || self.attempts < self.config.max_attempts
    }

    fn jittered(&self, delay: Duration) -> Duration {
        if self.config.jitter_factor.is_nan() || self.config.jitter_factor <= 0.0 {
            return delay;
        }
        let base = delay.as_secs_f64();
        let spread = base * self.config.jitter_factor.min(1.0);
        let offset = rand::rng().random_range(-spread..=spread);
        Duration::from_secs_f64((base + offset).max(0.001))
    }
}
