//! Reconnect delay policy.
//!
//! Exponential growth with a hard cap and optional jitter, so a fleet of
//! clients does not hammer a recovering broker in lockstep.

use std::time::Duration;

use rand::Rng;

/// Tuning for the reconnect delay schedule.
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Ceiling applied to every computed delay
    pub max_delay: Duration,
    /// Growth factor between consecutive attempts
    pub multiplier: f64,
    /// Fraction of the delay randomized in both directions; 0 disables jitter
    pub jitter: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            jitter: 0.1,
        }
    }
}

/// Exponential backoff calculator with jitter
pub struct ExponentialBackoff {
    config: BackoffConfig,
    attempt: u32,
}

impl ExponentialBackoff {
    /// Create a new exponential backoff with default configuration
    pub fn new() -> Self {
        Self::with_config(BackoffConfig::default())
    }

    /// Create a new exponential backoff with custom configuration
    pub fn with_config(config: BackoffConfig) -> Self {
        Self { config, attempt: 0 }
    }

    /// Get the delay for the next attempt
    pub fn next_delay(&mut self) -> Duration {
        // initial * multiplier^attempt, capped at max
        let base = self.config.initial_delay.as_millis() as f64
            * self.config.multiplier.powi(self.attempt as i32);
        let capped = base.min(self.config.max_delay.as_millis() as f64);
        self.attempt = self.attempt.saturating_add(1);

        let delay_ms = if self.config.jitter > 0.0 && capped > 0.0 {
            let jitter_range = capped * self.config.jitter;
            let jitter = rand::rng().random_range(-jitter_range..jitter_range);
            (capped + jitter).max(1.0) as u64
        } else {
            capped.max(1.0) as u64
        };

        Duration::from_millis(delay_ms)
    }

    /// Reset the backoff to initial state
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Get the current attempt number
    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new()
    }
}
