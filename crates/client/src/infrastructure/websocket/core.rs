//! Runtime-agnostic reconnection backoff.
//!
//! The connection manager owns the socket; this module only does the delay
//! math so it can be tested without a runtime.

use std::time::Duration;

use rand::Rng;

pub const INITIAL_RETRY_DELAY_MS: u64 = 1_000;
pub const MAX_RETRY_DELAY_MS: u64 = 30_000;
pub const MAX_RETRY_ATTEMPTS: u32 = 10;
pub const BACKOFF_MULTIPLIER: f64 = 2.0;
pub const JITTER_FACTOR: f64 = 0.2;

/// Configuration for reconnect behavior
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectConfig {
    /// Delay before the first reconnect attempt
    pub initial_delay: Duration,
    /// Cap on exponential growth; jittered delays never exceed it
    pub max_delay: Duration,
    /// Consecutive failed attempts before giving up (state `Failed`)
    pub max_attempts: u32,
    pub multiplier: f64,
    /// Jitter factor (0.0-1.0) for randomizing delays to prevent thundering herd
    pub jitter_factor: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(INITIAL_RETRY_DELAY_MS),
            max_delay: Duration::from_millis(MAX_RETRY_DELAY_MS),
            max_attempts: MAX_RETRY_ATTEMPTS,
            multiplier: BACKOFF_MULTIPLIER,
            jitter_factor: JITTER_FACTOR,
        }
    }
}

/// Exponential backoff state shared by reconnect logic.
#[derive(Debug, Clone)]
pub struct BackoffState {
    config: ReconnectConfig,
    attempts: u32,
    delay_ms: u64,
}

impl BackoffState {
    pub fn new(config: ReconnectConfig) -> Self {
        let delay_ms = config.initial_delay.as_millis() as u64;
        Self {
            config,
            attempts: 0,
            delay_ms,
        }
    }

    /// Back to the initial delay; called once a connection is established.
    pub fn reset(&mut self) {
        self.attempts = 0;
        self.delay_ms = self.config.initial_delay.as_millis() as u64;
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn max_attempts(&self) -> u32 {
        self.config.max_attempts
    }

    pub fn is_exhausted(&self) -> bool {
        self.attempts >= self.config.max_attempts
    }

    /// Advance to the next attempt, updating the delay for the subsequent attempt.
    ///
    /// Returns the jittered delay to wait *before* performing this attempt, or
    /// `None` once the attempt budget is spent.
    pub fn next_delay_and_advance(&mut self) -> Option<Duration> {
        if self.is_exhausted() {
            return None;
        }

        let max_ms = self.config.max_delay.as_millis() as u64;
        let current = self.delay_ms.min(max_ms);
        self.attempts += 1;
        self.delay_ms = ((self.delay_ms as f64) * self.config.multiplier).min(max_ms as f64) as u64;

        Some(Duration::from_millis(self.jittered(current, max_ms)))
    }

    fn jittered(&self, delay_ms: u64, max_ms: u64) -> u64 {
        // ±jitter_factor around the delay, still capped
        let jitter_range = (delay_ms as f64 * self.config.jitter_factor) as i64;
        if jitter_range > 0 {
            let jitter = rand::thread_rng().gen_range(-jitter_range..=jitter_range);
            ((delay_ms as i64 + jitter).max(0) as u64).min(max_ms)
        } else {
            delay_ms
        }
    }
}
