//! Reconnect backoff
//!
//! Exponential growth by [`MULTIPLIER`] up to a ceiling, with ±[`JITTER`]
//! applied to each returned delay. The unjittered value is kept as the base
//! for the next step, so jitter never compounds.

use crate::settings::ClientSettings;
use rand::Rng;
use std::time::Duration;

/// Growth factor between consecutive delays
pub const MULTIPLIER: f64 = 1.6;
/// Symmetric jitter as a fraction of the base delay
pub const JITTER: f64 = 0.2;

/// Largest delay ever computed, in seconds (i64::MAX 100ns ticks)
const MAX_DELAY_SECS: f64 = (i64::MAX / 10_000_000) as f64;

/// Delay sequence for one reconnection attempt sequence
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    initial: Duration,
    max: Duration,
    current: Option<Duration>,
}

impl BackoffPolicy {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max: max.max(initial),
            current: None,
        }
    }

    /// Next delay to wait before reconnecting
    pub fn next_backoff(&mut self) -> Duration {
        let base = match self.current {
            None => clamp_secs(self.initial.as_secs_f64()),
            Some(current) => {
                let grown = clamp_secs(current.as_secs_f64() * MULTIPLIER);
                grown.min(clamp_secs(self.max.as_secs_f64()))
            }
        };
        let base = Duration::from_secs_f64(base);
        self.current = Some(base);
        apply_jitter(base)
    }

    /// Unjittered base of the last returned delay
    pub fn current(&self) -> Option<Duration> {
        self.current
    }

    /// Start over from the initial delay
    pub fn reset(&mut self) {
        self.current = None;
    }
}

impl Iterator for BackoffPolicy {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        Some(self.next_backoff())
    }
}

fn clamp_secs(secs: f64) -> f64 {
    if secs.is_nan() || secs <= 0.0 {
        0.0
    } else {
        secs.min(MAX_DELAY_SECS)
    }
}

fn apply_jitter(base: Duration) -> Duration {
    let secs = base.as_secs_f64();
    let offset = rand::thread_rng().gen_range(-1.0..=1.0) * JITTER * secs;
    Duration::from_secs_f64((secs + offset).max(0.0))
}

/// Produces independent [`BackoffPolicy`] instances
#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicyFactory {
    initial: Duration,
    max: Duration,
}

impl BackoffPolicyFactory {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self { initial, max }
    }

    pub fn from_settings(settings: &ClientSettings) -> Self {
        Self::new(settings.initial_backoff, settings.max_backoff)
    }

    pub fn create(&self) -> BackoffPolicy {
        BackoffPolicy::new(self.initial, self.max)
    }
}
