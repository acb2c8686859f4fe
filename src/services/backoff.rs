//! Exponential backoff with jitter.
//!
//! Delay before re-queueing a failed request:
//! `min(base * 2^attempts_made, cap) + jitter`, where jitter is a uniform
//! fraction of the capped delay. The computation is a pure function of the
//! attempt count, the tier's config and an injected jitter sample, so it
//! can be tested without timers.

use rand::Rng;
use std::time::Duration;

use crate::domain::models::BehaviorConfig;

/// Largest jitter as a fraction of the exponential delay.
pub const MAX_JITTER_RATIO: f64 = 0.25;

/// Source of jitter samples in `[0, 1)`.
pub trait JitterSource: Send + Sync {
    fn sample(&self) -> f64;
}

/// Thread-local RNG jitter.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomJitter;

impl JitterSource for RandomJitter {
    fn sample(&self) -> f64 {
        rand::thread_rng().gen_range(0.0..1.0)
    }
}

/// Always returns the same sample.
#[derive(Debug, Clone, Copy)]
pub struct FixedJitter(pub f64);

impl JitterSource for FixedJitter {
    fn sample(&self) -> f64 {
        self.0
    }
}

/// Exponential part of the delay, capped.
pub fn exponential_delay_ms(attempts_made: u32, config: &BehaviorConfig) -> u64 {
    config
        .backoff_base_ms
        .saturating_mul(2_u64.saturating_pow(attempts_made))
        .min(config.backoff_cap_ms)
}

/// Full delay for the given jitter sample (clamped into `[0, 1)`).
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
pub fn backoff_delay(attempts_made: u32, config: &BehaviorConfig, jitter_sample: f64) -> Duration {
    let base = exponential_delay_ms(attempts_made, config);
    let sample = if jitter_sample.is_finite() {
        jitter_sample.clamp(0.0, 1.0)
    } else {
        0.0
    };
    let jitter = (base as f64 * MAX_JITTER_RATIO * sample) as u64;
    Duration::from_millis(base.saturating_add(jitter))
}
