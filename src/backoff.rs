use crate::constants::{
    DEFAULT_BACKOFF_BASE_MS, DEFAULT_BACKOFF_JITTER, DEFAULT_BACKOFF_MAX_MS,
    DEFAULT_BACKOFF_MULTIPLIER,
};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Exponential backoff with jitter between retry attempts.
///
/// The delay after the `n`th failed attempt (`n >= 1`) is
/// `min(base * multiplier^(n-1), max)`, spread uniformly by `±jitter` of
/// itself and clamped to `[0, max]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffPolicy {
    pub base_delay_ms: u64,
    pub multiplier: f64,
    pub max_delay_ms: u64,
    /// Fraction of the computed delay, in `[0, 1]`.
    pub jitter: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay_ms: DEFAULT_BACKOFF_BASE_MS,
            multiplier: DEFAULT_BACKOFF_MULTIPLIER,
            max_delay_ms: DEFAULT_BACKOFF_MAX_MS,
            jitter: DEFAULT_BACKOFF_JITTER,
        }
    }
}

impl BackoffPolicy {
    /// Policy without randomness, handy for deterministic schedules.
    pub fn fixed(delay_ms: u64) -> Self {
        Self {
            base_delay_ms: delay_ms,
            multiplier: 1.0,
            max_delay_ms: delay_ms,
            jitter: 0.0,
        }
    }

    /// Un-jittered delay in milliseconds after `attempt` failures.
    pub fn base_delay_ms(&self, attempt: u32) -> u64 {
        if attempt == 0 || self.base_delay_ms == 0 {
            return 0;
        }
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let raw = self.base_delay_ms as f64 * self.multiplier.max(1.0).powi(exponent);
        if !raw.is_finite() || raw >= self.max_delay_ms as f64 {
            self.max_delay_ms
        } else {
            raw.round() as u64
        }
    }

    pub fn delay_with(&self, attempt: u32, rng: &mut impl Rng) -> Duration {
        let capped = self.base_delay_ms(attempt);
        let jitter = self.jitter.clamp(0.0, 1.0);
        if capped == 0 || jitter == 0.0 {
            return Duration::from_millis(capped);
        }

        let spread = capped as f64 * jitter;
        let lower = (capped as f64 - spread).max(0.0);
        let upper = (capped as f64 + spread).min(self.max_delay_ms as f64);
        if upper <= lower {
            return Duration::from_millis(lower.round() as u64);
        }
        Duration::from_millis(rng.random_range(lower..=upper).round() as u64)
    }

    /// Jittered delay using the thread-local generator.
    pub fn next_delay(&self, attempt: u32) -> Duration {
        self.delay_with(attempt, &mut rand::rng())
    }

    pub fn validate(&self) -> Result<(), String> {
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(format!(
                "backoff multiplier must be >= 1, got {}",
                self.multiplier
            ));
        }
        if !(0.0..=1.0).contains(&self.jitter) {
            return Err(format!(
                "backoff jitter must be within [0, 1], got {}",
                self.jitter
            ));
        }
        if self.max_delay_ms < self.base_delay_ms {
            return Err(format!(
                "backoff max delay {}ms is below the base delay {}ms",
                self.max_delay_ms, self.base_delay_ms
            ));
        }
        Ok(())
    }
}
