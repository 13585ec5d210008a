//! Exponential backoff for delivery retries.
//!
//! Formula: `min(base * multiplier^attempt, max) + jitter`
//! where jitter spreads retries so a burst of failures does not retry in
//! lock-step.

use std::time::Duration;

/// Configuration for exponential backoff between delivery attempts.
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Initial backoff in seconds.
    pub base_secs: u64,
    /// Maximum backoff cap in seconds.
    pub max_secs: u64,
    /// Exponential growth multiplier per attempt.
    pub multiplier: f64,
    /// Jitter as a fraction of the computed backoff (0.0–1.0).
    pub jitter_fraction: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_secs: 30,
            max_secs: 3600,
            multiplier: 2.0,
            jitter_fraction: 0.25,
        }
    }
}

/// Calculate the delay before retry number `attempt` (0-indexed).
///
/// Returns `min(base * multiplier^attempt, max)` plus a deterministic
/// pseudo-random jitter — always non-negative.
pub fn next_backoff(attempt: u32, config: &BackoffConfig) -> Duration {
    let base = config.base_secs as f64;
    let raw = base * config.multiplier.powi(attempt as i32);
    let capped = raw.min(config.max_secs as f64);

    // Deterministic pseudo-jitter derived from attempt (avoids a rand dep).
    let jitter_range = capped * config.jitter_fraction;
    let jitter = pseudo_rand(attempt) * jitter_range;
    let with_jitter = (capped + jitter).max(0.0);

    Duration::from_secs(with_jitter as u64)
}

/// Produce a float in [-0.5, 0.5) using a simple LCG seeded by `attempt`.
fn pseudo_rand(attempt: u32) -> f64 {
    // LCG parameters (Numerical Recipes)
    const A: u64 = 1_664_525;
    const C: u64 = 1_013_904_223;
    const M: u64 = 1u64 << 32;
    let state = A.wrapping_mul(attempt as u64).wrapping_add(C) % M;
    (state as f64 / M as f64) - 0.5
}
