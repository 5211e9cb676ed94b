//! Jittered reconciliation interval
//!
//! Endpoints that share a backend must not reconcile in lockstep, so each
//! delay is drawn uniformly from `base * [1 - f, 1 + f]`.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;

/// Shortest delay ever returned
const MIN_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug)]
pub struct JitteredInterval {
    base: Duration,
    jitter_fraction: f64,
    rng: StdRng,
}

impl JitteredInterval {
    pub fn new(base: Duration, jitter_fraction: f64) -> Self {
        Self::with_rng(base, jitter_fraction, StdRng::from_entropy())
    }

    /// Deterministic sequence, for tests
    pub fn with_seed(base: Duration, jitter_fraction: f64, seed: u64) -> Self {
        Self::with_rng(base, jitter_fraction, StdRng::seed_from_u64(seed))
    }

    fn with_rng(base: Duration, jitter_fraction: f64, rng: StdRng) -> Self {
        Self {
            base,
            jitter_fraction: jitter_fraction.clamp(0.0, 0.99),
            rng,
        }
    }

    pub fn base(&self) -> Duration {
        self.base
    }

    pub fn next_delay(&mut self) -> Duration {
        if self.jitter_fraction == 0.0 {
            return self.base.max(MIN_DELAY);
        }
        let f = self.jitter_fraction;
        let factor = 1.0 + self.rng.gen_range(-f..=f);
        self.base.mul_f64(factor).max(MIN_DELAY)
    }
}
