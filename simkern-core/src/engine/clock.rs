//! Simulated clock and seeded random numbers.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Logical simulation clock, in seconds since the engine was created.
///
/// Time only moves forward and only inside the run loop.
#[derive(Debug, Clone, Default)]
pub(crate) struct SimClock {
    now: f64,
}

impl SimClock {
    pub fn now(&self) -> f64 {
        self.now
    }

    /// Moves the clock forward by `delta` seconds.
    pub fn advance(&mut self, delta: f64) {
        if delta > 0.0 {
            self.now += delta;
        }
    }

    pub fn reset(&mut self) {
        self.now = 0.0;
    }
}

/// Deterministic random number generator reachable from actors.
///
/// Uses ChaCha8 so that a given `simulation/seed` always yields the same run.
#[derive(Debug)]
pub(crate) struct DeterministicRng {
    rng: ChaCha8Rng,
    seed: u64,
}

impl DeterministicRng {
    pub fn from_seed(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            seed,
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Random number in `[0, 1)`.
    pub fn random_f64(&mut self) -> f64 {
        self.rng.random::<f64>()
    }

    /// Random number in `[min, max)`; `min` when the range is empty.
    pub fn random_range(&mut self, min: u64, max: u64) -> u64 {
        if min >= max {
            return min;
        }
        self.rng.random_range(min..max)
    }
}
