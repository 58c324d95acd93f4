//! Injectable random source.
//!
//! Every constructor and simulation call that needs randomness takes a
//! `&mut dyn RandomSource`. There is no process-wide generator: two runs
//! seeded the same way consume the same stream and produce the same models.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use bn_config::RandomConfig;

/// The three draws the engine needs.
pub trait RandomSource {
    /// Uniform integer in `[0, bound)`.
    ///
    /// # Panics
    ///
    /// Panics if `bound` is zero.
    fn next_int(&mut self, bound: usize) -> usize;

    /// Uniform double in `[0, 1)`.
    fn next_double(&mut self) -> f64;

    /// Normal draw with the given mean and standard deviation.
    fn next_gaussian(&mut self, mean: f64, sd: f64) -> f64;
}

/// `StdRng`-backed source, optionally seeded.
#[derive(Debug, Clone)]
pub struct SeededRandom {
    rng: StdRng,
    seed: Option<u64>,
    spare_normal: Option<f64>,
}

impl SeededRandom {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            seed: Some(seed),
            spare_normal: None,
        }
    }

    /// Seeded from the operating system; not reproducible.
    pub fn from_os() -> Self {
        Self {
            rng: StdRng::from_os_rng(),
            seed: None,
            spare_normal: None,
        }
    }

    pub fn from_config(config: &RandomConfig) -> Self {
        match config.seed {
            Some(seed) => Self::new(seed),
            None => Self::from_os(),
        }
    }

    pub fn seed(&self) -> Option<u64> {
        self.seed
    }
}

impl RandomSource for SeededRandom {
    fn next_int(&mut self, bound: usize) -> usize {
        assert!(bound > 0, "next_int bound must be positive");
        self.rng.random_range(0..bound)
    }

    fn next_double(&mut self) -> f64 {
        self.rng.random::<f64>()
    }

    fn next_gaussian(&mut self, mean: f64, sd: f64) -> f64 {
        if let Some(z) = self.spare_normal.take() {
            return mean + sd * z;
        }
        // Marsaglia polar method; keeps the second variate for the next call.
        loop {
            let u = 2.0 * self.next_double() - 1.0;
            let v = 2.0 * self.next_double() - 1.0;
            let s = u * u + v * v;
            if s > 0.0 && s < 1.0 {
                let factor = (-2.0 * s.ln() / s).sqrt();
                self.spare_normal = Some(v * factor);
                return mean + sd * u * factor;
            }
        }
    }
}

/// Uniform integer in the inclusive range `[low, high]`.
pub(crate) fn next_in_range(rng: &mut dyn RandomSource, low: usize, high: usize) -> usize {
    low + rng.next_int(high - low + 1)
}
