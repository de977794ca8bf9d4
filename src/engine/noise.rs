//! Deterministic noise source for the simulated engine

use rand::prelude::*;
use rand::rngs::SmallRng;
use rand_distr::StandardNormal;

/// Seedable random source
///
/// Seed 0 draws from entropy for non-deterministic runs; any other seed
/// reproduces the same sequence.
pub struct NoiseSource {
    rng: SmallRng,
}

impl NoiseSource {
    /// Create a new noise source
    pub fn new(seed: u64) -> Self {
        let rng = if seed == 0 {
            SmallRng::from_entropy()
        } else {
            SmallRng::seed_from_u64(seed)
        };
        Self { rng }
    }

    /// Gaussian sample with the given standard deviation
    #[inline]
    pub fn gaussian(&mut self, stddev: f32) -> f32 {
        if stddev == 0.0 {
            return 0.0;
        }
        let n: f32 = self.rng.sample(StandardNormal);
        n * stddev
    }

    /// True with probability `p`
    #[inline]
    pub fn chance(&mut self, p: f32) -> bool {
        self.rng.gen::<f32>() < p
    }

    /// Uniform pick from `0..n`
    #[inline]
    pub fn pick(&mut self, n: usize) -> usize {
        self.rng.gen_range(0..n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deterministic_seed() {
        let mut noise1 = NoiseSource::new(42);
        let mut noise2 = NoiseSource::new(42);

        for _ in 0..100 {
            assert_eq!(noise1.gaussian(1.0), noise2.gaussian(1.0));
        }
    }

    #[test]
    fn test_zero_stddev() {
        let mut noise = NoiseSource::new(42);
        for _ in 0..10 {
            assert_eq!(noise.gaussian(0.0), 0.0);
        }
    }

    #[test]
    fn test_chance_probability() {
        let mut noise = NoiseSource::new(42);
        let mut count = 0;
        let trials = 10000;

        for _ in 0..trials {
            if noise.chance(0.3) {
                count += 1;
            }
        }

        let ratio = count as f32 / trials as f32;
        assert!((ratio - 0.3).abs() < 0.05); // Within 5% of expected
    }

    #[test]
    fn test_pick_stays_in_bounds() {
        let mut noise = NoiseSource::new(42);
        for _ in 0..1000 {
            assert!(noise.pick(6) < 6);
        }
    }
}
