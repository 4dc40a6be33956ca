//! Deterministic randomness for source discharge and retention offers.
//!
//! The core only sees the [`RandomSource`] trait. [`SimRng`] is the default
//! implementation: SplitMix64, 8 bytes of state, trivially serializable so a
//! harness can snapshot it next to the basin.

/// Uniform and normal draws consumed by the simulation.
pub trait RandomSource {
    /// Uniform draw in `[0, 1)`.
    fn uniform(&mut self) -> f64;

    /// Uniform integer draw in `[lo, hi]` (both inclusive). Returns `lo` if
    /// `hi < lo`.
    fn uniform_int(&mut self, lo: i64, hi: i64) -> i64;

    /// Normal draw with the given mean and standard deviation.
    fn normal(&mut self, mean: f64, stddev: f64) -> f64;

    /// Returns `true` with the given probability.
    ///
    /// - probability <= 0 always returns false
    /// - probability >= 1 always returns true
    fn chance(&mut self, probability: f64) -> bool {
        if probability <= 0.0 {
            return false;
        }
        if probability >= 1.0 {
            return true;
        }
        self.uniform() < probability
    }
}

/// SplitMix64 pseudo-random number generator.
///
/// Deterministic across platforms, so a fixed seed and a fixed network
/// reproduce a run exactly.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SimRng {
    state: u64,
}

impl SimRng {
    /// Create a new RNG with the given seed.
    pub fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    /// Generate the next `u64` in the sequence.
    pub fn next_u64(&mut self) -> u64 {
        self.state = self.state.wrapping_add(0x9E37_79B9_7F4A_7C15);
        let mut z = self.state;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^ (z >> 31)
    }

    /// Get the internal state (for hashing/serialization).
    pub fn state(&self) -> u64 {
        self.state
    }
}

impl RandomSource for SimRng {
    fn uniform(&mut self) -> f64 {
        // 53 high bits -> exactly representable doubles in [0, 1).
        (self.next_u64() >> 11) as f64 * (1.0 / (1u64 << 53) as f64)
    }

    fn uniform_int(&mut self, lo: i64, hi: i64) -> i64 {
        if hi <= lo {
            return lo;
        }
        let span = hi.abs_diff(lo).wrapping_add(1);
        if span == 0 {
            // Full i64 range.
            return self.next_u64() as i64;
        }
        lo.wrapping_add((self.next_u64() % span) as i64)
    }

    fn normal(&mut self, mean: f64, stddev: f64) -> f64 {
        // Box-Muller; the sine half is discarded to keep the state a single u64.
        let u1 = 1.0 - self.uniform();
        let u2 = self.uniform();
        let z = (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos();
        mean + stddev * z
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic() {
        let mut a = SimRng::new(42);
        let mut b = SimRng::new(42);
        for _ in 0..100 {
            assert_eq!(a.next_u64(), b.next_u64());
        }
    }

    #[test]
    fn different_seeds_differ() {
        let mut a = SimRng::new(1);
        let mut b = SimRng::new(2);
        assert_ne!(a.next_u64(), b.next_u64());
    }

    #[test]
    fn uniform_stays_in_unit_interval() {
        let mut rng = SimRng::new(7);
        for _ in 0..10_000 {
            let u = rng.uniform();
            assert!((0.0..1.0).contains(&u), "out of range: {u}");
        }
    }

    #[test]
    fn uniform_int_is_inclusive() {
        let mut rng = SimRng::new(99);
        let mut seen = [false; 3];
        for _ in 0..1_000 {
            let v = rng.uniform_int(-1, 1);
            assert!((-1..=1).contains(&v));
            seen[(v + 1) as usize] = true;
        }
        assert!(seen.iter().all(|s| *s));
    }

    #[test]
    fn uniform_int_degenerate_range() {
        let mut rng = SimRng::new(3);
        assert_eq!(rng.uniform_int(5, 5), 5);
        assert_eq!(rng.uniform_int(5, 2), 5);
    }

    #[test]
    fn chance_bounds() {
        let mut rng = SimRng::new(999);
        for _ in 0..100 {
            assert!(!rng.chance(0.0));
            assert!(!rng.chance(-1.0));
            assert!(rng.chance(1.0));
            assert!(rng.chance(2.0));
        }
    }

    #[test]
    fn normal_moments_roughly_match() {
        let mut rng = SimRng::new(12345);
        let n = 20_000;
        let draws: Vec<f64> = (0..n).map(|_| rng.normal(500.0, 50.0)).collect();
        let mean = draws.iter().sum::<f64>() / n as f64;
        let var = draws.iter().map(|d| (d - mean).powi(2)).sum::<f64>() / n as f64;
        assert!((mean - 500.0).abs() < 2.0, "mean {mean}");
        assert!((var.sqrt() - 50.0).abs() < 2.0, "stddev {}", var.sqrt());
    }

    #[test]
    fn zero_stddev_returns_mean() {
        let mut rng = SimRng::new(5);
        assert_eq!(rng.normal(1200.0, 0.0), 1200.0);
    }

    #[test]
    fn serialization_round_trip() {
        let mut rng = SimRng::new(42);
        for _ in 0..50 {
            rng.next_u64();
        }

        let json = serde_json::to_string(&rng).unwrap();
        let mut restored: SimRng = serde_json::from_str(&json).unwrap();
        assert_eq!(rng, restored);
        for _ in 0..10 {
            assert_eq!(rng.next_u64(), restored.next_u64());
        }
    }
}
