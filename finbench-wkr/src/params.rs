//! Workload sizing per device preset.

use finbench_common::Preset;
use serde::{Deserialize, Serialize};

/// Input sizes for every workload kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadParams {
    /// Upper bound of the prime sieve.
    pub prime_range: usize,
    /// Inclusive range of Fibonacci indices.
    pub fibonacci_range: (u32, u32),
    /// Side of the square matrices.
    pub matrix_size: usize,
    pub hash_data_mb: usize,
    pub string_count: usize,
    /// Image width and height in pixels.
    pub ray_resolution: (usize, usize),
    pub ray_depth: u32,
    pub compression_data_mb: usize,
    pub monte_carlo_samples: u64,
    pub json_data_mb: usize,
    /// Board side for N-Queens.
    pub nqueens_size: usize,
}

impl WorkloadParams {
    pub fn for_preset(preset: Preset) -> Self {
        match preset {
            Preset::Slow => Self {
                prime_range: 1_000_000,
                fibonacci_range: (30, 38),
                matrix_size: 500,
                hash_data_mb: 25,
                string_count: 250_000,
                ray_resolution: (256, 256),
                ray_depth: 2,
                compression_data_mb: 25,
                monte_carlo_samples: 25_000_000,
                json_data_mb: 2,
                nqueens_size: 12,
            },
            Preset::Mid | Preset::Unspecified => Self {
                prime_range: 6_000_000,
                fibonacci_range: (32, 38),
                matrix_size: 600,
                hash_data_mb: 40,
                string_count: 500_000,
                ray_resolution: (300, 300),
                ray_depth: 3,
                compression_data_mb: 25,
                monte_carlo_samples: 40_000_000,
                json_data_mb: 4,
                nqueens_size: 13,
            },
            Preset::Flagship => Self {
                prime_range: 12_000,
                fibonacci_range: (38, 45),
                matrix_size: 1000,
                hash_data_mb: 100,
                string_count: 1_250_000,
                ray_resolution: (500, 500),
                ray_depth: 5,
                compression_data_mb: 60,
                monte_carlo_samples: 120_000_000,
                json_data_mb: 10,
                nqueens_size: 15,
            },
        }
    }

    /// Shrink every workload by `divisor` for quick runs.
    ///
    /// Linear sizes are divided directly. Exponential workloads (recursive
    /// Fibonacci, N-Queens) drop by `log2(divisor)` steps instead. A divisor
    /// of 0 or 1 returns the params unchanged.
    #[must_use]
    pub fn scaled(&self, divisor: u32) -> Self {
        if divisor <= 1 {
            return self.clone();
        }
        let d = divisor as usize;
        let steps = divisor.ilog2();
        let (fib_lo, fib_hi) = self.fibonacci_range;
        let fib_hi = fib_hi.saturating_sub(steps * 2).max(10);
        let fib_lo = fib_lo.saturating_sub(steps * 2).clamp(1, fib_hi);
        let mb = |value: usize| (value / d).max(1);

        Self {
            prime_range: (self.prime_range / d).max(1_000),
            fibonacci_range: (fib_lo, fib_hi),
            matrix_size: (self.matrix_size / d).max(8),
            hash_data_mb: mb(self.hash_data_mb),
            string_count: (self.string_count / d).max(100),
            ray_resolution: (
                (self.ray_resolution.0 / d).max(8),
                (self.ray_resolution.1 / d).max(8),
            ),
            ray_depth: self.ray_depth,
            compression_data_mb: mb(self.compression_data_mb),
            monte_carlo_samples: (self.monte_carlo_samples / divisor as u64).max(1_000),
            json_data_mb: mb(self.json_data_mb),
            nqueens_size: self.nqueens_size.saturating_sub(steps as usize).max(6),
        }
    }
}
