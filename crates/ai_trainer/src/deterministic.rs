//! Deterministic utilities for reproducible training
//!
//! Provides an LCG-based RNG, per-tree seed derivation and tie-breaking
//! so that the same data and seed give the same forest on every platform,
//! independent of how rayon schedules the trees.

use std::num::Wrapping;

/// 64-bit linear congruential generator (Knuth MMIX constants)
///
/// Only the high 32 bits of the state are handed out; the low bits of a
/// power-of-two LCG have short periods.
#[derive(Clone, Debug)]
pub struct LcgRng {
    state: Wrapping<u64>,
}

impl LcgRng {
    const MULTIPLIER: u64 = 6364136223846793005;
    const INCREMENT: u64 = 1442695040888963407;

    pub fn new(seed: u64) -> Self {
        let mut rng = Self {
            state: Wrapping(seed),
        };
        // decorrelate small neighbouring seeds
        rng.next_u32();
        rng
    }

    pub fn next_u32(&mut self) -> u32 {
        self.state = self.state * Wrapping(Self::MULTIPLIER) + Wrapping(Self::INCREMENT);
        (self.state.0 >> 32) as u32
    }

    /// Uniform value in `[0, bound)`; 0 when `bound == 0`
    pub fn next_below(&mut self, bound: usize) -> usize {
        if bound == 0 {
            return 0;
        }
        ((self.next_u32() as u64 * bound as u64) >> 32) as usize
    }

    /// In-place Fisher-Yates shuffle
    pub fn shuffle<T>(&mut self, items: &mut [T]) {
        for i in (1..items.len()).rev() {
            let j = self.next_below(i + 1);
            items.swap(i, j);
        }
    }

    /// `k` distinct values from `0..n` via a partial Fisher-Yates shuffle
    pub fn sample_indices(&mut self, n: usize, k: usize) -> Vec<usize> {
        let k = k.min(n);
        let mut pool: Vec<usize> = (0..n).collect();
        for i in 0..k {
            let j = i + self.next_below(n - i);
            pool.swap(i, j);
        }
        pool.truncate(k);
        pool
    }

    /// `n` draws with replacement from `0..n`
    pub fn bootstrap(&mut self, n: usize) -> Vec<usize> {
        (0..n).map(|_| self.next_below(n)).collect()
    }
}

/// Seed of tree `tree_idx`, derived with a SplitMix64 finaliser
pub fn tree_seed(seed: u64, tree_idx: usize) -> u64 {
    let mut z = seed
        .wrapping_add(0x9E3779B97F4A7C15_u64.wrapping_mul(tree_idx as u64 + 1));
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}

/// Deterministic tie-breaker for split selection
/// Equal scores prefer the lower feature index, then the lower threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SplitTieBreaker {
    pub feature_idx: usize,
    pub threshold: i64,
}

impl SplitTieBreaker {
    pub fn new(feature_idx: usize, threshold: i64) -> Self {
        Self {
            feature_idx,
            threshold,
        }
    }
}
