//! Non-cryptographic index randomizer used to mint fresh elemental
//! fingerprints (spec §4.B).
//!
//! `original_source`'s `util/fast_random.hpp` (referenced by
//! `mms/elemental_vector.hpp` but not itself retrieved into the pack) is a
//! fast, non-cryptographic shuffle generator. The teacher's
//! `ContainerDto::random` (`src/storage/ladybug/fingerprint.rs`) fills a
//! fixed-width word buffer from a SplitMix64-expanded seed run through
//! xorshift64 — the same "fast PRNG behind a seedable state word" shape. No
//! crate in the pack pulls in `rand` for this kind of thing, and the spec is
//! explicit that cryptographic quality is a non-goal, so this is a
//! self-contained generator rather than a new dependency.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::config::Dimensions;
use crate::fingerprint::Fingerprint;

/// Seedable, non-cryptographic PRNG: SplitMix64 expands the seed, xorshift64
/// drives the stream. Used exclusively to mint distinct indices in `[0, D)`
/// for fresh fingerprints.
#[derive(Debug, Clone)]
pub struct IndexRandomizer {
    state: u64,
}

impl IndexRandomizer {
    #[must_use]
    pub fn new(seed: u64) -> Self {
        // SplitMix64 avalanche so an all-zero or low-entropy seed still
        // produces a well-mixed initial xorshift state.
        let mut z = seed.wrapping_add(0x9E37_79B9_7F4A_7C15);
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        let state = (z ^ (z >> 31)) | 1; // xorshift64 requires a nonzero state
        Self { state }
    }

    /// Derive a seed from the process's wall-clock entropy when the caller
    /// has no deterministic seed to pin (spec §4.B: "determinism under a
    /// seed is desirable for tests" — production callers don't need it).
    #[must_use]
    pub fn from_entropy() -> Self {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0x5DEE_CE1D_5DEE_CE1D);
        Self::new(nanos)
    }

    #[inline]
    fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        x
    }

    #[inline]
    fn next_below(&mut self, bound: u32) -> u32 {
        // Lemire-style rejection-free reduction: biased by a negligible
        // amount for D in the thousands, which is acceptable for a
        // non-cryptographic shuffle (spec explicitly disclaims uniformity
        // guarantees at cryptographic strength).
        ((self.next_u64() % u64::from(bound)) as u32).min(bound - 1)
    }

    /// Draw `dims.k` distinct indices in `[0, dims.d)` via a partial
    /// Fisher–Yates shuffle, and package them as a fresh [`Fingerprint`].
    pub fn shuffle(&mut self, dims: Dimensions) -> Fingerprint {
        let mut pool: Vec<u32> = (0..dims.d).collect();
        let k = dims.k as usize;
        for i in 0..k {
            let remaining = pool.len() - i;
            let j = i + self.next_below(remaining as u32) as usize;
            pool.swap(i, j);
        }
        pool.truncate(k);
        Fingerprint::from_indices(pool)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_is_deterministic() {
        let dims = Dimensions::DEFAULT;
        let a = IndexRandomizer::new(42).shuffle(dims);
        let b = IndexRandomizer::new(42).shuffle(dims);
        assert_eq!(a.indices(), b.indices());
    }

    #[test]
    fn different_seeds_usually_differ() {
        let dims = Dimensions::DEFAULT;
        let a = IndexRandomizer::new(1).shuffle(dims);
        let b = IndexRandomizer::new(2).shuffle(dims);
        assert_ne!(a.indices(), b.indices());
    }

    #[test]
    fn shuffle_produces_k_distinct_indices_in_range() {
        let dims = Dimensions::new(1024, 32).unwrap();
        let fp = IndexRandomizer::new(7).shuffle(dims);
        assert_eq!(fp.indices().len(), dims.k as usize);
        let mut sorted = fp.indices().to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), dims.k as usize);
        assert!(fp.indices().iter().all(|&i| i < dims.d));
    }
}
