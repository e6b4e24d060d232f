//! Dimensional and store configuration.
//!
//! The original `sdmdb` bakes D/K/W in as compile-time macros
//! (`sdmconfig.h`: `SDM_VECTOR_ELEMS=256`, `SDM_VECTOR_BASIS_SIZE=16`,
//! 64-bit elements). This crate keeps the same defaults but carries them as
//! a runtime-checked value so a `Store` can assert the dimensions it was
//! built with match the dimensions of a file it reopens.

use crate::error::{Error, Result};

/// Word width in bits. The kernel only supports `u64` words (spec §3: W=64).
pub const WORD_BITS: usize = 64;

/// Bit-width of the semantic vector (D) and fingerprint size (K), plus the
/// derived word count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Dimensions {
    /// Semantic vector width in bits. Must be a multiple of 64.
    pub d: u32,
    /// Fingerprint size (number of distinct indices in [0, D)).
    pub k: u32,
}

impl Dimensions {
    /// `D = 16384, K = 16` — the defaults in `sdmconfig.h`.
    pub const DEFAULT: Self = Self { d: 16_384, k: 16 };

    pub fn new(d: u32, k: u32) -> Result<Self> {
        if d == 0 || d as usize % WORD_BITS != 0 {
            return Err(Error::Runtime(format!(
                "dimension D={d} must be a positive multiple of {WORD_BITS}"
            )));
        }
        if k == 0 || k > d {
            return Err(Error::Runtime(format!(
                "fingerprint size K={k} must be in (0, D={d}]"
            )));
        }
        Ok(Self { d, k })
    }

    #[must_use]
    pub const fn words(self) -> usize {
        self.d as usize / WORD_BITS
    }
}

impl Default for Dimensions {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Policy for handling an out-of-memory condition during a write.
///
/// Spec §9: "expose growth as a policy: `{fail, grow_by_X, grow_to_max}`".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrowPolicy {
    /// Never grow; propagate `OutOfMemory` immediately.
    Fail,
    /// Grow by a fixed number of bytes and retry once.
    GrowBy(u64),
    /// Grow straight to `max_size` and retry once.
    GrowToMax,
}

/// Options governing how a [`crate::store::Store`] opens or creates its
/// backing file. The Rust analogue of `database::database(filepath,
/// initial_size, max_size, compact)`'s positional constructor arguments.
#[derive(Debug, Clone)]
pub struct StoreOptions {
    pub dimensions: Dimensions,
    /// Initial arena size in bytes. Zero + an existing file opens read-only
    /// (spec §6).
    pub initial_size: u64,
    /// Ceiling the arena may grow to.
    pub max_size: u64,
    /// Shrink-to-fit on close.
    pub compact_on_close: bool,
    pub on_out_of_memory: GrowPolicy,
    /// Seed for the index randomizer. `None` derives a seed from the
    /// process's entropy source at open time (non-deterministic); tests
    /// should pin this for reproducibility (spec §4.B: "determinism under a
    /// seed is desirable for tests").
    pub prng_seed: Option<u64>,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            dimensions: Dimensions::DEFAULT,
            initial_size: 64 * 1024 * 1024,
            max_size: 1024 * 1024 * 1024,
            compact_on_close: false,
            on_out_of_memory: GrowPolicy::GrowToMax,
            prng_seed: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_dimensions_match_original_constants() {
        assert_eq!(Dimensions::DEFAULT.d, 16_384);
        assert_eq!(Dimensions::DEFAULT.k, 16);
        assert_eq!(Dimensions::DEFAULT.words(), 256);
    }

    #[test]
    fn rejects_non_multiple_of_word_width() {
        assert!(Dimensions::new(100, 16).is_err());
    }

    #[test]
    fn rejects_k_larger_than_d() {
        assert!(Dimensions::new(1024, 2048).is_err());
    }
}
