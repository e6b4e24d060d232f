//! The elemental fingerprint: an immutable, sparse K-of-D index set
//! (spec §2, §3).
//!
//! Grounded on `original_source/src/mms/elemental_vector.hpp` — a fixed-size
//! array of distinct indices into the semantic vector's bit space, generated
//! once at symbol creation and never mutated afterwards. Rotation (`shift`)
//! is applied on read, never baked into the stored indices, so the same
//! fingerprint can be replayed at any rotation without copying.

use crate::config::Dimensions;

/// K distinct indices in `[0, D)`, fixed at construction.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Fingerprint {
    indices: Box<[u32]>,
}

impl Fingerprint {
    /// Build directly from an already-distinct index set (e.g. the output of
    /// [`crate::prng::IndexRandomizer::shuffle`], or a deserialized one read
    /// back from the store).
    #[must_use]
    pub fn from_indices(indices: Vec<u32>) -> Self {
        Self {
            indices: indices.into_boxed_slice(),
        }
    }

    #[must_use]
    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Indices rotated by `r`, reduced modulo `d`. Spec §3: "values outside
    /// `[0, D)` are reduced modulo D"; `shift = D` is therefore equivalent to
    /// `shift = 0`.
    pub fn rotated(&self, r: u32, d: u32) -> impl Iterator<Item = u32> + '_ {
        let r = r % d;
        self.indices.iter().map(move |&idx| (idx + r) % d)
    }

    /// The clear-half / set-half split used by dithered superposition:
    /// `h = ⌊p·K⌋` (spec §3, §4.C).
    #[must_use]
    pub fn dither_split(h: usize) -> usize {
        h
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotation_by_zero_is_identity() {
        let fp = Fingerprint::from_indices(vec![1, 5000, 16000]);
        let rotated: Vec<u32> = fp.rotated(0, 16384).collect();
        assert_eq!(rotated, fp.indices());
    }

    #[test]
    fn rotation_by_d_equals_rotation_by_zero() {
        let fp = Fingerprint::from_indices(vec![1, 5000, 16000]);
        let at_zero: Vec<u32> = fp.rotated(0, 16384).collect();
        let at_d: Vec<u32> = fp.rotated(16384, 16384).collect();
        assert_eq!(at_zero, at_d);
    }

    #[test]
    fn rotation_wraps_modulo_d() {
        let fp = Fingerprint::from_indices(vec![16380]);
        let rotated: Vec<u32> = fp.rotated(10, 16384).collect();
        assert_eq!(rotated, vec![6]);
    }
}
