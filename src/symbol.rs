//! A symbol: an immutable name and fingerprint paired with a mutable
//! semantic vector (spec §2, §3).
//!
//! Grounded on `original_source/src/mms/symbol.hpp`: `name()`/`fingerprint()`
//! never change after construction; `vector()` is learned into over the
//! symbol's lifetime via `superpose`/`subtract`/`set_bits`, all of which
//! delegate straight to the [`crate::bitvector`] kernel, exactly as the
//! original's `symbol::superpose`/`subtract` delegate to `semantic_vector`'s
//! bitwise ops.

use crate::bitvector;
use crate::config::Dimensions;
use crate::fingerprint::Fingerprint;

/// A named point in a [`crate::space::Space`]: identity (name, fingerprint)
/// plus accreted state (semantic vector, refcount, instance counter).
#[derive(Debug, Clone)]
pub struct Symbol {
    name: Box<str>,
    fingerprint: Fingerprint,
    vector: Vec<u64>,
    /// The dither ratio `p` used when this symbol is learned into as a
    /// *source*: `p=1` is a plain OR; `p<1` splits the rotated fingerprint
    /// into a clear-half and a set-half (spec §3).
    dither: f32,
    /// Incremented on every qualified `get_by_name` lookup (spec §2).
    refcount: u64,
    /// Supplemented introspection counter: incremented each time this
    /// symbol is used as the *source* of a `superpose`/`subtract` (never
    /// affects rotation — see `SPEC_FULL.md` SUPPLEMENTED FEATURES §1).
    instance: u64,
}

impl Symbol {
    #[must_use]
    pub fn new(name: impl Into<Box<str>>, fingerprint: Fingerprint, dims: Dimensions) -> Self {
        Self {
            name: name.into(),
            fingerprint,
            vector: vec![0u64; dims.words()],
            dither: 1.0,
            refcount: 0,
            instance: 0,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    #[must_use]
    pub fn vector(&self) -> &[u64] {
        &self.vector
    }

    #[must_use]
    pub fn dither(&self) -> f32 {
        self.dither
    }

    pub fn set_dither(&mut self, p: f32) {
        self.dither = p.clamp(0.0, 1.0);
    }

    #[must_use]
    pub fn refcount(&self) -> u64 {
        self.refcount
    }

    pub(crate) fn bump_refcount(&mut self) {
        self.refcount += 1;
    }

    #[must_use]
    pub fn instance(&self) -> u64 {
        self.instance
    }

    pub(crate) fn bump_instance(&mut self) {
        self.instance += 1;
    }

    #[must_use]
    pub fn density(&self, dims: Dimensions) -> f64 {
        bitvector::density(&self.vector, dims.d)
    }

    #[must_use]
    pub fn distance(&self, other: &Symbol) -> u32 {
        bitvector::distance(&self.vector, &other.vector)
    }

    #[must_use]
    pub fn similarity(&self, other: &Symbol, dims: Dimensions) -> f64 {
        bitvector::similarity(&self.vector, &other.vector, dims.d)
    }

    #[must_use]
    pub fn overlap(&self, other: &Symbol, dims: Dimensions) -> f64 {
        bitvector::overlap(&self.vector, &other.vector, dims.d)
    }

    /// OR each (raw, un-rotated) index from `indices` directly into this
    /// symbol's vector.
    pub fn set_bits(&mut self, indices: &[u32]) {
        bitvector::set_bits(&mut self.vector, indices.iter().copied());
    }

    /// Learn `source`'s fingerprint into this symbol's vector, rotated by
    /// `shift`. If `source`'s dither is 1.0 this is a plain OR of every
    /// rotated index; otherwise the rotated index list is split at
    /// `h = ⌊p·K⌋`: the first `h` are cleared (AND NOT), the remaining
    /// `K−h` are set (OR) — the "white"/dithered superposition (spec §3,
    /// §4.C).
    pub fn superpose(&mut self, source: &Symbol, shift: u32, dims: Dimensions) {
        if (source.dither - 1.0).abs() < f32::EPSILON {
            for idx in source.fingerprint.rotated(shift, dims.d) {
                bitvector::set_bit(&mut self.vector, idx);
            }
        } else {
            // h = floor(p*K): at p=0, h=0, so every rotated index falls in
            // the "set" half and all K bits get OR'd in. This is the rule
            // §4.C actually specifies; a prose aside elsewhere describing
            // dither=0 as leaving the target unchanged describes the
            // opposite split and is inconsistent with it.
            let h = (source.dither * dims.k as f32).floor() as usize;
            let rotated: Vec<u32> = source.fingerprint.rotated(shift, dims.d).collect();
            bitvector::clear_then_set(&mut self.vector, &rotated, h);
        }
    }

    /// Forget `source`'s fingerprint from this symbol's vector: every
    /// rotated index is cleared (AND NOT), regardless of dither (spec §4.C:
    /// subtract always targets the full fingerprint).
    pub fn subtract(&mut self, source: &Symbol, shift: u32, dims: Dimensions) {
        for idx in source.fingerprint.rotated(shift, dims.d) {
            bitvector::clear_bit(&mut self.vector, idx);
        }
    }
}
