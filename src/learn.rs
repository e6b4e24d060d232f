//! Learning operations: the write side of the engine (spec §4.F).
//!
//! Grounded line-for-line on `original_source/src/rtl/database.cpp`'s
//! `namedvector`/`superpose`/`subtract`: the target symbol is ensured only
//! *after* the source symbol, because — per the original's own comment —
//! "any insert to index MAY invalidate vector or symbol pointers" and the
//! target lookup must therefore follow every insertion the call makes,
//! including the source's. Target and source may live in different spaces
//! (`superpose`/`subtract` each take a `target_space`/`source_space` pair),
//! matching `database::superpose(ts, tn, ss, sn, shift)`'s signature.

use crate::error::{Assertion, Error, Result};
use crate::store::Store;

/// Ensure `name` exists in `space` with dither `p` (inserting a fresh
/// elemental fingerprint if not) and report whether that insertion just
/// happened. `p = 1.0` is the default used by plain inserts; a lower value
/// marks the symbol to superpose with a dithered/"white" split when it is
/// later used as a superpose *source* (spec §3).
pub fn named_vector_with_dither(
    store: &Store,
    space: &str,
    name: &str,
    p: f32,
) -> Result<Assertion> {
    let fingerprint = store.fresh_fingerprint();
    store.with_space_mut(space, |s| {
        let (pos, created) = s.get_or_insert(name, || fingerprint);
        if created {
            if let Some(sym) = s.at_mut(pos) {
                sym.set_dither(p);
            }
            Assertion::Created
        } else {
            Assertion::Existed
        }
    })
}

/// `named_vector(space, name)`: the `p = 1.0` convenience form.
pub fn named_vector(store: &Store, space: &str, name: &str) -> Result<Assertion> {
    named_vector_with_dither(store, space, name, 1.0)
}

/// Learn `source_name` (in `source_space`) into `target_name` (in
/// `target_space`), rotated by `shift`. Both names are ensured to exist
/// first — the source strictly before the target — then
/// `target.superpose(source, shift)` runs the bitwise update. `target_name`
/// and `source_name` may name the same symbol (`database::superpose`,
/// `original_source/src/rtl/database.cpp:74`, permits a symbol to learn its
/// own fingerprint into its own vector); the source is snapshotted by value
/// before the target is mutated, so there is no aliasing hazard here either.
#[allow(clippy::too_many_arguments)]
pub fn superpose(
    store: &Store,
    target_space: &str,
    target_name: &str,
    source_space: &str,
    source_name: &str,
    shift: u32,
) -> Result<Assertion> {
    // Source first: the caveat in database.cpp applies verbatim here too.
    named_vector(store, source_space, source_name)?;
    let target_assertion = named_vector(store, target_space, target_name)?;

    let dims = store.dimensions();
    let source = store
        .with_space(source_space, |s| s.get(source_name).cloned())?
        .expect("just ensured");

    store.with_space_mut(target_space, |s| {
        if let Some(pos) = s.position_of(target_name) {
            if let Some(target) = s.at_mut(pos) {
                target.superpose(&source, shift, dims);
            }
        }
    })?;
    store.with_space_mut(source_space, |s| {
        if let Some(pos) = s.position_of(source_name) {
            if let Some(src) = s.at_mut(pos) {
                src.bump_instance();
            }
        }
    })?;
    Ok(target_assertion)
}

/// Forget `source_name` (in `source_space`) from `target_name` (in
/// `target_space`), rotated by `shift`. Unlike `superpose`, both symbols
/// must already exist — per `database::subtract`'s own comment, "source and
/// target must exist else this is a noop" — so a missing symbol surfaces as
/// `MissingSymbol` rather than silently creating one to subtract nothing
/// from. As with `superpose`, `target_name`/`source_name` may coincide.
#[allow(clippy::too_many_arguments)]
pub fn subtract(
    store: &Store,
    target_space: &str,
    target_name: &str,
    source_space: &str,
    source_name: &str,
    shift: u32,
) -> Result<()> {
    let dims = store.dimensions();
    let source = store
        .with_space(source_space, |s| s.get(source_name).cloned())?
        .ok_or_else(|| Error::MissingSymbol {
            space: source_space.to_string(),
            name: source_name.to_string(),
        })?;

    store.with_space_mut(target_space, |s| {
        let pos = s.position_of(target_name).ok_or_else(|| Error::MissingSymbol {
            space: target_space.to_string(),
            name: target_name.to_string(),
        })?;
        s.at_mut(pos)
            .expect("position_of just resolved")
            .subtract(&source, shift, dims);
        Ok::<(), Error>(())
    })??;
    store.with_space_mut(source_space, |s| {
        if let Some(pos) = s.position_of(source_name) {
            if let Some(src) = s.at_mut(pos) {
                src.bump_instance();
            }
        }
    })?;
    Ok(())
}

/// Reserved batch-learning primitive (spec §4.F, §9): deliberately left
/// unimplemented, matching `database::superpose(ts, tn, ss, sns, shifts,
/// refcount)` which itself returns `EUNIMPLEMENTED` in the source. A real
/// batch path needs a different locking discipline than one `superpose`
/// call per pair — amortizing the space lookup and running the bitwise
/// updates without re-acquiring the write lock per pair — and that hasn't
/// been designed yet.
pub fn batch_superpose(
    _store: &Store,
    _target_space: &str,
    _target_name: &str,
    _source_space: &str,
    _pairs: &[(String, u32)],
) -> Result<()> {
    Err(Error::Unimplemented("batch_superpose"))
}

/// Convenience loop over single `superpose` calls, all within one space.
/// NOT the reserved batch primitive above — it pays the per-pair locking
/// cost `batch_superpose` exists to avoid, and exists only so callers with
/// a handful of pairs don't have to write the loop themselves.
pub fn superpose_many(
    store: &Store,
    space: &str,
    pairs: &[(String, String, u32)],
) -> Result<()> {
    for (target_name, source_name, shift) in pairs {
        superpose(store, space, target_name, space, source_name, *shift)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Dimensions, GrowPolicy, StoreOptions};
    use tempfile::tempdir;

    fn store(dims: Dimensions) -> Store {
        let dir = tempdir().unwrap();
        let path = dir.path().join("learn.sdm");
        std::mem::forget(dir); // keep the tempdir alive for the test's duration
        Store::open(
            path,
            StoreOptions {
                dimensions: dims,
                initial_size: 1024 * 1024,
                max_size: 8 * 1024 * 1024,
                compact_on_close: false,
                on_out_of_memory: GrowPolicy::GrowToMax,
                prng_seed: Some(99),
            },
        )
        .unwrap()
    }

    #[test]
    fn named_vector_creates_then_reports_existed() {
        let store = store(Dimensions::new(1024, 16).unwrap());
        let a = named_vector(&store, "names", "beaumont").unwrap();
        let b = named_vector(&store, "names", "beaumont").unwrap();
        assert_eq!(a, Assertion::Created);
        assert_eq!(b, Assertion::Existed);
    }

    #[test]
    fn superpose_raises_target_overlap_with_source() {
        let store = store(Dimensions::new(1024, 16).unwrap());
        superpose(&store, "names", "target", "names", "simon", 0).unwrap();
        let dims = store.dimensions();
        let overlap = store
            .with_space("names", |s| {
                let src = s.get("simon").unwrap();
                let tgt = s.get("target").unwrap();
                src.overlap(tgt, dims)
            })
            .unwrap();
        assert!(overlap > 0.0);
    }

    #[test]
    fn superpose_can_cross_spaces() {
        let store = store(Dimensions::new(1024, 16).unwrap());
        superpose(&store, "names", "beaumont", "places", "london", 0).unwrap();
        assert_eq!(store.space_cardinality("names").unwrap(), 1);
        assert_eq!(store.space_cardinality("places").unwrap(), 1);
    }

    #[test]
    fn superpose_permits_a_symbol_to_learn_its_own_fingerprint() {
        let store = store(Dimensions::new(1024, 16).unwrap());
        named_vector(&store, "names", "beaumont").unwrap();
        let before = store
            .with_space("names", |s| s.get("beaumont").unwrap().density(store.dimensions()))
            .unwrap();
        superpose(&store, "names", "beaumont", "names", "beaumont", 0).unwrap();
        let after = store
            .with_space("names", |s| s.get("beaumont").unwrap().density(store.dimensions()))
            .unwrap();
        assert!(after > before);
    }

    #[test]
    fn subtract_requires_both_symbols_to_preexist() {
        let store = store(Dimensions::new(1024, 16).unwrap());
        let err = subtract(&store, "names", "target", "names", "ghost", 0).unwrap_err();
        assert!(matches!(err, Error::MissingSymbol { .. }));
    }

    #[test]
    fn subtract_undoes_a_prior_superpose() {
        let store = store(Dimensions::new(1024, 16).unwrap());
        superpose(&store, "names", "target", "names", "simon", 0).unwrap();
        subtract(&store, "names", "target", "names", "simon", 0).unwrap();
        let density = store
            .with_space("names", |s| s.get("target").unwrap().density(store.dimensions()))
            .unwrap();
        assert_eq!(density, 0.0);
    }
}
