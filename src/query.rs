//! The read-only query engine (spec §4.G, §4.H).
//!
//! `density`/`similarity`/`overlap`/`prefix_search` are grounded directly on
//! `original_source/src/rtl/manifold.cpp`'s functions of the same name.
//! `geometry`/`topology` are reconstructed from the commented-out
//! `neighbourhood`/`neighbourhood2` sketches in
//! `original_source/src/rtl/topology.hpp` and `manifold.hpp` — every
//! retrieved revision of `manifold.cpp::get_topology` itself just returns
//! `EUNIMPLEMENTED`, so the filter/sort/truncate shape here is the one spec
//! §4.G/§4.H pins down rather than a transcription of working C++.
//!
//! Every function here takes `&Store` (never `&mut`), matching spec §5's
//! "readers safe to run concurrently with each other, and with no in-flight
//! writer" — in this crate that contract falls directly out of Rust's
//! `&`/`&mut` distinction rather than needing a runtime read/write lock
//! discipline of its own.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::store::Store;

/// One entry of a `geometry` scan: every symbol in a space, unfiltered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeometryPoint {
    pub name: String,
    pub density: f64,
    pub refcount: u64,
}

/// One entry of a `topology` neighbourhood scan: a name paired with its
/// density, similarity, and overlap against the probe vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Neighbour {
    pub name: String,
    pub density: f64,
    pub similarity: f64,
    pub overlap: f64,
}

pub fn density(store: &Store, space: &str, name: &str) -> Result<f64> {
    let dims = store.dimensions();
    store.with_space(space, |s| {
        s.get(name)
            .map(|sym| sym.density(dims))
            .ok_or_else(|| Error::MissingSymbol {
                space: space.to_string(),
                name: name.to_string(),
            })
    })?
}

pub fn similarity(store: &Store, space: &str, a: &str, b: &str) -> Result<f64> {
    let dims = store.dimensions();
    store.with_space(space, |s| {
        let sa = s.get(a).ok_or_else(|| Error::MissingSymbol {
            space: space.to_string(),
            name: a.to_string(),
        })?;
        let sb = s.get(b).ok_or_else(|| Error::MissingSymbol {
            space: space.to_string(),
            name: b.to_string(),
        })?;
        Ok(sa.similarity(sb, dims))
    })?
}

pub fn overlap(store: &Store, space: &str, a: &str, b: &str) -> Result<f64> {
    let dims = store.dimensions();
    store.with_space(space, |s| {
        let sa = s.get(a).ok_or_else(|| Error::MissingSymbol {
            space: space.to_string(),
            name: a.to_string(),
        })?;
        let sb = s.get(b).ok_or_else(|| Error::MissingSymbol {
            space: space.to_string(),
            name: b.to_string(),
        })?;
        Ok(sa.overlap(sb, dims))
    })?
}

/// Names in `space` with the given prefix, ascending.
pub fn prefix_search(store: &Store, space: &str, prefix: &str) -> Result<Vec<String>> {
    store.with_space(space, |s| {
        s.prefix_search(prefix)
            .map(|sym| sym.name().to_string())
            .collect()
    })
}

/// Every point in a space: `(name, density, refcount)` per symbol, in
/// positional (insertion) order (spec §4.G: "geometry(space) → list of
/// points").
pub fn geometry(store: &Store, space: &str) -> Result<Vec<GeometryPoint>> {
    let dims = store.dimensions();
    store.with_space(space, |s| {
        s.iter()
            .map(|sym| GeometryPoint {
                name: sym.name().to_string(),
                density: sym.density(dims),
                refcount: sym.refcount(),
            })
            .collect()
    })
}

/// The implicit lower density bound in spec §4.G's `ρ ∈ (density_lower,
/// density_upper]`: only `density_upper_bound` is an exposed parameter, so
/// the lower bound is fixed here at an exclusive zero — a symbol that has
/// never been learned into (all-zero vector) never appears in a
/// neighbourhood.
const DENSITY_LOWER_BOUND: f64 = 0.0;

/// Neighbourhood scan against a probe vector borrowed straight from the
/// caller, rather than a named symbol — the overload spec §4.H calls out
/// ("an additional overload accepts a raw probe vector instead of a
/// space/name pair").
///
/// For every symbol in `target_space`, computes density ρ, similarity s and
/// overlap o against `probe`; keeps records with
/// `ρ ∈ (0, density_upper_bound] AND s ≥ similarity_lower_bound`; sorts by
/// descending similarity (ties broken by ascending name for a deterministic
/// order); truncates to `cardinality_upper_bound`.
///
/// Spec §5 allows the per-symbol measurement loop to run as a data-parallel
/// fork-join scan; this implementation partitions the space's positional
/// arena into contiguous chunks across `std::thread::available_parallelism`
/// threads, scores each chunk independently via `std::thread::scope`, then
/// performs the filter/sort/truncate reduction serially in the calling
/// thread.
pub fn topology_with_probe(
    store: &Store,
    target_space: &str,
    probe: &[u64],
    density_upper_bound: f64,
    similarity_lower_bound: f64,
    cardinality_upper_bound: usize,
) -> Result<Vec<Neighbour>> {
    let dims = store.dimensions();
    if cardinality_upper_bound == 0 {
        return Ok(Vec::new());
    }
    store.with_space(target_space, |s| {
        let symbols: Vec<(&str, &[u64])> = s
            .iter()
            .map(|sym| (sym.name(), sym.vector()))
            .collect();

        let worker_count = std::thread::available_parallelism()
            .map(std::num::NonZeroUsize::get)
            .unwrap_or(1)
            .min(symbols.len().max(1));
        let chunk_size = symbols.len().div_ceil(worker_count.max(1)).max(1);

        let mut scored: Vec<Neighbour> = std::thread::scope(|scope| {
            let handles: Vec<_> = symbols
                .chunks(chunk_size)
                .map(|chunk| {
                    scope.spawn(move || {
                        chunk
                            .iter()
                            .map(|(name, vector)| Neighbour {
                                name: (*name).to_string(),
                                density: crate::bitvector::density(vector, dims.d),
                                similarity: crate::bitvector::similarity(probe, vector, dims.d),
                                overlap: crate::bitvector::overlap(probe, vector, dims.d),
                            })
                            .collect::<Vec<_>>()
                    })
                })
                .collect();
            handles
                .into_iter()
                .flat_map(|h| h.join().expect("topology worker panicked"))
                .collect()
        });

        scored.retain(|n| {
            n.density > DENSITY_LOWER_BOUND
                && n.density <= density_upper_bound
                && n.similarity >= similarity_lower_bound
        });
        scored.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.name.cmp(&b.name))
        });
        scored.truncate(cardinality_upper_bound);
        scored
    })
}

/// `topology(target_space, source_space, source_name, density_upper_bound,
/// similarity_lower_bound, cardinality_upper_bound)` (spec §4.G): resolves
/// the probe vector from `source_name` in `source_space` (which may differ
/// from `target_space`), then delegates to [`topology_with_probe`].
pub fn topology(
    store: &Store,
    target_space: &str,
    source_space: &str,
    source_name: &str,
    density_upper_bound: f64,
    similarity_lower_bound: f64,
    cardinality_upper_bound: usize,
) -> Result<Vec<Neighbour>> {
    let probe = store
        .with_space(source_space, |s| {
            s.get(source_name).map(|sym| sym.vector().to_vec())
        })?
        .ok_or_else(|| Error::MissingSymbol {
            space: source_space.to_string(),
            name: source_name.to_string(),
        })?;
    topology_with_probe(
        store,
        target_space,
        &probe,
        density_upper_bound,
        similarity_lower_bound,
        cardinality_upper_bound,
    )
}

/// Density-weighted prefix match (SUPPLEMENTED FEATURE 3): like
/// `prefix_search`, but pairs each matching name with its density, grounded
/// on `original_source/src/rtl/lookup.hpp`'s combined name+vector lookup.
pub fn matching_terms(store: &Store, space: &str, prefix: &str) -> Result<Vec<(String, f64)>> {
    let dims = store.dimensions();
    store.with_space(space, |s| {
        s.prefix_search(prefix)
            .map(|sym| (sym.name().to_string(), sym.density(dims)))
            .collect()
    })
}
