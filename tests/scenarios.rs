//! Integration tests for the concrete scenarios in spec §8.
//!
//! Each test stands up its own store in a fresh temp directory and exercises
//! the public `learn`/`query` API exactly the way an external crate would.

use pretty_assertions::assert_eq;
use tempfile::tempdir;

use sdm_rs::config::{Dimensions, GrowPolicy, StoreOptions};
use sdm_rs::store::Store;
use sdm_rs::{learn, query};

fn open_store(dims: Dimensions, seed: u64) -> (tempfile::TempDir, Store) {
    let dir = tempdir().unwrap();
    let path = dir.path().join("scenario.sdm");
    let store = Store::open(
        &path,
        StoreOptions {
            dimensions: dims,
            initial_size: 4 * 1024 * 1024,
            max_size: 64 * 1024 * 1024,
            compact_on_close: false,
            on_out_of_memory: GrowPolicy::GrowToMax,
            prng_seed: Some(seed),
        },
    )
    .unwrap();
    (dir, store)
}

/// Scenario 1 — Basic learning & similarity.
#[test]
fn scenario_1_basic_learning_and_similarity() {
    let (_dir, store) = open_store(Dimensions::DEFAULT, 1);

    for source in ["Simon", "Natasha", "Joshua", "Oliver", "Laura"] {
        learn::superpose(&store, "names", "Beaumont", "names", source, 0).unwrap();
    }
    learn::superpose(&store, "names", "Simon", "names", "Beaumont", 0).unwrap();

    let density = query::density(&store, "names", "Beaumont").unwrap();
    assert!(
        density > 0.004 && density < 0.02,
        "density {density} out of expected bounds"
    );
    assert_eq!(store.space_cardinality("names").unwrap(), 6);
}

/// Scenario 2 — Prefix scan.
#[test]
fn scenario_2_prefix_scan() {
    let (_dir, store) = open_store(Dimensions::new(1024, 16).unwrap(), 2);

    for n in ["apple", "apex", "banana", "band", "bandana"] {
        learn::named_vector(&store, "fruit", n).unwrap();
    }

    assert_eq!(
        query::prefix_search(&store, "fruit", "ba").unwrap(),
        vec!["banana", "band", "bandana"]
    );
    assert_eq!(
        query::prefix_search(&store, "fruit", "bandana").unwrap(),
        vec!["bandana"]
    );
    let mut all = query::prefix_search(&store, "fruit", "").unwrap();
    all.sort();
    assert_eq!(all, vec!["apex", "apple", "banana", "band", "bandana"]);
}

/// Scenario 3 — Self-similarity.
#[test]
fn scenario_3_self_similarity() {
    let (_dir, store) = open_store(Dimensions::new(1024, 16).unwrap(), 3);

    learn::superpose(&store, "names", "beaumont", "names", "simon", 0).unwrap();

    let density = query::density(&store, "names", "beaumont").unwrap();
    assert!(density > 0.0);
    let sim = query::similarity(&store, "names", "beaumont", "beaumont").unwrap();
    let overlap = query::overlap(&store, "names", "beaumont", "beaumont").unwrap();
    assert!((sim - 1.0).abs() < 1e-12);
    assert!((overlap - density).abs() < 1e-12);
}

/// Scenario 4 — Orthogonality of fresh symbols, then post-superpose
/// similarity collapses toward `1 - 2K/D`.
#[test]
fn scenario_4_orthogonality_then_near_orthogonal_after_superpose() {
    let dims = Dimensions::DEFAULT;
    let (_dir, store) = open_store(dims, 4);

    let names: Vec<String> = (0..1000).map(|i| format!("sym{i}")).collect();
    for n in &names {
        learn::named_vector(&store, "pool", n).unwrap();
    }
    // every vector is still all-zero: similarity between any two is exactly 1.
    let sim = query::similarity(&store, "pool", &names[0], &names[500]).unwrap();
    assert!((sim - 1.0).abs() < 1e-12);

    for (i, n) in names.iter().enumerate() {
        learn::superpose(&store, "pool", n, "pool", &format!("source{i}"), 0).unwrap();
    }

    let expected = 1.0 - 2.0 * f64::from(dims.k) / f64::from(dims.d);
    let mut samples = Vec::new();
    for i in (0..1000).step_by(137) {
        let j = (i + 1) % 1000;
        if i == j {
            continue;
        }
        samples.push(query::similarity(&store, "pool", &names[i], &names[j]).unwrap());
    }
    for s in samples {
        assert!(
            (s - expected).abs() < 0.02,
            "similarity {s} too far from expected {expected}"
        );
    }
}

/// Scenario 5 — Persistence round-trip across close/reopen.
#[test]
fn scenario_5_persistence_round_trip() {
    let dims = Dimensions::new(1024, 16).unwrap();
    let dir = tempdir().unwrap();
    let path = dir.path().join("persist.sdm");
    let names: Vec<String> = (0..2000).map(|i| format!("word{i:05}")).collect();

    {
        let store = Store::open(
            &path,
            StoreOptions {
                dimensions: dims,
                initial_size: 16 * 1024 * 1024,
                max_size: 64 * 1024 * 1024,
                compact_on_close: false,
                on_out_of_memory: GrowPolicy::GrowToMax,
                prng_seed: Some(5),
            },
        )
        .unwrap();
        for n in &names {
            learn::named_vector(&store, "TESTSPACE", n).unwrap();
        }
        store.close().unwrap();
    }

    let reopened = Store::open(
        &path,
        StoreOptions {
            dimensions: dims,
            initial_size: 0,
            max_size: 64 * 1024 * 1024,
            compact_on_close: false,
            on_out_of_memory: GrowPolicy::GrowToMax,
            prng_seed: Some(5),
        },
    )
    .unwrap();

    assert_eq!(reopened.space_cardinality("TESTSPACE").unwrap(), 2000);
    let all = query::prefix_search(&reopened, "TESTSPACE", "").unwrap();
    assert_eq!(all.len(), 2000);
    for n in &names {
        assert!(all.contains(n));
    }
}

/// Scenario 6 — Topology shape.
#[test]
fn scenario_6_topology_shape() {
    let (_dir, store) = open_store(Dimensions::DEFAULT, 6);

    for source in ["Simon", "Natasha", "Joshua", "Oliver", "Laura"] {
        learn::superpose(&store, "names", "Beaumont", "names", source, 0).unwrap();
    }
    learn::superpose(&store, "names", "Simon", "names", "Beaumont", 0).unwrap();

    let neighbours =
        query::topology(&store, "names", "names", "Beaumont", 1.0, 0.5, 10).unwrap();

    assert!(!neighbours.is_empty());
    assert_eq!(neighbours[0].name, "Beaumont");
    assert!((neighbours[0].similarity - 1.0).abs() < 1e-12);
    for pair in neighbours.windows(2) {
        assert!(pair[0].similarity >= pair[1].similarity);
    }
}
