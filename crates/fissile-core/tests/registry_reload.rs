//! Concurrent reload behavior.
//!
//! A reload must be atomic to readers: any lookup observes either the
//! fully-old or fully-new mapping, never a mix. These tests hammer the
//! registry from reader threads while the main thread reloads datasets
//! with distinguishable coefficients.

use fissile_core::moderator::{ModeratorEntry, ModeratorRegistry};
use fissile_core::test_utils::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

const MATERIAL_COUNT: usize = 12;

fn init_logs() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn material_names() -> Vec<String> {
    (0..MATERIAL_COUNT).map(|i| format!("mat_{i}")).collect()
}

fn resolver() -> TableResolver {
    let names = material_names();
    let refs: Vec<&str> = names.iter().map(|s| s.as_str()).collect();
    TableResolver::with_materials(&refs)
}

/// Every material in the dataset shares one absorption value, so a mixed
/// mapping is immediately detectable.
fn uniform_dataset(absorption: f64) -> Vec<ModeratorEntry> {
    material_names()
        .iter()
        .map(|name| material_entry(name, absorption, 0.5, 1.5, 1.0))
        .collect()
}

#[test]
fn snapshot_readers_never_observe_partial_reload() {
    init_logs();
    let registry = Arc::new(ModeratorRegistry::new());
    registry.reload(&uniform_dataset(0.25), &resolver());

    let stop = Arc::new(AtomicBool::new(false));
    let mut readers = Vec::new();
    for _ in 0..4 {
        let registry = Arc::clone(&registry);
        let stop = Arc::clone(&stop);
        readers.push(thread::spawn(move || {
            let names = material_names();
            while !stop.load(Ordering::Relaxed) {
                let snapshot = registry.snapshot();
                let first = snapshot
                    .get(&mat(&names[0]))
                    .copied()
                    .expect("material always registered");
                for name in &names {
                    let props = snapshot
                        .get(&mat(name))
                        .copied()
                        .expect("material always registered");
                    assert_eq!(
                        props.absorption, first.absorption,
                        "reader observed a mixed mapping"
                    );
                }
            }
        }));
    }

    let resolver = resolver();
    for round in 0..200 {
        let absorption = if round % 2 == 0 { 0.75 } else { 0.25 };
        let report = registry.reload(&uniform_dataset(absorption), &resolver);
        assert_eq!(report.materials_loaded, MATERIAL_COUNT);
    }

    stop.store(true, Ordering::Relaxed);
    for reader in readers {
        reader.join().expect("reader thread panicked");
    }
}

#[test]
fn point_lookups_stay_registered_through_reloads() {
    init_logs();
    let registry = Arc::new(ModeratorRegistry::new());
    registry.reload(&uniform_dataset(0.25), &resolver());

    let stop = Arc::new(AtomicBool::new(false));
    let mut readers = Vec::new();
    for _ in 0..2 {
        let registry = Arc::clone(&registry);
        let stop = Arc::clone(&stop);
        readers.push(thread::spawn(move || {
            let probe = mat("mat_0");
            while !stop.load(Ordering::Relaxed) {
                // mat_0 is in every dataset, so it must never flicker out.
                assert!(registry.is_allowed(&probe));
                let absorption = registry.properties_of(&probe).absorption;
                assert!(
                    absorption == fixed(0.25) || absorption == fixed(0.75),
                    "unexpected absorption {absorption}"
                );
            }
        }));
    }

    let resolver = resolver();
    for round in 0..200 {
        let absorption = if round % 2 == 0 { 0.75 } else { 0.25 };
        registry.reload(&uniform_dataset(absorption), &resolver);
    }

    stop.store(true, Ordering::Relaxed);
    for reader in readers {
        reader.join().expect("reader thread panicked");
    }
}

#[test]
fn snapshot_taken_before_reload_is_stable() {
    init_logs();
    let registry = ModeratorRegistry::new();
    registry.reload(&uniform_dataset(0.25), &resolver());
    let before = registry.snapshot();

    registry.reload(&uniform_dataset(0.75), &resolver());

    // The old Arc keeps the old mapping alive and unchanged.
    for name in material_names() {
        let props = before.get(&mat(&name)).copied().expect("registered");
        assert_eq!(props.absorption, fixed(0.25));
    }
    assert_eq!(
        registry.properties_of(&mat("mat_0")).absorption,
        fixed(0.75)
    );
}
