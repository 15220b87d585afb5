//! Shared test helpers for unit, property, and integration tests.
//!
//! Gated behind `#[cfg(any(test, feature = "test-utils"))]` so these helpers
//! are available in unit tests, integration tests, and downstream test
//! crates (via the `test-utils` feature).

use crate::fixed::Fixed64;
use crate::id::{CellId, MaterialId};
use crate::lattice::{LatticeConfig, ReactorLattice};
use crate::moderator::{EntryKind, MaterialResolver, ModeratorEntry};
use std::collections::{HashMap, HashSet};

// ===========================================================================
// Fixed-point helper
// ===========================================================================

pub fn fixed(v: f64) -> Fixed64 {
    Fixed64::from_num(v)
}

// ===========================================================================
// Material helpers
// ===========================================================================

pub fn mat(id: &str) -> MaterialId {
    MaterialId::from(id)
}

/// Build a dataset entry of any kind.
pub fn entry(
    kind: EntryKind,
    location: &str,
    absorption: f64,
    efficiency: f64,
    moderation: f64,
    conductivity: f64,
) -> ModeratorEntry {
    ModeratorEntry {
        kind,
        location: mat(location),
        absorption,
        efficiency,
        moderation,
        conductivity,
    }
}

/// Build a single-material (`registry` kind) dataset entry.
pub fn material_entry(
    location: &str,
    absorption: f64,
    efficiency: f64,
    moderation: f64,
    conductivity: f64,
) -> ModeratorEntry {
    entry(
        EntryKind::Registry,
        location,
        absorption,
        efficiency,
        moderation,
        conductivity,
    )
}

// ===========================================================================
// Resolver
// ===========================================================================

/// In-memory [`MaterialResolver`] over plain tables.
#[derive(Debug, Default)]
pub struct TableResolver {
    pub materials: HashSet<MaterialId>,
    pub tags: HashMap<MaterialId, Vec<MaterialId>>,
    pub fluids: HashMap<MaterialId, MaterialId>,
    pub fluid_tags: HashMap<MaterialId, Vec<MaterialId>>,
}

impl TableResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_materials(ids: &[&str]) -> Self {
        let mut resolver = Self::new();
        for id in ids {
            resolver.add_material(id);
        }
        resolver
    }

    pub fn add_material(&mut self, id: &str) {
        self.materials.insert(mat(id));
    }

    /// Register a tag and its member materials.
    pub fn add_tag(&mut self, tag: &str, members: &[&str]) {
        let members: Vec<MaterialId> = members.iter().map(|m| mat(m)).collect();
        for member in &members {
            self.materials.insert(member.clone());
        }
        self.tags.insert(mat(tag), members);
    }

    /// Register a fluid and the material form it occupies in the world.
    pub fn add_fluid(&mut self, fluid: &str, material: &str) {
        self.materials.insert(mat(material));
        self.fluids.insert(mat(fluid), mat(material));
    }

    /// Register a fluid tag; members are given as material forms directly.
    pub fn add_fluid_tag(&mut self, tag: &str, material_forms: &[&str]) {
        let members: Vec<MaterialId> = material_forms.iter().map(|m| mat(m)).collect();
        for member in &members {
            self.materials.insert(member.clone());
        }
        self.fluid_tags.insert(mat(tag), members);
    }
}

impl MaterialResolver for TableResolver {
    fn material_exists(&self, id: &MaterialId) -> bool {
        self.materials.contains(id)
    }

    fn tag_members(&self, tag: &MaterialId) -> Vec<MaterialId> {
        self.tags.get(tag).cloned().unwrap_or_default()
    }

    fn fluid_material(&self, fluid: &MaterialId) -> Option<MaterialId> {
        self.fluids.get(fluid).cloned()
    }

    fn fluid_tag_members(&self, tag: &MaterialId) -> Vec<MaterialId> {
        self.fluid_tags.get(tag).cloned().unwrap_or_default()
    }
}

// ===========================================================================
// Lattice builders
// ===========================================================================

/// A rod with a single radiation ray through a chain of moderator cells,
/// all linked for conduction in a line ending at the rod.
///
/// Returns (lattice, rod id, moderator ids in ray order).
pub fn rod_with_ray(
    config: LatticeConfig,
    fuel: u64,
    materials: &[&str],
) -> (ReactorLattice, CellId, Vec<CellId>) {
    let mut lattice = ReactorLattice::new(config);
    let rod = lattice.add_fuel_rod(fuel, 0);
    let mut ray = Vec::new();
    let mut prev = rod;
    for material in materials {
        let cell = lattice.add_moderator(mat(material));
        lattice.link(prev, cell);
        ray.push(cell);
        prev = cell;
    }
    lattice.set_rays(rod, vec![ray.clone()]);
    (lattice, rod, ray)
}
