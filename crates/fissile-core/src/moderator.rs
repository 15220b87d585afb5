//! Moderator registry: classifies world materials as neutron moderators and
//! provides their physical coefficients.
//!
//! The registry is rebuilt wholesale from a declarative dataset on each
//! configuration reload and is read-only between reloads. Reads never block
//! each other; a reload builds the replacement mapping off to the side and
//! only takes exclusive access for the pointer swap, so a reader sees either
//! the old or the new complete mapping, never a mix.
//!
//! Absence is a valid classification: looking up an unregistered material
//! yields [`ModeratorProperties::EMPTY`], which has no effect on the
//! simulation.

use crate::fixed::{Fixed64, try_fixed64};
use crate::id::MaterialId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

/// Immutable physical coefficients of a moderator material.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModeratorProperties {
    /// Fraction of incident neutron flux captured, in [0, 1].
    pub absorption: Fixed64,
    /// Fraction of absorbed-flux energy converted into usable heat, in [0, 1].
    pub heat_efficiency: Fixed64,
    /// Factor by which transmitted flux is slowed, in [1, inf).
    pub moderation: Fixed64,
    /// Rate coefficient for heat exchange with adjacent cells, in [0, inf).
    pub heat_conductivity: Fixed64,
}

impl ModeratorProperties {
    /// The "no effect" moderator: absorbs nothing, moderates nothing,
    /// conducts nothing. Safe default for unregistered materials.
    pub const EMPTY: Self = Self {
        absorption: Fixed64::ZERO,
        heat_efficiency: Fixed64::ZERO,
        moderation: Fixed64::ONE,
        heat_conductivity: Fixed64::ZERO,
    };

    /// Validate boundary coefficients and convert them into simulation math.
    ///
    /// NaN and infinite values fail the range checks; values that pass the
    /// ranges but overflow Q32.32 are rejected as well.
    pub fn from_coefficients(
        absorption: f64,
        heat_efficiency: f64,
        moderation: f64,
        heat_conductivity: f64,
    ) -> Result<Self, CoefficientError> {
        if !(0.0..=1.0).contains(&absorption) {
            return Err(CoefficientError::Absorption(absorption));
        }
        if !(0.0..=1.0).contains(&heat_efficiency) {
            return Err(CoefficientError::Efficiency(heat_efficiency));
        }
        if !moderation.is_finite() || moderation < 1.0 {
            return Err(CoefficientError::Moderation(moderation));
        }
        if !heat_conductivity.is_finite() || heat_conductivity < 0.0 {
            return Err(CoefficientError::Conductivity(heat_conductivity));
        }
        Ok(Self {
            absorption: try_fixed64(absorption).ok_or(CoefficientError::Absorption(absorption))?,
            heat_efficiency: try_fixed64(heat_efficiency)
                .ok_or(CoefficientError::Efficiency(heat_efficiency))?,
            moderation: try_fixed64(moderation).ok_or(CoefficientError::Moderation(moderation))?,
            heat_conductivity: try_fixed64(heat_conductivity)
                .ok_or(CoefficientError::Conductivity(heat_conductivity))?,
        })
    }
}

/// A coefficient outside its documented range (NaN and infinities included).
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum CoefficientError {
    #[error("absorption {0} outside [0, 1]")]
    Absorption(f64),
    #[error("heat efficiency {0} outside [0, 1]")]
    Efficiency(f64),
    #[error("moderation {0} outside [1, inf)")]
    Moderation(f64),
    #[error("heat conductivity {0} outside [0, inf)")]
    Conductivity(f64),
}

// ---------------------------------------------------------------------------
// Dataset entries
// ---------------------------------------------------------------------------

/// How a dataset entry's `location` is resolved into concrete materials.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    /// A single material looked up directly.
    Registry,
    /// Every member of a material tag/group.
    Tag,
    /// A single fluid, mapped to the material form it occupies in the world.
    Fluid,
    /// The material forms of every member of a fluid tag/group.
    FluidTag,
}

/// One declarative moderator dataset entry. Coefficients are still in
/// boundary `f64` form; range policy is applied during [`ModeratorRegistry::reload`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModeratorEntry {
    #[serde(rename = "type")]
    pub kind: EntryKind,
    pub location: MaterialId,
    pub absorption: f64,
    pub efficiency: f64,
    pub moderation: f64,
    pub conductivity: f64,
}

impl ModeratorEntry {
    /// Validate this entry's coefficients and convert them to properties.
    pub fn properties(&self) -> Result<ModeratorProperties, CoefficientError> {
        ModeratorProperties::from_coefficients(
            self.absorption,
            self.efficiency,
            self.moderation,
            self.conductivity,
        )
    }
}

// ---------------------------------------------------------------------------
// Resolver
// ---------------------------------------------------------------------------

/// Resolves dataset identifiers against the current world data.
///
/// Supplied by the host's world/data layer; the registry itself knows
/// nothing about concrete world representations. Unknown identifiers
/// resolve to nothing (empty vec / None), never to an error.
pub trait MaterialResolver {
    /// Whether a material with this identifier exists.
    fn material_exists(&self, id: &MaterialId) -> bool;

    /// Members of a material tag. Empty when the tag is unknown or empty.
    fn tag_members(&self, tag: &MaterialId) -> Vec<MaterialId>;

    /// The material form of a fluid, if the fluid exists.
    fn fluid_material(&self, fluid: &MaterialId) -> Option<MaterialId>;

    /// Material forms of every member of a fluid tag. Empty when unknown.
    fn fluid_tag_members(&self, tag: &MaterialId) -> Vec<MaterialId>;
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// The immutable mapping a reload produces. Shared by readers via `Arc`.
pub type ModeratorMap = HashMap<MaterialId, ModeratorProperties>;

/// Outcome counters for one reload pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReloadReport {
    /// Dataset entries examined.
    pub entries_seen: usize,
    /// Distinct materials in the rebuilt mapping.
    pub materials_loaded: usize,
    /// Entries skipped for out-of-range or non-finite coefficients.
    pub skipped_invalid: usize,
    /// Entries whose identifier resolved to no materials.
    pub skipped_unresolved: usize,
}

/// Process-wide moderator registry: read-heavy, write-rare.
///
/// Readers take the read lock only long enough to clone an `Arc` or probe
/// one key; [`ModeratorRegistry::reload`] does all classification work
/// before acquiring the write lock for the swap.
#[derive(Debug)]
pub struct ModeratorRegistry {
    map: RwLock<Arc<ModeratorMap>>,
}

impl Default for ModeratorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ModeratorRegistry {
    /// Create an empty registry. Every lookup yields EMPTY until a reload.
    pub fn new() -> Self {
        Self {
            map: RwLock::new(Arc::new(HashMap::new())),
        }
    }

    /// A cheap handle to the current complete mapping. The simulation takes
    /// one per tick so no cell update can observe a reload mid-tick.
    pub fn snapshot(&self) -> Arc<ModeratorMap> {
        self.map
            .read()
            .expect("moderator registry lock poisoned")
            .clone()
    }

    /// Whether the material has a registered entry. No side effects.
    pub fn is_allowed(&self, material: &MaterialId) -> bool {
        self.map
            .read()
            .expect("moderator registry lock poisoned")
            .contains_key(material)
    }

    /// The registered properties, or [`ModeratorProperties::EMPTY`] for an
    /// unregistered material. Never fails.
    pub fn properties_of(&self, material: &MaterialId) -> ModeratorProperties {
        self.map
            .read()
            .expect("moderator registry lock poisoned")
            .get(material)
            .copied()
            .unwrap_or(ModeratorProperties::EMPTY)
    }

    /// Number of registered materials.
    pub fn len(&self) -> usize {
        self.map
            .read()
            .expect("moderator registry lock poisoned")
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Atomically replace the registry contents from a dataset.
    ///
    /// Later entries silently overwrite earlier ones that resolve to the
    /// same material. Entries with invalid coefficients are skipped and
    /// logged; entries whose identifier resolves to nothing are skipped
    /// silently. Neither aborts the reload.
    pub fn reload<R: MaterialResolver>(
        &self,
        dataset: &[ModeratorEntry],
        resolver: &R,
    ) -> ReloadReport {
        log::info!("loading reactor moderators ({} entries)", dataset.len());
        let mut report = ReloadReport::default();
        let mut next: ModeratorMap = HashMap::new();

        for entry in dataset {
            report.entries_seen += 1;

            let properties = match entry.properties() {
                Ok(p) => p,
                Err(err) => {
                    log::warn!("skipping moderator entry {}: {err}", entry.location);
                    report.skipped_invalid += 1;
                    continue;
                }
            };

            let targets: Vec<MaterialId> = match entry.kind {
                EntryKind::Registry => {
                    if resolver.material_exists(&entry.location) {
                        vec![entry.location.clone()]
                    } else {
                        Vec::new()
                    }
                }
                EntryKind::Tag => resolver.tag_members(&entry.location),
                EntryKind::Fluid => resolver.fluid_material(&entry.location).into_iter().collect(),
                EntryKind::FluidTag => resolver.fluid_tag_members(&entry.location),
            };

            if targets.is_empty() {
                log::debug!("moderator entry {} resolved to nothing", entry.location);
                report.skipped_unresolved += 1;
                continue;
            }

            for material in targets {
                log::debug!("loaded moderator {material}");
                next.insert(material, properties);
            }
        }

        report.materials_loaded = next.len();
        let next = Arc::new(next);
        *self.map.write().expect("moderator registry lock poisoned") = next;
        log::info!("loaded {} moderator materials", report.materials_loaded);
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;

    #[test]
    fn empty_moderator_values() {
        let empty = ModeratorProperties::EMPTY;
        assert_eq!(empty.absorption, fixed(0.0));
        assert_eq!(empty.heat_efficiency, fixed(0.0));
        assert_eq!(empty.moderation, fixed(1.0));
        assert_eq!(empty.heat_conductivity, fixed(0.0));
    }

    #[test]
    fn unregistered_material_yields_empty() {
        let registry = ModeratorRegistry::new();
        assert!(!registry.is_allowed(&mat("dirt")));
        assert_eq!(
            registry.properties_of(&mat("dirt")),
            ModeratorProperties::EMPTY
        );
    }

    #[test]
    fn single_material_entry() {
        let resolver = TableResolver::with_materials(&["stone"]);
        let registry = ModeratorRegistry::new();
        let report = registry.reload(
            &[material_entry("stone", 0.5, 0.5, 2.0, 1.0)],
            &resolver,
        );

        assert_eq!(report.materials_loaded, 1);
        assert!(registry.is_allowed(&mat("stone")));
        let props = registry.properties_of(&mat("stone"));
        assert_eq!(props.absorption, fixed(0.5));
        assert_eq!(props.heat_efficiency, fixed(0.5));
        assert_eq!(props.moderation, fixed(2.0));
        assert_eq!(props.heat_conductivity, fixed(1.0));
        // Anything else stays inert.
        assert_eq!(
            registry.properties_of(&mat("dirt")),
            ModeratorProperties::EMPTY
        );
    }

    #[test]
    fn later_entries_win() {
        let resolver = TableResolver::with_materials(&["stone"]);
        let registry = ModeratorRegistry::new();
        registry.reload(
            &[
                material_entry("stone", 0.1, 0.1, 1.0, 0.5),
                material_entry("stone", 0.9, 0.2, 3.0, 2.0),
            ],
            &resolver,
        );
        assert_eq!(registry.properties_of(&mat("stone")).absorption, fixed(0.9));
    }

    #[test]
    fn tag_entry_fans_out_to_members() {
        let mut resolver = TableResolver::new();
        resolver.add_tag("forge:graphite", &["graphite_block", "graphite_brick"]);
        let registry = ModeratorRegistry::new();
        let report = registry.reload(
            &[entry(EntryKind::Tag, "forge:graphite", 0.1, 0.5, 1.9, 2.0)],
            &resolver,
        );

        assert_eq!(report.materials_loaded, 2);
        assert!(registry.is_allowed(&mat("graphite_block")));
        assert!(registry.is_allowed(&mat("graphite_brick")));
        assert_eq!(
            registry.properties_of(&mat("graphite_block")),
            registry.properties_of(&mat("graphite_brick"))
        );
    }

    #[test]
    fn fluid_entry_resolves_to_material_form() {
        let mut resolver = TableResolver::new();
        resolver.add_fluid("water", "water_block");
        let registry = ModeratorRegistry::new();
        registry.reload(
            &[entry(EntryKind::Fluid, "water", 0.33, 0.5, 1.33, 3.0)],
            &resolver,
        );

        assert!(registry.is_allowed(&mat("water_block")));
        // The fluid identifier itself is not a material.
        assert!(!registry.is_allowed(&mat("water")));
    }

    #[test]
    fn fluid_tag_entry_fans_out() {
        let mut resolver = TableResolver::new();
        resolver.add_fluid_tag("forge:coolants", &["water_block", "cryo_block"]);
        let registry = ModeratorRegistry::new();
        let report = registry.reload(
            &[entry(EntryKind::FluidTag, "forge:coolants", 0.4, 0.6, 1.1, 4.0)],
            &resolver,
        );
        assert_eq!(report.materials_loaded, 2);
    }

    #[test]
    fn unresolvable_entries_are_skipped_not_fatal() {
        let resolver = TableResolver::with_materials(&["stone"]);
        let registry = ModeratorRegistry::new();
        let report = registry.reload(
            &[
                material_entry("missing", 0.5, 0.5, 2.0, 1.0),
                entry(EntryKind::Tag, "no_such_tag", 0.5, 0.5, 2.0, 1.0),
                material_entry("stone", 0.5, 0.5, 2.0, 1.0),
            ],
            &resolver,
        );

        assert_eq!(report.entries_seen, 3);
        assert_eq!(report.skipped_unresolved, 2);
        assert_eq!(report.materials_loaded, 1);
        assert!(registry.is_allowed(&mat("stone")));
    }

    #[test]
    fn invalid_coefficients_are_skipped() {
        let resolver = TableResolver::with_materials(&["a", "b", "c", "d", "e"]);
        let registry = ModeratorRegistry::new();
        let report = registry.reload(
            &[
                material_entry("a", -0.1, 0.5, 2.0, 1.0), // absorption < 0
                material_entry("b", 0.5, 1.5, 2.0, 1.0),  // efficiency > 1
                material_entry("c", 0.5, 0.5, 0.9, 1.0),  // moderation < 1
                material_entry("d", 0.5, 0.5, 2.0, -1.0), // conductivity < 0
                material_entry("e", f64::NAN, 0.5, 2.0, 1.0),
            ],
            &resolver,
        );

        assert_eq!(report.skipped_invalid, 5);
        assert_eq!(report.materials_loaded, 0);
        assert!(registry.is_empty());
    }

    #[test]
    fn infinite_moderation_is_rejected() {
        let err = ModeratorProperties::from_coefficients(0.0, 0.0, f64::INFINITY, 0.0);
        assert!(matches!(err, Err(CoefficientError::Moderation(_))));
    }

    #[test]
    fn reload_replaces_prior_contents() {
        let resolver = TableResolver::with_materials(&["stone", "graphite"]);
        let registry = ModeratorRegistry::new();
        registry.reload(&[material_entry("stone", 0.5, 0.5, 2.0, 1.0)], &resolver);
        registry.reload(&[material_entry("graphite", 0.1, 0.5, 1.9, 2.0)], &resolver);

        assert!(!registry.is_allowed(&mat("stone")));
        assert!(registry.is_allowed(&mat("graphite")));
    }

    #[test]
    fn snapshot_outlives_reload() {
        let resolver = TableResolver::with_materials(&["stone", "graphite"]);
        let registry = ModeratorRegistry::new();
        registry.reload(&[material_entry("stone", 0.5, 0.5, 2.0, 1.0)], &resolver);

        let before = registry.snapshot();
        registry.reload(&[material_entry("graphite", 0.1, 0.5, 1.9, 2.0)], &resolver);

        // A reader holding the old mapping still sees it complete.
        assert!(before.contains_key(&mat("stone")));
        assert!(!before.contains_key(&mat("graphite")));
        let after = registry.snapshot();
        assert!(after.contains_key(&mat("graphite")));
        assert!(!after.contains_key(&mat("stone")));
    }

    #[test]
    fn reload_report_counts_are_consistent() {
        let mut resolver = TableResolver::with_materials(&["stone"]);
        resolver.add_tag("tag", &["m1", "m2"]);
        let registry = ModeratorRegistry::new();
        let report = registry.reload(
            &[
                material_entry("stone", 0.5, 0.5, 2.0, 1.0),
                entry(EntryKind::Tag, "tag", 0.1, 0.1, 1.1, 1.0),
                material_entry("stone", 2.0, 0.5, 2.0, 1.0), // invalid, does not clobber
            ],
            &resolver,
        );

        assert_eq!(report.entries_seen, 3);
        assert_eq!(report.skipped_invalid, 1);
        assert_eq!(report.skipped_unresolved, 0);
        assert_eq!(report.materials_loaded, 3);
        // The invalid third entry left the first one in place.
        assert_eq!(registry.properties_of(&mat("stone")).absorption, fixed(0.5));
    }
}
