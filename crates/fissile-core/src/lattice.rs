//! Reactor lattice: the per-tick simulation over a set of interacting cells.
//!
//! Cells are fuel rods, moderator materials, or coolant. Topology is
//! explicit: `link` builds the undirected heat-conduction adjacency and
//! `set_rays` gives each rod its ordered radiation paths through
//! neighboring cells.
//!
//! # Step algorithm
//!
//! For each call to [`ReactorLattice::step`]:
//!
//! 1. **Burn** (per fuel rod): elapsed ticks are computed from the rod's
//!    clock (clamped to at least 1, updated unconditionally). A burning rod
//!    walks each radiation ray with one unit of entering flux: every cell on
//!    the ray absorbs `flux * absorption` (heating that cell by the absorbed
//!    amount scaled by its heat efficiency), transmits the remainder, and
//!    the transmitted flux accrues a moderation bonus
//!    `transmitted * (moderation - 1)`. Flux exiting the last ray cell
//!    escapes the structure and is lost. The effective burn rate is
//!    `base_burn_rate * (1 + mean ray bonus)`; the fractional part of
//!    `rate * elapsed` is carried in the rod's burn debt. Burned units move
//!    from fuel to waste one-for-one and deposit heat at the rod.
//! 2. **Conduction** (two-phase): phase 1 reads every cell's prior heat and
//!    computes pairwise flows from the prior state only; phase 2 commits
//!    the deltas. Per pair, flow = differential * rate where the rate is
//!    proportional to the product of the two conductivities and capped at
//!    `1 / (2 * max(degree))`, so a single flow moves at most half its
//!    differential and a cell's committed heat stays within the min/max of
//!    its prior closed neighborhood. Conduction conserves total heat.

use crate::fixed::{Fixed64, Ticks};
use crate::id::{CellId, MaterialId};
use crate::moderator::{ModeratorMap, ModeratorProperties};
use crate::rod::FuelRodCell;
use serde::{Deserialize, Serialize};
use slotmap::{SecondaryMap, SlotMap};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Configuration-provided simulation constants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatticeConfig {
    /// Base fuel burn rate in units per tick, before moderation.
    pub base_burn_rate: Fixed64,
    /// Heat released by burning one unit of fuel.
    pub energy_per_unit: Fixed64,
    /// Fraction of burn energy deposited at the rod itself.
    pub rod_heat_fraction: Fixed64,
    /// Heat carried per unit of flux absorbed by a moderator, per burned unit.
    pub flux_energy: Fixed64,
    /// Heat conductivity of fuel rod cells. Idle rods conduct too.
    pub rod_conductivity: Fixed64,
    /// Global scaling applied to pairwise conduction rates.
    pub conduction_rate: Fixed64,
}

impl Default for LatticeConfig {
    fn default() -> Self {
        Self {
            base_burn_rate: Fixed64::ONE,
            energy_per_unit: Fixed64::from_num(10),
            rod_heat_fraction: Fixed64::from_num(0.5),
            flux_energy: Fixed64::ONE,
            rod_conductivity: Fixed64::ONE,
            conduction_rate: Fixed64::from_num(0.1),
        }
    }
}

// ---------------------------------------------------------------------------
// Cells
// ---------------------------------------------------------------------------

/// What occupies a lattice position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CellKind {
    /// Burns fuel into waste and produces heat.
    FuelRod(FuelRodCell),
    /// Passive material; coefficients resolved through the moderator
    /// registry each tick. Unregistered materials behave as EMPTY.
    Moderator(MaterialId),
    /// Heat-absorbing boundary medium. Heat conducted into it accumulates
    /// until the host drains it via [`ReactorLattice::extract_heat`].
    Coolant { conductivity: Fixed64 },
}

/// One lattice position: its occupant and its thermal reservoir.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cell {
    pub kind: CellKind,
    pub heat: Fixed64,
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Events emitted by a simulation step. Fired on transitions only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReactorEvent {
    /// A rod burned its last fuel unit this step (Burning -> Idle).
    RodDepleted { cell: CellId, tick: Ticks },
}

// ---------------------------------------------------------------------------
// State hash
// ---------------------------------------------------------------------------

/// A simple deterministic hash of lattice state for desync detection.
///
/// Uses FNV-1a (64-bit) for speed and simplicity. Not cryptographic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateHash(pub u64);

impl StateHash {
    const FNV_OFFSET: u64 = 0xcbf29ce484222325;
    const FNV_PRIME: u64 = 0x100000001b3;

    pub fn new() -> Self {
        Self(Self::FNV_OFFSET)
    }

    pub fn write(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.0 ^= b as u64;
            self.0 = self.0.wrapping_mul(Self::FNV_PRIME);
        }
    }

    pub fn write_u64(&mut self, v: u64) {
        self.write(&v.to_le_bytes());
    }

    pub fn write_fixed64(&mut self, v: Fixed64) {
        self.write(&v.to_bits().to_le_bytes());
    }

    pub fn finish(self) -> u64 {
        self.0
    }
}

impl Default for StateHash {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Lattice
// ---------------------------------------------------------------------------

/// The simulated reactor interior: cell arena, conduction adjacency, and
/// per-rod radiation rays.
///
/// Registry access is injected: [`ReactorLattice::step`] takes the moderator
/// mapping for the whole tick, so a concurrent registry reload can never be
/// observed mid-update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReactorLattice {
    pub config: LatticeConfig,
    cells: SlotMap<CellId, Cell>,
    /// Undirected conduction adjacency; both directions stored.
    neighbors: SecondaryMap<CellId, Vec<CellId>>,
    /// Ordered radiation paths out of each fuel rod.
    rays: SecondaryMap<CellId, Vec<Vec<CellId>>>,
}

impl ReactorLattice {
    pub fn new(config: LatticeConfig) -> Self {
        Self {
            config,
            cells: SlotMap::with_key(),
            neighbors: SecondaryMap::new(),
            rays: SecondaryMap::new(),
        }
    }

    // -- topology ----------------------------------------------------------

    /// Add a fuel rod cell pre-loaded with `fuel` units.
    pub fn add_fuel_rod(&mut self, fuel: u64, now: Ticks) -> CellId {
        self.cells.insert(Cell {
            kind: CellKind::FuelRod(FuelRodCell::with_fuel(fuel, now)),
            heat: Fixed64::ZERO,
        })
    }

    /// Add a moderator cell occupied by `material`.
    pub fn add_moderator(&mut self, material: MaterialId) -> CellId {
        self.cells.insert(Cell {
            kind: CellKind::Moderator(material),
            heat: Fixed64::ZERO,
        })
    }

    /// Add a coolant cell with the given conductivity.
    pub fn add_coolant(&mut self, conductivity: Fixed64) -> CellId {
        self.cells.insert(Cell {
            kind: CellKind::Coolant { conductivity },
            heat: Fixed64::ZERO,
        })
    }

    /// Remove a cell and every reference to it. Rays simply skip the
    /// removed position.
    pub fn remove_cell(&mut self, cell: CellId) {
        self.cells.remove(cell);
        self.neighbors.remove(cell);
        self.rays.remove(cell);
        for list in self.neighbors.values_mut() {
            list.retain(|&c| c != cell);
        }
        for rays in self.rays.values_mut() {
            for ray in rays.iter_mut() {
                ray.retain(|&c| c != cell);
            }
        }
    }

    /// Link two cells for heat conduction (undirected, idempotent).
    pub fn link(&mut self, a: CellId, b: CellId) {
        if a == b || !self.cells.contains_key(a) || !self.cells.contains_key(b) {
            return;
        }
        if let Some(entry) = self.neighbors.entry(a) {
            let list = entry.or_default();
            if !list.contains(&b) {
                list.push(b);
            }
        }
        if let Some(entry) = self.neighbors.entry(b) {
            let list = entry.or_default();
            if !list.contains(&a) {
                list.push(a);
            }
        }
    }

    /// Set the ordered radiation paths out of a fuel rod.
    pub fn set_rays(&mut self, rod: CellId, rays: Vec<Vec<CellId>>) {
        if self.cells.contains_key(rod) {
            self.rays.insert(rod, rays);
        }
    }

    // -- accessors ---------------------------------------------------------

    pub fn cell(&self, id: CellId) -> Option<&Cell> {
        self.cells.get(id)
    }

    pub fn cell_mut(&mut self, id: CellId) -> Option<&mut Cell> {
        self.cells.get_mut(id)
    }

    pub fn fuel_rod(&self, id: CellId) -> Option<&FuelRodCell> {
        match self.cells.get(id) {
            Some(Cell {
                kind: CellKind::FuelRod(rod),
                ..
            }) => Some(rod),
            _ => None,
        }
    }

    pub fn fuel_rod_mut(&mut self, id: CellId) -> Option<&mut FuelRodCell> {
        match self.cells.get_mut(id) {
            Some(Cell {
                kind: CellKind::FuelRod(rod),
                ..
            }) => Some(rod),
            _ => None,
        }
    }

    /// Thermal reservoir of a cell; zero for unknown ids.
    pub fn heat(&self, id: CellId) -> Fixed64 {
        self.cells.get(id).map_or(Fixed64::ZERO, |c| c.heat)
    }

    /// External refuel boundary. Returns false if the cell is not a rod.
    pub fn refuel(&mut self, cell: CellId, units: u64) -> bool {
        match self.fuel_rod_mut(cell) {
            Some(rod) => {
                rod.refuel(units);
                true
            }
            None => false,
        }
    }

    /// Drain up to `max` heat from a cell (output boundary; typically a
    /// coolant cell). Returns the heat actually removed.
    pub fn extract_heat(&mut self, cell: CellId, max: Fixed64) -> Fixed64 {
        let Some(c) = self.cells.get_mut(cell) else {
            return Fixed64::ZERO;
        };
        let take = c.heat.min(max).max(Fixed64::ZERO);
        c.heat -= take;
        take
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Sum of every cell's thermal reservoir. Conduction preserves this.
    pub fn total_heat(&self) -> Fixed64 {
        self.cells
            .values()
            .fold(Fixed64::ZERO, |acc, c| acc + c.heat)
    }

    // -- simulation --------------------------------------------------------

    /// Advance every cell by one step at tick `now`.
    ///
    /// `moderators` is the registry mapping for this whole tick; take it via
    /// `ModeratorRegistry::snapshot()` once per tick.
    pub fn step(&mut self, now: Ticks, moderators: &ModeratorMap) -> Vec<ReactorEvent> {
        let mut events = Vec::new();
        self.burn_phase(now, moderators, &mut events);
        self.conduction_phase(moderators);
        events
    }

    fn burn_phase(&mut self, now: Ticks, moderators: &ModeratorMap, events: &mut Vec<ReactorEvent>) {
        let rod_ids: Vec<CellId> = self
            .cells
            .iter()
            .filter(|(_, c)| matches!(c.kind, CellKind::FuelRod(_)))
            .map(|(id, _)| id)
            .collect();

        for rod_id in rod_ids {
            let elapsed = {
                let Some(cell) = self.cells.get_mut(rod_id) else {
                    continue;
                };
                let CellKind::FuelRod(rod) = &mut cell.kind else {
                    continue;
                };
                let elapsed = rod.advance_clock(now);
                if rod.is_idle() {
                    // Idle rods keep their clock current but burn nothing;
                    // they still participate in conduction below.
                    continue;
                }
                elapsed
            };

            // Walk radiation rays against the prior lattice state: unit flux
            // in, absorption heats the absorber, transmitted flux accrues
            // the moderation bonus, whatever exits the last cell escapes.
            let mut bonus_sum = Fixed64::ZERO;
            let mut ray_count: u32 = 0;
            // (cell, heat per burned unit)
            let mut deposits: Vec<(CellId, Fixed64)> = Vec::new();
            if let Some(rays) = self.rays.get(rod_id) {
                for ray in rays {
                    ray_count += 1;
                    let mut flux = Fixed64::ONE;
                    for &target in ray {
                        if flux <= Fixed64::ZERO {
                            break;
                        }
                        let props = self.ray_properties(target, moderators);
                        let absorbed = flux * props.absorption;
                        if absorbed > Fixed64::ZERO {
                            let per_unit = absorbed
                                .saturating_mul(props.heat_efficiency)
                                .saturating_mul(self.config.flux_energy);
                            deposits.push((target, per_unit));
                        }
                        flux -= absorbed;
                        bonus_sum = bonus_sum
                            .saturating_add(flux.saturating_mul(props.moderation - Fixed64::ONE));
                    }
                }
            }
            let bonus = if ray_count > 0 {
                bonus_sum / Fixed64::from_num(ray_count)
            } else {
                Fixed64::ZERO
            };

            let rate = self
                .config
                .base_burn_rate
                .saturating_mul(Fixed64::ONE.saturating_add(bonus));

            let burned = {
                let Some(cell) = self.cells.get_mut(rod_id) else {
                    continue;
                };
                let CellKind::FuelRod(rod) = &mut cell.kind else {
                    continue;
                };
                let budget = rate
                    .saturating_mul(Fixed64::saturating_from_num(elapsed))
                    .saturating_add(rod.burn_debt)
                    .max(Fixed64::ZERO);
                let whole: u64 = budget.int().to_num();
                let burned = rod.burn(whole);
                rod.burn_debt = budget.frac();
                if rod.is_idle() {
                    // Depleted: leftover debt is meaningless without fuel.
                    rod.burn_debt = Fixed64::ZERO;
                    if burned > 0 {
                        events.push(ReactorEvent::RodDepleted {
                            cell: rod_id,
                            tick: now,
                        });
                    }
                }
                burned
            };

            if burned == 0 {
                continue;
            }
            let burned_fx = Fixed64::saturating_from_num(burned);

            // Heat from the burn itself, deposited at the rod.
            if let Some(cell) = self.cells.get_mut(rod_id) {
                cell.heat = cell.heat.saturating_add(
                    self.config
                        .energy_per_unit
                        .saturating_mul(burned_fx)
                        .saturating_mul(self.config.rod_heat_fraction),
                );
            }

            // Heat from absorbed flux, deposited at the absorbing cells.
            for (target, per_unit) in deposits {
                if let Some(cell) = self.cells.get_mut(target) {
                    cell.heat = cell.heat.saturating_add(per_unit.saturating_mul(burned_fx));
                }
            }
        }
    }

    /// Coefficients a radiation ray sees at `target`. Moderator cells use
    /// the registry mapping; everything else (rods, coolant, removed cells)
    /// is an inert pass-through.
    fn ray_properties(&self, target: CellId, moderators: &ModeratorMap) -> ModeratorProperties {
        match self.cells.get(target).map(|c| &c.kind) {
            Some(CellKind::Moderator(material)) => moderators
                .get(material)
                .copied()
                .unwrap_or(ModeratorProperties::EMPTY),
            _ => ModeratorProperties::EMPTY,
        }
    }

    fn conductivity_of(&self, cell: &Cell, moderators: &ModeratorMap) -> Fixed64 {
        match &cell.kind {
            CellKind::FuelRod(_) => self.config.rod_conductivity,
            CellKind::Moderator(material) => moderators
                .get(material)
                .map_or(ModeratorProperties::EMPTY.heat_conductivity, |p| {
                    p.heat_conductivity
                }),
            CellKind::Coolant { conductivity } => *conductivity,
        }
    }

    fn conduction_phase(&mut self, moderators: &ModeratorMap) {
        // Phase 1: read prior heat, conductivity, and degree for every cell.
        let mut prior: SecondaryMap<CellId, (Fixed64, Fixed64, usize)> = SecondaryMap::new();
        for (id, cell) in self.cells.iter() {
            let conductivity = self.conductivity_of(cell, moderators);
            let degree = self.neighbors.get(id).map_or(0, |n| n.len());
            prior.insert(id, (cell.heat, conductivity, degree));
        }

        let mut delta: SecondaryMap<CellId, Fixed64> = SecondaryMap::new();
        for id in self.cells.keys() {
            delta.insert(id, Fixed64::ZERO);
        }

        // Phase 1b: pairwise flows from the prior state only. Each
        // undirected pair is visited once via the key ordering.
        for (a, list) in self.neighbors.iter() {
            for &b in list {
                if b <= a {
                    continue;
                }
                let Some(&(heat_a, cond_a, deg_a)) = prior.get(a) else {
                    continue;
                };
                let Some(&(heat_b, cond_b, deg_b)) = prior.get(b) else {
                    continue;
                };
                let k = cond_a
                    .saturating_mul(cond_b)
                    .saturating_mul(self.config.conduction_rate);
                if k <= Fixed64::ZERO {
                    continue;
                }
                // Degree-aware cap: a single flow moves at most half its
                // differential, and a cell's combined exchange keeps its
                // committed heat within its prior neighborhood min/max.
                // Inflow from third-party neighbors can still flip an
                // individual pair's differential.
                let max_deg = deg_a.max(deg_b).max(1);
                let cap = Fixed64::ONE / Fixed64::from_num(2 * max_deg);
                let rate = k.min(cap);
                let flow = (heat_a - heat_b).saturating_mul(rate);
                if let Some(d) = delta.get_mut(a) {
                    *d -= flow;
                }
                if let Some(d) = delta.get_mut(b) {
                    *d += flow;
                }
            }
        }

        // Phase 2: commit.
        for (id, cell) in self.cells.iter_mut() {
            if let Some(d) = delta.get(id) {
                cell.heat = cell.heat.saturating_add(*d);
            }
        }
    }

    /// Deterministic hash of fuel, waste, and heat across all cells, for
    /// desync detection between replicas stepped identically.
    pub fn state_hash(&self) -> u64 {
        let mut hash = StateHash::new();
        for (_, cell) in self.cells.iter() {
            match &cell.kind {
                CellKind::FuelRod(rod) => {
                    hash.write_u64(0);
                    hash.write_u64(rod.fuel);
                    hash.write_u64(rod.waste);
                }
                CellKind::Moderator(material) => {
                    hash.write_u64(1);
                    hash.write(material.as_str().as_bytes());
                }
                CellKind::Coolant { conductivity } => {
                    hash.write_u64(2);
                    hash.write_fixed64(*conductivity);
                }
            }
            hash.write_fixed64(cell.heat);
        }
        hash.finish()
    }
}
