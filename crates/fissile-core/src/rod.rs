//! Fuel rod cell state: fissile fuel burned into radioactive waste.
//!
//! A rod is Idle when `fuel == 0` and Burning otherwise. Fuel is
//! monotonically non-increasing except through [`FuelRodCell::refuel`];
//! every burn moves exactly as many units into `waste` as it removes from
//! `fuel`, so `fuel + waste` is conserved across any update step.

use crate::fixed::{Fixed64, Ticks};
use serde::{Deserialize, Serialize};

/// Mutable per-position fuel state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FuelRodCell {
    /// Remaining fissile material, in discrete units.
    pub fuel: u64,
    /// Accumulated spent material, same unit scale as `fuel`.
    pub waste: u64,
    /// Simulation tick at which this cell was last advanced.
    pub last_checked_tick: Ticks,
    /// Fractional burn carried between steps so sub-unit burn rates still
    /// make progress. Not persisted; re-derived as zero on load.
    #[serde(skip)]
    pub burn_debt: Fixed64,
}

impl FuelRodCell {
    /// A fresh, empty (Idle) rod.
    pub fn new(now: Ticks) -> Self {
        Self {
            fuel: 0,
            waste: 0,
            last_checked_tick: now,
            burn_debt: Fixed64::ZERO,
        }
    }

    /// A rod pre-loaded with fuel.
    pub fn with_fuel(fuel: u64, now: Ticks) -> Self {
        Self {
            fuel,
            ..Self::new(now)
        }
    }

    /// Idle rods burn nothing and produce no heat, but still conduct.
    pub fn is_idle(&self) -> bool {
        self.fuel == 0
    }

    /// Conserved across every update step.
    pub fn total_units(&self) -> u64 {
        self.fuel + self.waste
    }

    /// Elapsed ticks since the last update, clamped to at least 1 so
    /// same-tick re-entry still makes forward progress. Updates
    /// `last_checked_tick` unconditionally, idle rods included, so
    /// elapsed-tick accounting never drifts.
    pub fn advance_clock(&mut self, now: Ticks) -> Ticks {
        let elapsed = now.saturating_sub(self.last_checked_tick).max(1);
        self.last_checked_tick = now;
        elapsed
    }

    /// Move up to `amount` units from fuel to waste, clamped to remaining
    /// fuel. Returns the units actually burned.
    pub fn burn(&mut self, amount: u64) -> u64 {
        let burned = amount.min(self.fuel);
        self.fuel -= burned;
        self.waste += burned;
        burned
    }

    /// External refuel boundary. Transitions Idle -> Burning when units > 0.
    pub fn refuel(&mut self, units: u64) {
        self.fuel = self.fuel.saturating_add(units);
    }

    /// External drain boundary: removes and returns all accumulated waste.
    pub fn extract_waste(&mut self) -> u64 {
        std::mem::take(&mut self.waste)
    }

    /// The persisted view: exactly the two non-negative integers the save
    /// format carries.
    pub fn persisted(&self) -> PersistedRod {
        PersistedRod {
            fuel: self.fuel,
            waste: self.waste,
        }
    }

    /// Restore from persisted state. The clock is stamped with the current
    /// tick so a reloaded rod sees no elapsed time.
    pub fn from_persisted(persisted: PersistedRod, now: Ticks) -> Self {
        Self {
            fuel: persisted.fuel,
            waste: persisted.waste,
            last_checked_tick: now,
            burn_debt: Fixed64::ZERO,
        }
    }
}

/// Persistence boundary: the two integers written to the save format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedRod {
    pub fuel: u64,
    pub waste: u64,
}
