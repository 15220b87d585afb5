//! Fissile Core -- a simulated nuclear-fission reactor.
//!
//! This crate provides the moderator registry (world materials classified by
//! their neutron-physics coefficients), the fuel rod cell state machine
//! (fuel burned into waste, heat produced), and the reactor lattice that
//! ties them together with neutron radiation paths and a heat-conduction
//! network.
//!
//! # Two-Phase Tick
//!
//! Each call to [`lattice::ReactorLattice::step`] advances the simulation by
//! one step:
//!
//! 1. **Burn** -- Every fuel rod advances its clock, walks its radiation
//!    rays through neighboring moderators (absorption heats the absorber,
//!    transmitted flux is moderated, escaping flux is lost), and converts
//!    fuel into waste and heat at the resulting rate.
//! 2. **Conduction** -- Thermal energy moves between linked cells
//!    proportional to the product of their conductivities and the heat
//!    differential, read-then-commit so results are order-independent.
//!
//! # Key Types
//!
//! - [`moderator::ModeratorRegistry`] -- Rebuildable material -> coefficient
//!   mapping with atomic reload and lock-light concurrent reads.
//! - [`rod::FuelRodCell`] -- Per-position fuel/waste state with exact
//!   conservation across every update step.
//! - [`lattice::ReactorLattice`] -- Cell arena, conduction adjacency, and
//!   radiation rays; the per-tick update pipeline.
//! - [`sync`] -- Compact registry snapshot wire format (bitcode) and the
//!   replace-on-receipt client cache behind the tooltip boundary.
//! - [`fixed::Fixed64`] -- Q32.32 fixed-point type for deterministic math.

#[cfg(feature = "data-loader")]
pub mod data_loader;
pub mod fixed;
pub mod id;
pub mod lattice;
pub mod moderator;
pub mod rod;
pub mod sync;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
