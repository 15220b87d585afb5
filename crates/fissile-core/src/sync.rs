//! Moderator snapshot distribution.
//!
//! After a reload the authoritative side encodes its complete mapping as a
//! compact bitcode payload behind a validated header; a remote observer
//! replaces its local cache wholesale on receipt. The handler is idempotent
//! and tolerates receiving a snapshot at any time, including before first
//! use -- an empty cache simply classifies nothing as a moderator.

use crate::fixed::fixed64_to_f64;
use crate::id::MaterialId;
use crate::moderator::{ModeratorMap, ModeratorProperties};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Magic number identifying a moderator snapshot payload.
pub const SNAPSHOT_MAGIC: u32 = 0xF155_0001;

/// Current wire format version. Increment when breaking the format.
pub const FORMAT_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that can occur encoding or decoding a snapshot.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("invalid magic number: expected 0x{:08X}, got 0x{:08X}", SNAPSHOT_MAGIC, .0)]
    InvalidMagic(u32),
    #[error("unsupported format version: expected {}, got {}", FORMAT_VERSION, .0)]
    UnsupportedVersion(u32),
    #[error("bitcode encoding failed: {0}")]
    Encode(String),
    #[error("bitcode decoding failed: {0}")]
    Decode(String),
}

// ---------------------------------------------------------------------------
// Wire format
// ---------------------------------------------------------------------------

/// Header prepended to every snapshot. Enables format detection before the
/// receiving side trusts the payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotHeader {
    pub magic: u32,
    pub version: u32,
}

impl SnapshotHeader {
    pub fn new() -> Self {
        Self {
            magic: SNAPSHOT_MAGIC,
            version: FORMAT_VERSION,
        }
    }

    pub fn validate(&self) -> Result<(), SnapshotError> {
        if self.magic != SNAPSHOT_MAGIC {
            return Err(SnapshotError::InvalidMagic(self.magic));
        }
        if self.version != FORMAT_VERSION {
            return Err(SnapshotError::UnsupportedVersion(self.version));
        }
        Ok(())
    }
}

impl Default for SnapshotHeader {
    fn default() -> Self {
        Self::new()
    }
}

/// A complete, self-contained copy of registry contents. Entry order is
/// not significant; the receiver replaces its cache wholesale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModeratorSnapshot {
    pub header: SnapshotHeader,
    /// (material identifier, [absorption, heat efficiency, moderation,
    /// heat conductivity])
    pub entries: Vec<(String, [f64; 4])>,
}

/// Encode the current registry mapping as a snapshot payload.
pub fn encode_snapshot(map: &ModeratorMap) -> Result<Vec<u8>, SnapshotError> {
    let entries = map
        .iter()
        .map(|(material, props)| {
            (
                material.to_string(),
                [
                    fixed64_to_f64(props.absorption),
                    fixed64_to_f64(props.heat_efficiency),
                    fixed64_to_f64(props.moderation),
                    fixed64_to_f64(props.heat_conductivity),
                ],
            )
        })
        .collect();
    let snapshot = ModeratorSnapshot {
        header: SnapshotHeader::new(),
        entries,
    };
    bitcode::serialize(&snapshot).map_err(|e| SnapshotError::Encode(e.to_string()))
}

/// Decode and validate a snapshot payload.
pub fn decode_snapshot(data: &[u8]) -> Result<ModeratorSnapshot, SnapshotError> {
    let snapshot: ModeratorSnapshot =
        bitcode::deserialize(data).map_err(|e| SnapshotError::Decode(e.to_string()))?;
    snapshot.header.validate()?;
    Ok(snapshot)
}

// ---------------------------------------------------------------------------
// Client cache
// ---------------------------------------------------------------------------

/// Observer-side moderator cache. Populated only by snapshots; backs the
/// tooltip/UI boundary and has no simulation effect.
#[derive(Debug, Default)]
pub struct ClientModeratorCache {
    map: HashMap<MaterialId, ModeratorProperties>,
}

impl ClientModeratorCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the cache wholesale with a received snapshot.
    ///
    /// Idempotent: applying the same payload twice is a no-op. Entries with
    /// invalid coefficients are skipped under the same policy as a reload,
    /// so a malformed upstream can never inject NaN into the cache. Returns
    /// the number of materials now cached.
    pub fn apply(&mut self, data: &[u8]) -> Result<usize, SnapshotError> {
        let snapshot = decode_snapshot(data)?;
        log::debug!(
            "received moderator snapshot with {} entries",
            snapshot.entries.len()
        );

        let mut next = HashMap::with_capacity(snapshot.entries.len());
        for (material, [absorption, efficiency, moderation, conductivity]) in snapshot.entries {
            let material = MaterialId::from(material);
            match ModeratorProperties::from_coefficients(
                absorption,
                efficiency,
                moderation,
                conductivity,
            ) {
                Ok(props) => {
                    next.insert(material, props);
                }
                Err(err) => {
                    log::warn!("ignoring snapshot moderator {material}: {err}");
                }
            }
        }
        self.map = next;
        Ok(self.map.len())
    }

    /// Tooltip boundary: whether this material is a recognized moderator.
    pub fn is_known_moderator(&self, material: &MaterialId) -> bool {
        self.map.contains_key(material)
    }

    /// Cached properties, or EMPTY for anything not in the last snapshot.
    pub fn properties_of(&self, material: &MaterialId) -> ModeratorProperties {
        self.map
            .get(material)
            .copied()
            .unwrap_or(ModeratorProperties::EMPTY)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&MaterialId, &ModeratorProperties)> {
        self.map.iter()
    }
}
