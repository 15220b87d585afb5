use serde::{Deserialize, Serialize};
use slotmap::new_key_type;
use std::fmt;

new_key_type! {
    /// Identifies a cell in the reactor lattice.
    pub struct CellId;
}

/// Identifies a world material by its resource location, e.g.
/// `"minecraft:graphite"`. The registry, snapshot wire format, and
/// persistence boundary all carry the identifier text, so this stays a
/// string rather than a dense index.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MaterialId(pub String);

impl MaterialId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MaterialId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MaterialId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for MaterialId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn material_id_equality() {
        assert_eq!(MaterialId::from("stone"), MaterialId::new("stone"));
        assert_ne!(MaterialId::from("stone"), MaterialId::from("dirt"));
    }

    #[test]
    fn material_ids_are_hashable() {
        use std::collections::HashMap;
        let mut map = HashMap::new();
        map.insert(MaterialId::from("graphite"), 1);
        assert_eq!(map[&MaterialId::from("graphite")], 1);
    }

    #[test]
    fn material_id_displays_as_location() {
        let id = MaterialId::from("minecraft:graphite");
        assert_eq!(id.to_string(), "minecraft:graphite");
    }
}
