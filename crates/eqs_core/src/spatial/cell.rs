/// A single cell of the spatial grid
use crate::types::{GridCoord, ObjectId, Vec3};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// One discrete unit of the grid.
///
/// Ordered collections keep hashing and serialization deterministic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cell {
    /// Lattice point of the cell, `origin + coord * cell_size`
    pub world_position: Vec3,
    /// Integer coordinate of the cell
    pub indices: GridCoord,
    /// Set once during environment build
    pub static_occupancy: bool,
    /// Dynamic objects whose position falls in this cell
    pub dynamic_occupants: BTreeSet<ObjectId>,
    /// Arbitrary host-provided metadata
    pub properties: BTreeMap<String, serde_json::Value>,
}

impl Cell {
    pub fn new(world_position: Vec3, indices: GridCoord) -> Self {
        Self {
            world_position,
            indices,
            static_occupancy: false,
            dynamic_occupants: BTreeSet::new(),
            properties: BTreeMap::new(),
        }
    }

    /// True when the cell holds neither static geometry nor dynamic objects.
    pub fn is_free(&self) -> bool {
        !self.static_occupancy && self.dynamic_occupants.is_empty()
    }

    /// Numeric view of a property, if present and numeric (booleans map to 0/1).
    pub fn numeric_property(&self, key: &str) -> Option<f64> {
        match self.properties.get(key)? {
            serde_json::Value::Number(n) => n.as_f64(),
            serde_json::Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_property() {
        let mut cell = Cell::new(Vec3::ZERO, GridCoord::new(0, 0, 0));
        cell.properties.insert("cost".into(), serde_json::json!(2.5));
        cell.properties.insert("walkable".into(), serde_json::json!(true));
        cell.properties.insert("label".into(), serde_json::json!("grass"));

        assert_eq!(cell.numeric_property("cost"), Some(2.5));
        assert_eq!(cell.numeric_property("walkable"), Some(1.0));
        assert_eq!(cell.numeric_property("label"), None);
        assert_eq!(cell.numeric_property("missing"), None);
    }

    #[test]
    fn test_is_free() {
        let mut cell = Cell::new(Vec3::ZERO, GridCoord::new(0, 0, 0));
        assert!(cell.is_free());
        cell.dynamic_occupants.insert(ObjectId(3));
        assert!(!cell.is_free());
    }
}
