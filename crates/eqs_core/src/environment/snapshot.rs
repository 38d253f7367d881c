/// Immutable environment snapshot: grid + object registries + content hash
use crate::spatial::SpatialGrid;
use crate::types::{Bounds, ObjectId, Vec3};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Static geometry discovered during build
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaticGeometry {
    pub id: ObjectId,
    pub name: String,
    pub bounds: Bounds,
    pub geometry_type: String,
}

/// Dynamic object discovered during build
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DynamicObject {
    pub id: ObjectId,
    pub name: String,
    pub position: Vec3,
    pub object_type: String,
    #[serde(default)]
    pub properties: BTreeMap<String, serde_json::Value>,
}

/// A published view of the world.
///
/// Snapshots are never mutated after publication. Incremental edits
/// ([`EnvironmentSnapshot::with_dynamic_object_moved`] and friends) return a
/// new snapshot with a recomputed hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentSnapshot {
    grid: SpatialGrid,
    static_geometry: Vec<StaticGeometry>,
    dynamic_objects: Vec<DynamicObject>,
    hash: String,
    last_updated: DateTime<Utc>,
}

impl EnvironmentSnapshot {
    /// Seals a snapshot, computing its content hash.
    pub fn new(grid: SpatialGrid, static_geometry: Vec<StaticGeometry>, dynamic_objects: Vec<DynamicObject>) -> Self {
        let hash = content_hash(&grid, &static_geometry, &dynamic_objects);
        Self {
            grid,
            static_geometry,
            dynamic_objects,
            hash,
            last_updated: Utc::now(),
        }
    }

    pub fn grid(&self) -> &SpatialGrid {
        &self.grid
    }

    pub fn static_geometry(&self) -> &[StaticGeometry] {
        &self.static_geometry
    }

    pub fn dynamic_objects(&self) -> &[DynamicObject] {
        &self.dynamic_objects
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    pub fn last_updated(&self) -> DateTime<Utc> {
        self.last_updated
    }

    pub fn dynamic_object(&self, id: ObjectId) -> Option<&DynamicObject> {
        self.dynamic_objects.iter().find(|o| o.id == id)
    }

    /// New snapshot with `id` moved to `position` (or inserted if unknown).
    pub fn with_dynamic_object_moved(&self, object: DynamicObject) -> EnvironmentSnapshot {
        let mut grid = self.grid.clone();
        grid.remove_dynamic_occupant(object.id);
        grid.add_dynamic_occupant(object.id, object.position);

        let mut dynamic_objects = self.dynamic_objects.clone();
        match dynamic_objects.iter_mut().find(|o| o.id == object.id) {
            Some(existing) => *existing = object,
            None => dynamic_objects.push(object),
        }
        EnvironmentSnapshot::new(grid, self.static_geometry.clone(), dynamic_objects)
    }

    /// New snapshot without the dynamic object `id`; `None` if it is not registered.
    pub fn with_dynamic_object_removed(&self, id: ObjectId) -> Option<EnvironmentSnapshot> {
        self.dynamic_object(id)?;
        let mut grid = self.grid.clone();
        grid.remove_dynamic_occupant(id);
        let dynamic_objects = self.dynamic_objects.iter().filter(|o| o.id != id).cloned().collect();
        Some(EnvironmentSnapshot::new(grid, self.static_geometry.clone(), dynamic_objects))
    }
}

fn content_hash(grid: &SpatialGrid, static_geometry: &[StaticGeometry], dynamic_objects: &[DynamicObject]) -> String {
    let mut hasher = blake3::Hasher::new();
    grid.hash_into(&mut hasher);

    let mut statics: Vec<&StaticGeometry> = static_geometry.iter().collect();
    statics.sort_by_key(|g| g.id);
    hasher.update(&(statics.len() as u64).to_le_bytes());
    for g in statics {
        hasher.update(&g.id.0.to_le_bytes());
        hash_str(&mut hasher, &g.geometry_type);
        for v in [g.bounds.min, g.bounds.max] {
            hash_vec(&mut hasher, v);
        }
    }

    let mut dynamics: Vec<&DynamicObject> = dynamic_objects.iter().collect();
    dynamics.sort_by_key(|o| o.id);
    hasher.update(&(dynamics.len() as u64).to_le_bytes());
    for o in dynamics {
        hasher.update(&o.id.0.to_le_bytes());
        hash_str(&mut hasher, &o.object_type);
        hash_vec(&mut hasher, o.position);
    }

    hasher.finalize().to_hex().to_string()
}

/// Length-prefixed so adjacent strings cannot trade bytes
fn hash_str(hasher: &mut blake3::Hasher, s: &str) {
    hasher.update(&(s.len() as u64).to_le_bytes());
    hasher.update(s.as_bytes());
}

fn hash_vec(hasher: &mut blake3::Hasher, v: Vec3) {
    hasher.update(&v.x.to_le_bytes());
    hasher.update(&v.y.to_le_bytes());
    hasher.update(&v.z.to_le_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GridDimensions;

    fn snapshot() -> EnvironmentSnapshot {
        let mut grid = SpatialGrid::new(Vec3::ZERO, 1.0, GridDimensions::new(3, 1, 3), 100).unwrap();
        let wall = Bounds::new(Vec3::new(0.1, 0.1, 0.1), Vec3::new(0.9, 0.9, 0.9));
        grid.mark_static(&wall);
        grid.add_dynamic_occupant(ObjectId(5), Vec3::new(2.5, 0.5, 2.5));
        EnvironmentSnapshot::new(
            grid,
            vec![StaticGeometry {
                id: ObjectId(1),
                name: "Wall".into(),
                bounds: wall,
                geometry_type: "wall".into(),
            }],
            vec![DynamicObject {
                id: ObjectId(5),
                name: "Guard".into(),
                position: Vec3::new(2.5, 0.5, 2.5),
                object_type: "enemy".into(),
                properties: BTreeMap::new(),
            }],
        )
    }

    #[test]
    fn test_hash_is_content_based() {
        let a = snapshot();
        let b = snapshot();
        assert_eq!(a.hash(), b.hash());
        assert_eq!(a.hash().len(), 64);
    }

    #[test]
    fn test_moving_dynamic_object_changes_hash_and_keeps_original() {
        let original = snapshot();
        let guard = original.dynamic_object(ObjectId(5)).unwrap().clone();
        let moved = original.with_dynamic_object_moved(DynamicObject {
            position: Vec3::new(1.5, 0.5, 0.5),
            ..guard
        });

        assert_ne!(original.hash(), moved.hash());
        let old_cell = original.grid().cell(crate::types::GridCoord::new(2, 0, 2)).unwrap();
        assert!(old_cell.dynamic_occupants.contains(&ObjectId(5)));
        let new_cell = moved.grid().cell(crate::types::GridCoord::new(1, 0, 0)).unwrap();
        assert!(new_cell.dynamic_occupants.contains(&ObjectId(5)));
        assert_eq!(moved.dynamic_objects().len(), 1);
    }

    fn geometry(id: i64, geometry_type: &str, bounds: Bounds) -> StaticGeometry {
        StaticGeometry {
            id: ObjectId(id),
            name: format!("Geometry{}", id),
            bounds,
            geometry_type: geometry_type.into(),
        }
    }

    #[test]
    fn test_type_boundaries_are_part_of_the_hash() {
        let grid = SpatialGrid::new(Vec3::ZERO, 1.0, GridDimensions::new(1, 1, 1), 10).unwrap();
        let unit = Bounds::new(Vec3::ZERO, Vec3::ONE);
        let mut unit_bytes = Vec::new();
        for v in [unit.min.x, unit.min.y, unit.min.z, unit.max.x, unit.max.y, unit.max.z] {
            unit_bytes.extend_from_slice(&v.to_le_bytes());
        }

        // "ab" + "c" against "a" + "bc", with the bytes in between shifted by
        // one so the raw concatenation of both layouts is identical
        let left = vec![
            geometry(1, "ab", unit),
            geometry(i64::from_le_bytes([0, 0, 0, 0, 0, 0, 0, b'b']), "c", unit),
        ];
        let mut shifted = vec![b'b'];
        shifted.extend_from_slice(&unit_bytes);
        let float = |i: usize| f64::from_le_bytes(shifted[i * 8..i * 8 + 8].try_into().unwrap());
        let moved = Bounds {
            min: Vec3::new(float(0), float(1), float(2)),
            max: Vec3::new(float(3), float(4), float(5)),
        };
        let right = vec![geometry(1, "a", moved), geometry(i64::from(shifted[48]), "bc", unit)];

        let a = EnvironmentSnapshot::new(grid.clone(), left, Vec::new());
        let b = EnvironmentSnapshot::new(grid, right, Vec::new());
        assert_ne!(a.hash(), b.hash());
    }

    #[test]
    fn test_remove_dynamic_object() {
        let original = snapshot();
        let removed = original.with_dynamic_object_removed(ObjectId(5)).unwrap();
        assert!(removed.dynamic_objects().is_empty());
        assert_ne!(removed.hash(), original.hash());
        assert!(original.with_dynamic_object_removed(ObjectId(99)).is_none());
    }
}
