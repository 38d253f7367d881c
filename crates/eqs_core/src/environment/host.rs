//! # Host Collaborator Interfaces
//!
//! The EQS core never talks to an editor or game runtime directly. Everything
//! it needs from the outside world goes through the traits in this module:
//!
//! - [`SceneHost`] - scene graph access (entity enumeration and lookup,
//!   transforms and bounds, reflection-style descriptions, named areas)
//! - [`AssetHost`] - template loading and instantiation
//! - [`DebugArtifactHost`] - spawning and releasing transient debug markers
//!
//! [`super::InMemoryHost`] implements all three for standalone use and tests.

use crate::error::EqsResult;
use crate::query::AreaShape;
use crate::types::{ArtifactHandle, Bounds, ObjectId, Quat, Vec3};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Whether an entity is part of the static world or moves at runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SceneObjectKind {
    #[default]
    Static,
    Dynamic,
}

/// World-space transform of an entity
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub position: Vec3,
    #[serde(default)]
    pub rotation: Quat,
    #[serde(default = "unit_scale")]
    pub scale: Vec3,
}

fn unit_scale() -> Vec3 {
    Vec3::ONE
}

impl Transform {
    pub fn at(position: Vec3) -> Self {
        Self {
            position,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }

    /// Converts a point in this transform's local space to world space.
    pub fn local_to_world(&self, local: Vec3) -> Vec3 {
        self.position + self.rotation.rotate(local.scale(self.scale))
    }
}

/// An entity as reported by the host scene graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneObject {
    pub id: ObjectId,
    pub name: String,
    /// Scene the entity belongs to
    #[serde(default)]
    pub scene: String,
    #[serde(default)]
    pub kind: SceneObjectKind,
    /// Semantic type tag ("cover", "enemy", "wall", ...)
    #[serde(default)]
    pub object_type: String,
    pub transform: Transform,
    /// Aggregate renderer/collider bounds including children
    #[serde(default)]
    pub bounds: Option<Bounds>,
    #[serde(default)]
    pub parent: Option<ObjectId>,
    #[serde(default)]
    pub properties: BTreeMap<String, serde_json::Value>,
}

/// A loaded scene
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneInfo {
    pub name: String,
    pub root_count: usize,
}

/// A prefab-like template that can be instantiated
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateInfo {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub object_type: String,
    #[serde(default)]
    pub kind: SceneObjectKind,
    /// Size of the bounds given to instances, centered on their position
    #[serde(default)]
    pub size: Option<Vec3>,
}

/// Where and how to instantiate a template
#[derive(Debug, Clone, PartialEq)]
pub struct Placement {
    /// World-space position
    pub position: Vec3,
    pub rotation: Quat,
    pub name: Option<String>,
    pub parent: Option<ObjectId>,
}

/// Scene graph access.
pub trait SceneHost: AreaResolver + Send + Sync {
    /// Loaded scenes.
    fn scenes(&self) -> Vec<SceneInfo>;

    /// Every entity of `scene` (or of all loaded scenes), children included.
    fn scene_objects(&self, scene: Option<&str>) -> Vec<SceneObject>;

    fn find_by_id(&self, id: ObjectId) -> Option<SceneObject>;

    fn find_by_name(&self, name: &str) -> Option<SceneObject>;

    /// Structured name -> value description of an entity, bounded by `max_depth`.
    fn describe_object(
        &self,
        id: ObjectId,
        max_depth: usize,
        include_properties: bool,
    ) -> Option<BTreeMap<String, serde_json::Value>>;

    /// Per-cell metadata the host wants attached during environment build.
    fn cell_properties(&self, cell: &Bounds) -> BTreeMap<String, serde_json::Value> {
        let _ = cell;
        BTreeMap::new()
    }
}

/// Resolves a named area to a concrete shape.
pub trait AreaResolver {
    fn resolve_named_area(&self, name: &str) -> Option<AreaShape>;
}

/// Resolver for contexts without any named areas
#[derive(Debug, Clone, Copy, Default)]
pub struct NoNamedAreas;

impl AreaResolver for NoNamedAreas {
    fn resolve_named_area(&self, _name: &str) -> Option<AreaShape> {
        None
    }
}

/// Asset/resource access.
pub trait AssetHost: Send + Sync {
    /// Finds a template by id, path or name.
    fn load_template(&self, id_or_name: &str) -> Option<TemplateInfo>;

    fn instantiate(&self, template: &TemplateInfo, placement: Placement) -> EqsResult<SceneObject>;
}

/// Owner of transient debug artifacts.
pub trait DebugArtifactHost: Send + Sync {
    fn spawn_marker(&self, position: Vec3, score: f64, label: &str) -> ArtifactHandle;

    fn release(&self, handle: ArtifactHandle);
}
