//! In-memory host implementation.
//!
//! Backs the standalone `eqs-server` process and the test suites. A scene is
//! described by a [`SceneDocument`] (JSON) holding scenes, entities, named
//! areas and instantiable templates. Spawned debug markers are tracked so
//! their release can be observed.

use super::host::{
    AreaResolver, AssetHost, DebugArtifactHost, Placement, SceneHost, SceneInfo, SceneObject, SceneObjectKind,
    TemplateInfo, Transform,
};
use crate::error::{EqsError, EqsResult};
use crate::query::AreaShape;
use crate::types::{ArtifactHandle, Bounds, ObjectId, Vec3};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Serialized description of a world
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneDocument {
    #[serde(default)]
    pub scenes: Vec<SceneDefinition>,
    #[serde(default)]
    pub named_areas: BTreeMap<String, AreaShape>,
    #[serde(default)]
    pub templates: Vec<TemplateInfo>,
}

/// One scene of a [`SceneDocument`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneDefinition {
    pub name: String,
    #[serde(default)]
    pub objects: Vec<SceneObject>,
}

/// A debug marker currently alive in the host
#[derive(Debug, Clone, PartialEq)]
pub struct MarkerRecord {
    pub position: Vec3,
    pub score: f64,
    pub label: String,
}

#[derive(Default)]
struct HostState {
    scenes: Vec<String>,
    objects: BTreeMap<ObjectId, SceneObject>,
    named_areas: BTreeMap<String, AreaShape>,
    templates: Vec<TemplateInfo>,
    markers: HashMap<ArtifactHandle, MarkerRecord>,
    next_id: i64,
}

/// Host backed by plain in-process collections
pub struct InMemoryHost {
    state: RwLock<HostState>,
}

impl Default for InMemoryHost {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryHost {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(HostState {
                next_id: 1,
                ..Default::default()
            }),
        }
    }

    pub fn from_document(document: SceneDocument) -> Self {
        let host = Self::new();
        for scene in document.scenes {
            host.add_scene(&scene.name);
            for mut object in scene.objects {
                object.scene = scene.name.clone();
                host.insert_object(object);
            }
        }
        {
            let mut state = host.state.write();
            state.named_areas = document.named_areas;
            state.templates = document.templates;
        }
        host
    }

    pub fn add_scene(&self, name: &str) {
        let mut state = self.state.write();
        if !state.scenes.iter().any(|s| s == name) {
            state.scenes.push(name.to_string());
        }
    }

    /// Inserts or replaces an entity. Its scene is registered if needed.
    pub fn insert_object(&self, object: SceneObject) {
        let mut state = self.state.write();
        if !object.scene.is_empty() && !state.scenes.contains(&object.scene) {
            state.scenes.push(object.scene.clone());
        }
        state.next_id = state.next_id.max(object.id.0 + 1);
        state.objects.insert(object.id, object);
    }

    pub fn remove_object(&self, id: ObjectId) -> Option<SceneObject> {
        self.state.write().objects.remove(&id)
    }

    /// Moves an entity; returns false if it does not exist.
    pub fn set_position(&self, id: ObjectId, position: Vec3) -> bool {
        let mut state = self.state.write();
        let Some(object) = state.objects.get_mut(&id) else {
            return false;
        };
        let delta = position - object.transform.position;
        object.transform.position = position;
        if let Some(bounds) = object.bounds.as_mut() {
            *bounds = Bounds::new(bounds.min + delta, bounds.max + delta);
        }
        true
    }

    pub fn add_named_area(&self, name: &str, shape: AreaShape) {
        self.state.write().named_areas.insert(name.to_string(), shape);
    }

    pub fn add_template(&self, template: TemplateInfo) {
        self.state.write().templates.push(template);
    }

    pub fn object_count(&self) -> usize {
        self.state.read().objects.len()
    }

    /// Debug markers that have been spawned and not yet released.
    pub fn live_markers(&self) -> Vec<MarkerRecord> {
        self.state.read().markers.values().cloned().collect()
    }

    pub fn live_marker_count(&self) -> usize {
        self.state.read().markers.len()
    }

    fn children_of(state: &HostState, id: ObjectId) -> Vec<ObjectId> {
        state
            .objects
            .values()
            .filter(|o| o.parent == Some(id))
            .map(|o| o.id)
            .collect()
    }

    fn describe(state: &HostState, id: ObjectId, depth: usize, include_properties: bool) -> Option<serde_json::Value> {
        let object = state.objects.get(&id)?;
        let mut fields = serde_json::Map::new();
        fields.insert("name".into(), object.name.clone().into());
        fields.insert("type".into(), object.object_type.clone().into());
        fields.insert("kind".into(), serde_json::to_value(object.kind).ok()?);
        fields.insert("position".into(), serde_json::to_value(object.transform.position).ok()?);
        fields.insert("rotation".into(), serde_json::to_value(object.transform.rotation).ok()?);
        fields.insert("scale".into(), serde_json::to_value(object.transform.scale).ok()?);
        if let Some(bounds) = object.bounds {
            fields.insert("bounds".into(), serde_json::to_value(bounds).ok()?);
        }
        if include_properties {
            for (key, value) in &object.properties {
                fields.insert(key.clone(), value.clone());
            }
        }
        if depth > 0 {
            let children: Vec<serde_json::Value> = Self::children_of(state, id)
                .into_iter()
                .filter_map(|child| Self::describe(state, child, depth - 1, include_properties))
                .collect();
            if !children.is_empty() {
                fields.insert("children".into(), serde_json::Value::Array(children));
            }
        }
        Some(serde_json::Value::Object(fields))
    }
}

impl AreaResolver for InMemoryHost {
    fn resolve_named_area(&self, name: &str) -> Option<AreaShape> {
        self.state.read().named_areas.get(name).cloned()
    }
}

impl SceneHost for InMemoryHost {
    fn scenes(&self) -> Vec<SceneInfo> {
        let state = self.state.read();
        state
            .scenes
            .iter()
            .map(|name| SceneInfo {
                name: name.clone(),
                root_count: state
                    .objects
                    .values()
                    .filter(|o| &o.scene == name && o.parent.is_none())
                    .count(),
            })
            .collect()
    }

    fn scene_objects(&self, scene: Option<&str>) -> Vec<SceneObject> {
        let state = self.state.read();
        state
            .objects
            .values()
            .filter(|o| scene.map_or(true, |s| o.scene == s))
            .cloned()
            .collect()
    }

    fn find_by_id(&self, id: ObjectId) -> Option<SceneObject> {
        self.state.read().objects.get(&id).cloned()
    }

    fn find_by_name(&self, name: &str) -> Option<SceneObject> {
        self.state.read().objects.values().find(|o| o.name == name).cloned()
    }

    fn describe_object(
        &self,
        id: ObjectId,
        max_depth: usize,
        include_properties: bool,
    ) -> Option<BTreeMap<String, serde_json::Value>> {
        let state = self.state.read();
        match Self::describe(&state, id, max_depth, include_properties)? {
            serde_json::Value::Object(map) => Some(map.into_iter().collect()),
            _ => None,
        }
    }
}

impl AssetHost for InMemoryHost {
    fn load_template(&self, id_or_name: &str) -> Option<TemplateInfo> {
        self.state
            .read()
            .templates
            .iter()
            .find(|t| t.id == id_or_name || t.name == id_or_name || (!t.path.is_empty() && t.path == id_or_name))
            .cloned()
    }

    fn instantiate(&self, template: &TemplateInfo, placement: Placement) -> EqsResult<SceneObject> {
        if !placement.position.is_finite() {
            return Err(EqsError::InvalidPosition(placement.position.to_string()));
        }
        let mut state = self.state.write();
        let scene = match placement.parent {
            Some(parent) => state
                .objects
                .get(&parent)
                .map(|p| p.scene.clone())
                .ok_or_else(|| EqsError::ObjectNotFound(parent.to_string()))?,
            None => state.scenes.first().cloned().unwrap_or_default(),
        };

        let id = ObjectId(state.next_id);
        state.next_id += 1;
        let object = SceneObject {
            id,
            name: placement.name.unwrap_or_else(|| template.name.clone()),
            scene,
            kind: template.kind,
            object_type: template.object_type.clone(),
            transform: Transform {
                position: placement.position,
                rotation: placement.rotation,
                scale: Vec3::ONE,
            },
            bounds: template.size.map(|size| Bounds::from_center_size(placement.position, size)),
            parent: placement.parent,
            properties: BTreeMap::new(),
        };
        debug!("Instantiated template '{}' as {} ({})", template.name, object.name, id);
        state.objects.insert(id, object.clone());
        Ok(object)
    }
}

impl DebugArtifactHost for InMemoryHost {
    fn spawn_marker(&self, position: Vec3, score: f64, label: &str) -> ArtifactHandle {
        let handle = ArtifactHandle::new();
        self.state.write().markers.insert(
            handle,
            MarkerRecord {
                position,
                score,
                label: label.to_string(),
            },
        );
        handle
    }

    fn release(&self, handle: ArtifactHandle) {
        self.state.write().markers.remove(&handle);
    }
}
