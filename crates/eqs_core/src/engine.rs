//! # EQS Engine
//!
//! [`EqsEngine`] is the single service object a host process creates. It
//! owns every piece of mutable EQS state as private fields:
//!
//! - the published [`EnvironmentSnapshot`] (swapped atomically on rebuild)
//! - the [`QueryCache`]
//! - the [`VisualizationManager`]
//!
//! and exposes the synchronous tool surface on top of them. Errors are
//! reported with a machine-checkable [`crate::ErrorKind`]; query errors never
//! escape as `Err` but come back as `Failure` results.
//!
//! ## Concurrency
//!
//! Readers clone the current `Arc<EnvironmentSnapshot>` and work on it
//! without holding any lock, so a rebuild never disturbs a query already in
//! flight. The cache and visualization maps are sharded [`dashmap`] maps.

use crate::cache::{CacheStats, QueryCache};
use crate::config::EngineConfig;
use crate::environment::{
    AssetHost, BuildOptions, DebugArtifactHost, DynamicObject, EnvironmentBuilder, EnvironmentSnapshot, Placement,
    SceneHost, SceneObject, SceneObjectKind,
};
use crate::error::{EqsError, EqsResult};
use crate::query::{QueryExecutor, QueryModel, QueryResult};
use crate::spatial::GridInfo;
use crate::types::{ArtifactHandle, ObjectId, Quat, Vec3};
use crate::utils::{current_timestamp, seconds_to_duration};
use crate::visualization::VisualizationManager;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Depth used when describing objects for `get_object_details`
const DESCRIBE_DEPTH: usize = 2;

/// Longest accepted visualization TTL (one day)
const MAX_TTL_SECONDS: f64 = 86_400.0;

// ============================================================================
// Tool payloads
// ============================================================================

/// Host collaborators the engine talks to
#[derive(Clone)]
pub struct HostBindings {
    pub scene: Arc<dyn SceneHost>,
    pub assets: Arc<dyn AssetHost>,
    pub debug: Arc<dyn DebugArtifactHost>,
}

impl HostBindings {
    /// Binds one object implementing every host trait.
    pub fn from_host<H>(host: Arc<H>) -> Self
    where
        H: SceneHost + AssetHost + DebugArtifactHost + 'static,
    {
        Self {
            scene: host.clone(),
            assets: host.clone(),
            debug: host,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentStatus {
    pub is_initialized: bool,
    pub environment_hash: Option<String>,
    pub grid_info: Option<GridInfo>,
    pub cached_queries_count: usize,
    pub active_visualizations_count: usize,
    pub static_geometry_count: usize,
    pub dynamic_objects_count: usize,
    pub last_updated: Option<DateTime<Utc>>,
}

/// Per-id outcome of `get_object_details`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectDetails {
    /// The id as requested
    pub id: String,
    pub exists: bool,
    pub object_id: Option<ObjectId>,
    pub properties: BTreeMap<String, serde_json::Value>,
}

fn default_world_space() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlacementRequest {
    /// Template id, path or name
    pub template: String,
    pub position: Vec3,
    #[serde(default)]
    pub rotation: Option<Quat>,
    #[serde(default)]
    pub name: Option<String>,
    /// Parent object id or name
    #[serde(default)]
    pub parent_id: Option<String>,
    /// When false and a parent is given, `position` and `rotation` are in the
    /// parent's local space
    #[serde(default = "default_world_space")]
    pub world_space: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlacedObject {
    pub id: ObjectId,
    pub name: String,
    pub scene: String,
    pub object_type: String,
    pub world_position: Vec3,
    pub rotation: Quat,
    pub parent_id: Option<ObjectId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisualizationInfo {
    pub query_id: String,
    pub marker_count: usize,
    pub expiration_time: DateTime<Utc>,
}

// ============================================================================
// Engine
// ============================================================================

pub struct EqsEngine {
    config: EngineConfig,
    hosts: HostBindings,
    snapshot: RwLock<Option<Arc<EnvironmentSnapshot>>>,
    cache: QueryCache,
    visualizations: VisualizationManager,
}

impl EqsEngine {
    pub fn new(config: EngineConfig, hosts: HostBindings) -> Self {
        let visualizations = VisualizationManager::new(hosts.debug.clone());
        Self {
            config,
            hosts,
            snapshot: RwLock::new(None),
            cache: QueryCache::new(),
            visualizations,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The currently published snapshot.
    pub fn snapshot(&self) -> Option<Arc<EnvironmentSnapshot>> {
        self.snapshot.read().clone()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Rebuilds the world model and publishes it.
    pub fn build_environment(&self, options: &BuildOptions) -> EqsResult<Arc<EnvironmentSnapshot>> {
        let built = EnvironmentBuilder::new(&self.config.grid).build(&*self.hosts.scene, options)?;
        let snapshot = Arc::new(built);
        let previous = self.snapshot.write().replace(snapshot.clone());
        match previous {
            Some(old) if old.hash() == snapshot.hash() => {
                debug!("Rebuilt environment is unchanged");
            }
            Some(_) => info!("🔄 Environment replaced, cached results for the previous state are now stale"),
            None => info!("✅ Environment initialized"),
        }
        Ok(snapshot)
    }

    /// Runs a query against the current snapshot, consulting the cache first.
    pub fn execute_query(&self, query: &QueryModel) -> QueryResult {
        let Some(snapshot) = self.snapshot() else {
            return QueryResult::failure(&query.query_id, &EqsError::EnvironmentNotInitialized);
        };
        let caching = self.config.query.cache_enabled;

        if caching {
            if let Some(cached) = self.cache.get(&query.query_id, snapshot.hash()) {
                debug!("Query '{}' served from cache", query.query_id);
                return cached;
            }
        }

        let result = QueryExecutor::new(&self.config.query, &*self.hosts.scene).execute(&snapshot, query);
        if caching && result.is_success() {
            self.cache.put(result.clone(), snapshot.hash());
        }
        info!(
            "🔍 Query '{}': {:?}, {} result(s) in {:.2}ms",
            query.query_id,
            result.status,
            result.results.len(),
            result.execution_time_ms
        );
        result
    }

    /// Parses a wire-format query and runs it.
    ///
    /// Malformed queries (including unknown condition or criterion types)
    /// fail with `QueryExecutionFailed`.
    pub fn execute_query_json(&self, request: serde_json::Value) -> QueryResult {
        let query_id = request
            .get("queryId")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        match serde_json::from_value::<QueryModel>(request) {
            Ok(query) => self.execute_query(&query),
            Err(e) => QueryResult::failure(query_id, &EqsError::from(e)),
        }
    }

    /// Status report; expired visualizations are swept first.
    pub fn environment_status(&self) -> EnvironmentStatus {
        let active_visualizations_count = self.visualizations.active(current_timestamp()).len();
        let snapshot = self.snapshot();
        EnvironmentStatus {
            is_initialized: snapshot.is_some(),
            environment_hash: snapshot.as_ref().map(|s| s.hash().to_string()),
            grid_info: snapshot.as_ref().map(|s| s.grid().info()),
            cached_queries_count: self.cache.len(),
            active_visualizations_count,
            static_geometry_count: snapshot.as_ref().map_or(0, |s| s.static_geometry().len()),
            dynamic_objects_count: snapshot.as_ref().map_or(0, |s| s.dynamic_objects().len()),
            last_updated: snapshot.as_ref().map(|s| s.last_updated()),
        }
    }

    /// Describes each requested object. Unknown ids produce `exists: false`
    /// entries instead of failing the batch.
    pub fn get_object_details(&self, object_ids: &[String], properties: Option<&[String]>) -> Vec<ObjectDetails> {
        object_ids
            .iter()
            .map(|raw| {
                let described = self.lookup(raw).and_then(|object| {
                    self.hosts
                        .scene
                        .describe_object(object.id, DESCRIBE_DEPTH, true)
                        .map(|description| (object.id, description))
                });
                match described {
                    Some((id, mut description)) => {
                        if let Some(wanted) = properties {
                            description.retain(|key, _| wanted.iter().any(|w| w == key));
                        }
                        ObjectDetails {
                            id: raw.clone(),
                            exists: true,
                            object_id: Some(id),
                            properties: description,
                        }
                    }
                    None => {
                        debug!("Object '{}' not found", raw);
                        ObjectDetails {
                            id: raw.clone(),
                            exists: false,
                            object_id: None,
                            properties: BTreeMap::new(),
                        }
                    }
                }
            })
            .collect()
    }

    /// Instantiates a template. The snapshot is not rebuilt.
    pub fn place_object_at_location(&self, request: &PlacementRequest) -> EqsResult<PlacedObject> {
        if !request.position.is_finite() {
            return Err(EqsError::InvalidPosition(request.position.to_string()));
        }
        let local_rotation = request.rotation.unwrap_or(Quat::IDENTITY);
        if !local_rotation.is_finite() {
            return Err(EqsError::InvalidParameter("rotation must be finite".to_string()));
        }

        let template = self
            .hosts
            .assets
            .load_template(&request.template)
            .ok_or_else(|| EqsError::PrefabNotFound(request.template.clone()))?;
        let parent = match request.parent_id.as_deref() {
            Some(raw) => Some(self.lookup(raw).ok_or_else(|| EqsError::ObjectNotFound(raw.to_string()))?),
            None => None,
        };

        let (position, rotation) = match &parent {
            Some(parent) if !request.world_space => (
                parent.transform.local_to_world(request.position),
                (parent.transform.rotation * local_rotation).normalized(),
            ),
            _ => (request.position, local_rotation.normalized()),
        };

        let object = self.hosts.assets.instantiate(
            &template,
            Placement {
                position,
                rotation,
                name: request.name.clone(),
                parent: parent.as_ref().map(|p| p.id),
            },
        )?;
        info!("📦 Placed '{}' ({}) at {}", object.name, object.id, position);

        Ok(PlacedObject {
            id: object.id,
            name: object.name,
            scene: object.scene,
            object_type: object.object_type,
            world_position: position,
            rotation,
            parent_id: object.parent,
        })
    }

    /// Moves (or registers) a dynamic object and publishes the edited snapshot.
    pub fn update_dynamic_object(&self, id: ObjectId, position: Vec3) -> EqsResult<Arc<EnvironmentSnapshot>> {
        if !position.is_finite() {
            return Err(EqsError::InvalidPosition(position.to_string()));
        }
        let mut slot = self.snapshot.write();
        let current = (*slot).clone().ok_or(EqsError::EnvironmentNotInitialized)?;

        let object = match current.dynamic_object(id) {
            Some(existing) => DynamicObject {
                position,
                ..existing.clone()
            },
            None => {
                let found = self
                    .hosts
                    .scene
                    .find_by_id(id)
                    .filter(|o| o.kind == SceneObjectKind::Dynamic)
                    .ok_or_else(|| EqsError::ObjectNotFound(id.to_string()))?;
                DynamicObject {
                    id,
                    name: found.name,
                    position,
                    object_type: found.object_type,
                    properties: found.properties,
                }
            }
        };

        let next = Arc::new(current.with_dynamic_object_moved(object));
        debug!("Dynamic object {} moved to {}, hash {}", id, position, next.hash());
        *slot = Some(next.clone());
        Ok(next)
    }

    /// Drops a dynamic object from the published snapshot.
    pub fn remove_dynamic_object(&self, id: ObjectId) -> EqsResult<Arc<EnvironmentSnapshot>> {
        let mut slot = self.snapshot.write();
        let current = (*slot).clone().ok_or(EqsError::EnvironmentNotInitialized)?;
        let next = Arc::new(
            current
                .with_dynamic_object_removed(id)
                .ok_or_else(|| EqsError::ObjectNotFound(id.to_string()))?,
        );
        *slot = Some(next.clone());
        Ok(next)
    }

    /// Spawns markers for the cached result of `query_id`.
    ///
    /// Requires a cached result computed against the current environment.
    pub fn activate_visualization(&self, query_id: &str, ttl_seconds: Option<f64>) -> EqsResult<VisualizationInfo> {
        let ttl = ttl_seconds.unwrap_or(self.config.visualization.default_ttl_seconds);
        if !(ttl.is_finite() && ttl > 0.0 && ttl <= MAX_TTL_SECONDS) {
            return Err(EqsError::InvalidParameter(format!(
                "ttlSeconds must be in (0, {}], got {}",
                MAX_TTL_SECONDS, ttl
            )));
        }
        let snapshot = self.snapshot().ok_or(EqsError::EnvironmentNotInitialized)?;
        let result = self
            .cache
            .get(query_id, snapshot.hash())
            .filter(|r| !r.results.is_empty())
            .ok_or_else(|| EqsError::NoQueryResults(format!("no current result cached for query '{}'", query_id)))?;

        let markers: Vec<ArtifactHandle> = result
            .results
            .iter()
            .take(self.config.visualization.max_markers)
            .enumerate()
            .map(|(rank, candidate)| {
                self.hosts.debug.spawn_marker(
                    candidate.world_position,
                    candidate.score,
                    &format!("{} #{}", query_id, rank + 1),
                )
            })
            .collect();
        let marker_count = markers.len();
        let expiration_time =
            self.visualizations
                .activate(query_id, markers, seconds_to_duration(ttl), current_timestamp());
        info!("🎯 Visualizing '{}' with {} marker(s) for {}s", query_id, marker_count, ttl);

        Ok(VisualizationInfo {
            query_id: query_id.to_string(),
            marker_count,
            expiration_time,
        })
    }

    pub fn sweep_visualizations(&self, now: DateTime<Utc>) -> usize {
        self.visualizations.sweep(now)
    }

    pub fn deactivate_visualization(&self, query_id: &str) -> bool {
        self.visualizations.deactivate(query_id)
    }

    /// Releases every visualization; used on shutdown.
    pub fn deactivate_all_visualizations(&self) -> usize {
        self.visualizations.clear()
    }

    /// Clears one cached query, or all of them. Returns the number removed.
    pub fn clear_cache(&self, query_id: Option<&str>) -> usize {
        match query_id {
            Some(id) => usize::from(self.cache.clear(id)),
            None => self.cache.clear_all(),
        }
    }

    /// Object by numeric id, falling back to name.
    fn lookup(&self, raw: &str) -> Option<SceneObject> {
        raw.parse::<ObjectId>()
            .ok()
            .and_then(|id| self.hosts.scene.find_by_id(id))
            .or_else(|| self.hosts.scene.find_by_name(raw.trim()))
    }
}
