//! # EQS Core
//!
//! An in-memory Environment Query System: given a snapshot of a 3D world it
//! answers "where is a good spot for X?" by generating candidate locations
//! on a uniform grid, filtering them with conditions and ranking them with
//! weighted scoring criteria.
//!
//! ## Core Features
//!
//! - **Spatial Grid**: Deterministic world <-> cell mapping with static and dynamic occupancy
//! - **Environment Snapshots**: Immutable, content-hashed world models, swapped atomically
//! - **Declarative Queries**: Reference points, areas of interest, conditions and criteria
//! - **Batch Scoring**: Per-criterion normalization over the surviving candidates
//! - **Result Cache**: Keyed by query id and invalidated by the environment hash
//! - **Debug Visualizations**: Host markers that expire after a TTL
//!
//! ## Architecture Overview
//!
//! The engine never talks to an editor or game runtime directly. Scene
//! access, template instantiation and debug markers go through the
//! [`SceneHost`], [`AssetHost`] and [`DebugArtifactHost`] traits;
//! [`InMemoryHost`] implements all three for standalone use.
//!
//! ```text
//! SceneHost ──► EnvironmentBuilder ──► EnvironmentSnapshot ──► QueryExecutor ──► QueryResult
//!                                                                                 │
//!                                              QueryCache ◄───────────────────────┤
//!                                      VisualizationManager ◄─────────────────────┘
//! ```
//!
//! ## Quick Start Example
//!
//! ```rust
//! use eqs_core::*;
//! use std::sync::Arc;
//!
//! let host = Arc::new(InMemoryHost::new());
//! host.add_scene("Main");
//! let engine = EqsEngine::new(EngineConfig::default(), HostBindings::from_host(host.clone()));
//! engine.build_environment(&BuildOptions::default())?;
//!
//! let query = QueryModel::new("open-ground")
//!     .with_reference("player", Vec3::new(0.0, 0.0, 0.0))
//!     .with_condition(ConditionSpec::new(ConditionKind::StaticOccupancy { occupied: false }))
//!     .with_criterion(CriterionSpec::new(CriterionKind::ProximityTo {
//!         reference: "player".into(),
//!         metric: DistanceMetric::Euclidean,
//!     }));
//!
//! let result = engine.execute_query(&query);
//! assert_eq!(result.status, QueryStatus::Success);
//! assert_eq!(result.results[0].world_position, Vec3::ZERO);
//! # Ok::<(), EqsError>(())
//! ```

pub mod cache;
pub mod config;
pub mod engine;
pub mod environment;
pub mod error;
pub mod query;
pub mod spatial;
pub mod types;
pub mod utils;
pub mod visualization;

pub use cache::{CacheStats, QueryCache};
pub use config::{EngineConfig, GridSettings, QuerySettings, VisualizationSettings};
pub use engine::{
    EnvironmentStatus, EqsEngine, HostBindings, ObjectDetails, PlacedObject, PlacementRequest, VisualizationInfo,
};
pub use environment::{
    AreaResolver, AssetHost, BuildOptions, DebugArtifactHost, DynamicObject, EnvironmentBuilder, EnvironmentSnapshot,
    InMemoryHost, NoNamedAreas, SceneDocument, SceneHost, SceneObject, SceneObjectKind, StaticGeometry, TemplateInfo,
    Transform,
};
pub use error::{EqsError, EqsResult, ErrorKind, ErrorPayload};
pub use query::{
    AreaOfInterest, AreaShape, AreaType, Candidate, ConditionKind, ConditionSpec, CriterionKind, CriterionSpec,
    Normalization, QueryExecutor, QueryModel, QueryResult, QueryStatus, ReferencePoint,
};
pub use spatial::{DistanceMetric, GridInfo, SpatialGrid};
pub use types::{ArtifactHandle, Bounds, GridCoord, GridDimensions, ObjectId, Quat, Vec3};
pub use utils::current_timestamp;
pub use visualization::{ActiveVisualization, VisualizationManager};
