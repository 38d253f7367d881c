//! # World Model
//!
//! Everything the query executor reads about the world lives in an
//! [`EnvironmentSnapshot`]: the spatial grid plus the static geometry and
//! dynamic object registries discovered while walking the host scene.
//!
//! ## Key Types
//!
//! - [`EnvironmentBuilder`] - Walks a [`SceneHost`] once and seals a new snapshot
//! - [`EnvironmentSnapshot`] - Immutable, content-hashed view of the world
//! - [`SceneHost`] / [`AssetHost`] / [`DebugArtifactHost`] - Host collaborator traits
//! - [`InMemoryHost`] - Standalone host loaded from a [`SceneDocument`]

mod builder;
mod host;
mod memory;
mod snapshot;

pub use builder::{BuildOptions, EnvironmentBuilder};
pub use host::{
    AreaResolver, AssetHost, DebugArtifactHost, NoNamedAreas, Placement, SceneHost, SceneInfo, SceneObject,
    SceneObjectKind, TemplateInfo, Transform,
};
pub use memory::{InMemoryHost, MarkerRecord, SceneDefinition, SceneDocument};
pub use snapshot::{DynamicObject, EnvironmentSnapshot, StaticGeometry};
