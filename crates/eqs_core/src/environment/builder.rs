/// Environment builder: walks the host scene once and seals a new snapshot
use super::host::{SceneHost, SceneObject, SceneObjectKind};
use super::snapshot::{DynamicObject, EnvironmentSnapshot, StaticGeometry};
use crate::config::GridSettings;
use crate::error::{EqsError, EqsResult};
use crate::spatial::SpatialGrid;
use crate::types::{Bounds, GridDimensions, Vec3};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Caller-supplied build parameters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildOptions {
    /// Explicit grid region; the discovered geometry bounds are used otherwise
    #[serde(default)]
    pub bounds_override: Option<Bounds>,
    /// Restrict the walk to one scene
    #[serde(default)]
    pub scene: Option<String>,
    /// Override the configured cell size
    #[serde(default)]
    pub cell_size: Option<f64>,
}

/// Builds [`EnvironmentSnapshot`]s from a [`SceneHost`].
///
/// The builder has no side effects beyond returning the new snapshot.
pub struct EnvironmentBuilder<'a> {
    settings: &'a GridSettings,
}

impl<'a> EnvironmentBuilder<'a> {
    pub fn new(settings: &'a GridSettings) -> Self {
        Self { settings }
    }

    pub fn build<H>(&self, host: &H, options: &BuildOptions) -> EqsResult<EnvironmentSnapshot>
    where
        H: SceneHost + ?Sized,
    {
        if let Some(scene) = options.scene.as_deref() {
            if !host.scenes().iter().any(|s| s.name == scene) {
                return Err(EqsError::InvalidSceneIdentifier(scene.to_string()));
            }
        }

        let objects = host.scene_objects(options.scene.as_deref());
        let (static_geometry, dynamic_objects) = classify(&objects);
        debug!(
            "Scene walk found {} static and {} dynamic objects",
            static_geometry.len(),
            dynamic_objects.len()
        );

        let cell_size = options.cell_size.unwrap_or(self.settings.cell_size);
        let region = match options.bounds_override {
            Some(bounds) => validate_region(bounds)?,
            None => discovered_region(&static_geometry, &dynamic_objects, self.settings.bounds_margin),
        };

        let size = region.size();
        let dims = GridDimensions::new(axis_cells(size.x, cell_size)?, axis_cells(size.y, cell_size)?, axis_cells(size.z, cell_size)?);
        let mut grid = SpatialGrid::new(region.min, cell_size, dims, self.settings.max_cells)?;

        for geometry in &static_geometry {
            grid.mark_static(&geometry.bounds);
        }
        for object in &dynamic_objects {
            if grid.add_dynamic_occupant(object.id, object.position).is_none() {
                debug!("Dynamic object {} at {} lies outside the grid", object.id, object.position);
            }
        }

        if self.settings.collect_cell_properties {
            let coords: Vec<_> = grid.cells().iter().map(|c| c.indices).collect();
            for coord in coords {
                let properties = host.cell_properties(&grid.cell_bounds(coord));
                for (key, value) in properties {
                    grid.set_property(coord, key, value)?;
                }
            }
        }

        let snapshot = EnvironmentSnapshot::new(grid, static_geometry, dynamic_objects);
        info!(
            "🌍 Built environment {} ({} cells, {} occupied) hash {}",
            dims,
            snapshot.grid().len(),
            snapshot.grid().occupied_count(),
            &snapshot.hash()[..12]
        );
        Ok(snapshot)
    }
}

fn classify(objects: &[SceneObject]) -> (Vec<StaticGeometry>, Vec<DynamicObject>) {
    let mut static_geometry = Vec::new();
    let mut dynamic_objects = Vec::new();
    for object in objects {
        match object.kind {
            SceneObjectKind::Static => {
                // Static entities without renderer/collider bounds occupy nothing
                if let Some(bounds) = object.bounds.filter(Bounds::is_valid) {
                    static_geometry.push(StaticGeometry {
                        id: object.id,
                        name: object.name.clone(),
                        bounds,
                        geometry_type: object.object_type.clone(),
                    });
                }
            }
            SceneObjectKind::Dynamic => dynamic_objects.push(DynamicObject {
                id: object.id,
                name: object.name.clone(),
                position: object.transform.position,
                object_type: object.object_type.clone(),
                properties: object.properties.clone(),
            }),
        }
    }
    static_geometry.sort_by_key(|g| g.id);
    dynamic_objects.sort_by_key(|o| o.id);
    (static_geometry, dynamic_objects)
}

fn validate_region(bounds: Bounds) -> EqsResult<Bounds> {
    if !(bounds.min.is_finite() && bounds.max.is_finite()) {
        return Err(EqsError::InvalidCustomRegion("bounds must be finite".to_string()));
    }
    let size = bounds.size();
    if size.x <= 0.0 || size.y <= 0.0 || size.z <= 0.0 {
        return Err(EqsError::InvalidCustomRegion(format!(
            "min {} must be below max {} on every axis",
            bounds.min, bounds.max
        )));
    }
    Ok(bounds)
}

fn discovered_region(statics: &[StaticGeometry], dynamics: &[DynamicObject], margin: f64) -> Bounds {
    let region = statics
        .iter()
        .map(|g| g.bounds)
        .chain(dynamics.iter().map(|o| Bounds::from_point(o.position)))
        .reduce(|a, b| a.union(&b));
    match region {
        Some(bounds) => bounds.expanded(margin),
        // Empty scene: a margin-sized cube around the world origin
        None => Bounds::from_point(Vec3::ZERO).expanded(margin.max(0.5)),
    }
}

fn axis_cells(extent: f64, cell_size: f64) -> EqsResult<usize> {
    if !(cell_size.is_finite() && cell_size > 0.0) {
        return Err(EqsError::InvalidCustomRegion(format!("cell size must be positive, got {}", cell_size)));
    }
    let cells = (extent / cell_size).ceil();
    if !cells.is_finite() || cells > usize::MAX as f64 {
        return Err(EqsError::InvalidCustomRegion(format!("extent {} is too large", extent)));
    }
    Ok((cells as usize).max(1))
}
