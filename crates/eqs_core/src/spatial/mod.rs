//! Spatial grid and distance math for the EQS
//!
//! This module provides the uniform 3D grid that candidate generation walks,
//! plus the distance metrics shared by conditions and scoring criteria.

mod cell;
mod grid;
mod metric;

pub use cell::Cell;
pub use grid::{coordinate_to_index, index_to_coordinate, CoordRange, SpatialGrid};
pub use metric::DistanceMetric;

/// Summary of a grid for status reports
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GridInfo {
    /// Edge length of one cell
    pub cell_size: f64,
    /// World position of cell (0, 0, 0)
    pub origin: crate::types::Vec3,
    /// Cells per axis
    pub dimensions: crate::types::GridDimensions,
    /// nx * ny * nz
    pub total_cells: usize,
    /// Cells with static occupancy set
    pub occupied_cells: usize,
}
