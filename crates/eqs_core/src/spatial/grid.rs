/// Uniform 3D grid with deterministic world <-> cell mapping
///
/// Cells are stored flat, row-major with x fastest, then y, then z:
/// `index = x + y * nx + z * nx * ny`.
use super::cell::Cell;
use super::GridInfo;
use crate::error::{EqsError, EqsResult};
use crate::types::{Bounds, GridCoord, GridDimensions, ObjectId, Vec3};
use serde::{Deserialize, Serialize};

/// Tolerance used when snapping world coordinates onto lattice indices
const LATTICE_EPSILON: f64 = 1e-9;

/// Converts a cell coordinate to its flat index.
///
/// Fails with [`EqsError::OutOfRange`] if any component is negative or not
/// smaller than its dimension.
pub fn coordinate_to_index(coord: GridCoord, dims: GridDimensions) -> EqsResult<usize> {
    let x = checked_axis("x", coord.x, dims.nx)?;
    let y = checked_axis("y", coord.y, dims.ny)?;
    let z = checked_axis("z", coord.z, dims.nz)?;
    Ok(x + y * dims.nx + z * dims.nx * dims.ny)
}

/// Inverse of [`coordinate_to_index`].
pub fn index_to_coordinate(index: usize, dims: GridDimensions) -> EqsResult<GridCoord> {
    let total = dims.cell_count().unwrap_or(usize::MAX);
    if index >= total {
        return Err(EqsError::OutOfRange {
            what: "index",
            value: i64::try_from(index).unwrap_or(i64::MAX),
            limit: total,
        });
    }
    let layer = dims.nx * dims.ny;
    let z = index / layer;
    let rem = index % layer;
    let y = rem / dims.nx;
    let x = rem % dims.nx;
    Ok(GridCoord::new(x as i64, y as i64, z as i64))
}

fn checked_axis(what: &'static str, value: i64, limit: usize) -> EqsResult<usize> {
    match usize::try_from(value) {
        Ok(v) if v < limit => Ok(v),
        _ => Err(EqsError::OutOfRange { what, value, limit }),
    }
}

/// Inclusive range of cell coordinates, iterated in ascending flat-index order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordRange {
    pub min: GridCoord,
    pub max: GridCoord,
}

impl CoordRange {
    pub fn iter(&self) -> impl Iterator<Item = GridCoord> {
        let (min, max) = (self.min, self.max);
        (min.z..=max.z).flat_map(move |z| {
            (min.y..=max.y).flat_map(move |y| (min.x..=max.x).map(move |x| GridCoord::new(x, y, z)))
        })
    }

    pub fn len(&self) -> usize {
        let span = |a: i64, b: i64| (b - a + 1).max(0) as usize;
        span(self.min.x, self.max.x) * span(self.min.y, self.max.y) * span(self.min.z, self.max.z)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The spatial grid of an environment snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpatialGrid {
    cell_size: f64,
    origin: Vec3,
    dimensions: GridDimensions,
    cells: Vec<Cell>,
}

impl SpatialGrid {
    /// Creates an empty grid.
    ///
    /// `max_cells` caps the allocation; exceeding it (or a non-positive cell
    /// size, or a zero dimension) is reported as an invalid region.
    pub fn new(origin: Vec3, cell_size: f64, dimensions: GridDimensions, max_cells: usize) -> EqsResult<Self> {
        if !(cell_size.is_finite() && cell_size > 0.0) {
            return Err(EqsError::InvalidCustomRegion(format!("cell size must be positive, got {}", cell_size)));
        }
        if !origin.is_finite() {
            return Err(EqsError::InvalidCustomRegion("grid origin is not finite".to_string()));
        }
        if dimensions.nx == 0 || dimensions.ny == 0 || dimensions.nz == 0 {
            return Err(EqsError::InvalidCustomRegion(format!("grid dimensions must be >= 1, got {}", dimensions)));
        }
        let total = match dimensions.cell_count() {
            Some(total) if total <= max_cells => total,
            _ => {
                return Err(EqsError::InvalidCustomRegion(format!(
                    "grid of {} cells exceeds the limit of {}",
                    dimensions, max_cells
                )))
            }
        };

        let mut cells = Vec::with_capacity(total);
        for index in 0..total {
            let coord = index_to_coordinate(index, dimensions)?;
            let world_position = origin + Vec3::new(coord.x as f64, coord.y as f64, coord.z as f64) * cell_size;
            cells.push(Cell::new(world_position, coord));
        }

        Ok(Self {
            cell_size,
            origin,
            dimensions,
            cells,
        })
    }

    pub fn cell_size(&self) -> f64 {
        self.cell_size
    }

    pub fn origin(&self) -> Vec3 {
        self.origin
    }

    pub fn dimensions(&self) -> GridDimensions {
        self.dimensions
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn coordinate_to_index(&self, coord: GridCoord) -> EqsResult<usize> {
        coordinate_to_index(coord, self.dimensions)
    }

    pub fn index_to_coordinate(&self, index: usize) -> EqsResult<GridCoord> {
        index_to_coordinate(index, self.dimensions)
    }

    /// `floor((position - origin) / cell_size)` per axis.
    ///
    /// No clamping: the result may lie outside the grid, use
    /// [`SpatialGrid::contains_coord`] before indexing.
    pub fn world_to_cell(&self, position: Vec3) -> GridCoord {
        let local = (position - self.origin) / self.cell_size;
        GridCoord::new(local.x.floor() as i64, local.y.floor() as i64, local.z.floor() as i64)
    }

    pub fn contains_coord(&self, coord: GridCoord) -> bool {
        coordinate_to_index(coord, self.dimensions).is_ok()
    }

    pub fn cell(&self, coord: GridCoord) -> EqsResult<&Cell> {
        let index = self.coordinate_to_index(coord)?;
        Ok(&self.cells[index])
    }

    pub fn cell_at_index(&self, index: usize) -> EqsResult<&Cell> {
        self.cells.get(index).ok_or(EqsError::OutOfRange {
            what: "index",
            value: i64::try_from(index).unwrap_or(i64::MAX),
            limit: self.cells.len(),
        })
    }

    fn cell_mut(&mut self, coord: GridCoord) -> EqsResult<&mut Cell> {
        let index = self.coordinate_to_index(coord)?;
        Ok(&mut self.cells[index])
    }

    /// Volume covered by a cell: `[lattice, lattice + cell_size]`.
    pub fn cell_bounds(&self, coord: GridCoord) -> Bounds {
        let min = self.origin + Vec3::new(coord.x as f64, coord.y as f64, coord.z as f64) * self.cell_size;
        Bounds::new(min, min + Vec3::splat(self.cell_size))
    }

    /// World-space volume of the whole grid.
    pub fn world_bounds(&self) -> Bounds {
        let d = self.dimensions;
        let extent = Vec3::new(d.nx as f64, d.ny as f64, d.nz as f64) * self.cell_size;
        Bounds::new(self.origin, self.origin + extent)
    }

    /// Cells whose volume overlaps `bounds`, clamped to the grid.
    ///
    /// A box ending exactly on a cell boundary does not reach into the next
    /// cell. Returns `None` when there is no overlap at all.
    pub fn cells_overlapping(&self, bounds: &Bounds) -> Option<CoordRange> {
        let lo = (bounds.min - self.origin) / self.cell_size;
        let hi = (bounds.max - self.origin) / self.cell_size;
        let axis = |lo: f64, hi: f64, n: usize| -> Option<(i64, i64)> {
            let first = (lo + LATTICE_EPSILON).floor() as i64;
            let last = ((hi - LATTICE_EPSILON).ceil() as i64 - 1).max(first);
            clamp_axis(first, last, n)
        };
        let (x0, x1) = axis(lo.x, hi.x, self.dimensions.nx)?;
        let (y0, y1) = axis(lo.y, hi.y, self.dimensions.ny)?;
        let (z0, z1) = axis(lo.z, hi.z, self.dimensions.nz)?;
        Some(CoordRange {
            min: GridCoord::new(x0, y0, z0),
            max: GridCoord::new(x1, y1, z1),
        })
    }

    /// Cells whose lattice point lies inside the closed box `bounds`.
    pub fn lattice_within(&self, bounds: &Bounds) -> Option<CoordRange> {
        let lo = (bounds.min - self.origin) / self.cell_size;
        let hi = (bounds.max - self.origin) / self.cell_size;
        let axis = |lo: f64, hi: f64, n: usize| -> Option<(i64, i64)> {
            let first = (lo - LATTICE_EPSILON).ceil() as i64;
            let last = (hi + LATTICE_EPSILON).floor() as i64;
            if last < first {
                return None;
            }
            clamp_axis(first, last, n)
        };
        let (x0, x1) = axis(lo.x, hi.x, self.dimensions.nx)?;
        let (y0, y1) = axis(lo.y, hi.y, self.dimensions.ny)?;
        let (z0, z1) = axis(lo.z, hi.z, self.dimensions.nz)?;
        Some(CoordRange {
            min: GridCoord::new(x0, y0, z0),
            max: GridCoord::new(x1, y1, z1),
        })
    }

    /// Every cell whose lattice point is within `radius` of `center`.
    pub fn cells_within_radius(&self, center: Vec3, radius: f64) -> impl Iterator<Item = &Cell> + '_ {
        let radius_sq = radius * radius;
        let range = self.lattice_within(&Bounds::from_center_size(center, Vec3::splat(radius * 2.0)));
        range
            .into_iter()
            .flat_map(|r| r.iter())
            .filter_map(move |coord| self.cell(coord).ok())
            .filter(move |cell| cell.world_position.distance_squared(center) <= radius_sq)
    }

    /// Marks every cell overlapping `bounds` as statically occupied.
    ///
    /// Returns the number of cells touched.
    pub fn mark_static(&mut self, bounds: &Bounds) -> usize {
        let Some(range) = self.cells_overlapping(bounds) else {
            return 0;
        };
        let mut marked = 0;
        for coord in range.iter() {
            if let Ok(cell) = self.cell_mut(coord) {
                cell.static_occupancy = true;
                marked += 1;
            }
        }
        marked
    }

    /// Attaches a dynamic object to the cell containing `position`.
    ///
    /// Returns the cell coordinate, or `None` when the position is outside the grid.
    pub fn add_dynamic_occupant(&mut self, id: ObjectId, position: Vec3) -> Option<GridCoord> {
        let coord = self.world_to_cell(position);
        let cell = self.cell_mut(coord).ok()?;
        cell.dynamic_occupants.insert(id);
        Some(coord)
    }

    /// Detaches a dynamic object from every cell that lists it.
    pub fn remove_dynamic_occupant(&mut self, id: ObjectId) -> usize {
        let mut removed = 0;
        for cell in self.cells.iter_mut() {
            if cell.dynamic_occupants.remove(&id) {
                removed += 1;
            }
        }
        removed
    }

    pub fn set_property(&mut self, coord: GridCoord, key: impl Into<String>, value: serde_json::Value) -> EqsResult<()> {
        self.cell_mut(coord)?.properties.insert(key.into(), value);
        Ok(())
    }

    /// True if static geometry lies strictly between `from` and `to`.
    ///
    /// Walks every cell the segment passes through (Amanatides-Woo voxel
    /// traversal). The cells containing the two endpoints are ignored so a
    /// candidate never blocks itself.
    pub fn segment_blocked(&self, from: Vec3, to: Vec3) -> bool {
        let start = self.world_to_cell(from);
        let end = self.world_to_cell(to);
        if start == end {
            return false;
        }

        let local = (from - self.origin) / self.cell_size;
        let delta = (to - from) / self.cell_size;
        let (step_x, mut next_x, span_x) = traversal_axis(local.x, delta.x, start.x);
        let (step_y, mut next_y, span_y) = traversal_axis(local.y, delta.y, start.y);
        let (step_z, mut next_z, span_z) = traversal_axis(local.z, delta.z, start.z);

        // Each crossing moves one axis one cell closer to `end`
        let crossings = (end.x - start.x).abs() + (end.y - start.y).abs() + (end.z - start.z).abs();
        let mut current = start;
        for _ in 0..crossings {
            if next_x <= next_y && next_x <= next_z {
                current.x += step_x;
                next_x += span_x;
            } else if next_y <= next_z {
                current.y += step_y;
                next_y += span_y;
            } else {
                current.z += step_z;
                next_z += span_z;
            }
            if current == end {
                break;
            }
            if self.cell(current).map(|cell| cell.static_occupancy).unwrap_or(false) {
                return true;
            }
        }
        false
    }

    pub fn occupied_count(&self) -> usize {
        self.cells.iter().filter(|c| c.static_occupancy).count()
    }

    pub fn info(&self) -> GridInfo {
        GridInfo {
            cell_size: self.cell_size,
            origin: self.origin,
            dimensions: self.dimensions,
            total_cells: self.cells.len(),
            occupied_cells: self.occupied_count(),
        }
    }

    /// Feeds the grid geometry and per-cell occupancy into a content hasher.
    pub(crate) fn hash_into(&self, hasher: &mut blake3::Hasher) {
        hasher.update(&self.cell_size.to_le_bytes());
        for v in [self.origin.x, self.origin.y, self.origin.z] {
            hasher.update(&v.to_le_bytes());
        }
        for n in [self.dimensions.nx, self.dimensions.ny, self.dimensions.nz] {
            hasher.update(&(n as u64).to_le_bytes());
        }
        for cell in &self.cells {
            hasher.update(&[u8::from(cell.static_occupancy)]);
            hasher.update(&(cell.dynamic_occupants.len() as u64).to_le_bytes());
            for id in &cell.dynamic_occupants {
                hasher.update(&id.0.to_le_bytes());
            }
            if cell.properties.is_empty() {
                hasher.update(&0u64.to_le_bytes());
            } else if let Ok(bytes) = serde_json::to_vec(&cell.properties) {
                // BTreeMap ordering keeps this stable
                hasher.update(&(bytes.len() as u64).to_le_bytes());
                hasher.update(&bytes);
            }
        }
    }
}

/// Per-axis DDA state in cell units: step direction, segment parameter of
/// the first boundary crossing, and parameter span of one cell.
fn traversal_axis(position: f64, delta: f64, cell: i64) -> (i64, f64, f64) {
    if delta > 0.0 {
        (1, ((cell + 1) as f64 - position) / delta, 1.0 / delta)
    } else if delta < 0.0 {
        (-1, (cell as f64 - position) / delta, -1.0 / delta)
    } else {
        (0, f64::INFINITY, f64::INFINITY)
    }
}

fn clamp_axis(first: i64, last: i64, n: usize) -> Option<(i64, i64)> {
    let n = n as i64;
    if last < 0 || first >= n {
        return None;
    }
    Some((first.max(0), last.min(n - 1)))
}
