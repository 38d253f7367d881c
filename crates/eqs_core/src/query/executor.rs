//! # Query Executor
//!
//! Evaluates a [`QueryModel`] against one [`EnvironmentSnapshot`]:
//!
//! 1. **Candidates** - every cell whose lattice point lies in the area of
//!    interest (the whole grid when there is none)
//! 2. **Filtering** - all conditions must pass (logical AND, `invert` flips
//!    a single condition)
//! 3. **Scoring** - raw criterion scores are normalized over the surviving
//!    batch, weighted and summed
//! 4. **Ranking** - descending score, ascending cell index on ties, truncated
//!    to the desired result count
//!
//! Conditions and criteria that name a missing reference point are skipped
//! and reported in `warnings`, which turns `Success` into `PartialSuccess`.
//! Every error is folded into a `Failure` result; [`QueryExecutor::execute`]
//! never returns `Err`.
//!
//! Per-candidate work is independent, so batches larger than
//! `parallel_threshold` are spread over the rayon pool and collected in
//! index order before ranking.

use super::model::{ConditionKind, ConditionSpec, CriterionKind, CriterionSpec, Normalization, QueryModel};
use super::result::{Candidate, QueryResult, QueryStatus};
use super::AreaShape;
use crate::config::QuerySettings;
use crate::environment::{AreaResolver, EnvironmentSnapshot};
use crate::error::{EqsError, EqsResult};
use crate::spatial::{Cell, DistanceMetric, SpatialGrid};
use crate::types::{Quat, Vec3};
use rayon::prelude::*;
use std::collections::{BTreeMap, HashMap};
use std::time::Instant;
use tracing::{debug, warn};

/// Runs queries; borrows its settings and the named-area resolver.
pub struct QueryExecutor<'a, A: ?Sized> {
    settings: &'a QuerySettings,
    areas: &'a A,
}

/// A condition whose reference point (if any) has been resolved
struct ActiveCondition<'q> {
    spec: &'q ConditionSpec,
    reference: Option<Vec3>,
}

/// A criterion with its breakdown label and resolved reference point
struct ActiveCriterion<'q> {
    spec: &'q CriterionSpec,
    label: String,
    reference: Option<Vec3>,
}

impl<'a, A> QueryExecutor<'a, A>
where
    A: AreaResolver + ?Sized,
{
    pub fn new(settings: &'a QuerySettings, areas: &'a A) -> Self {
        Self { settings, areas }
    }

    pub fn execute(&self, snapshot: &EnvironmentSnapshot, query: &QueryModel) -> QueryResult {
        let started = Instant::now();
        let mut result = match self.evaluate(snapshot, query) {
            Ok(result) => result,
            Err(error) => {
                warn!("Query '{}' failed: {}", query.query_id, error);
                QueryResult::failure(&query.query_id, &error)
            }
        };
        result.environment_hash = snapshot.hash().to_string();
        result.execution_time_ms = started.elapsed().as_secs_f64() * 1000.0;
        debug!(
            "Query '{}' finished {:?}: {}/{} candidates passed, {} returned in {:.3}ms",
            result.query_id,
            result.status,
            result.candidates_passed,
            result.candidates_evaluated,
            result.results.len(),
            result.execution_time_ms
        );
        result
    }

    fn evaluate(&self, snapshot: &EnvironmentSnapshot, query: &QueryModel) -> EqsResult<QueryResult> {
        query.validate()?;
        let grid = snapshot.grid();
        let area = query
            .area_of_interest
            .as_ref()
            .map(|a| a.resolve(self.areas))
            .transpose()?;

        let mut warnings = Vec::new();
        let conditions = active_conditions(query, &mut warnings);
        let criteria = active_criteria(query, &mut warnings);
        let facing = match query.face_towards.as_deref() {
            Some(name) => {
                let target = query.reference(name);
                if target.is_none() {
                    warnings.push(format!("faceTowards skipped: reference point '{}' not found", name));
                }
                target
            }
            None => None,
        };
        for warning in &warnings {
            warn!("Query '{}': {}", query.query_id, warning);
        }

        let candidates = generate_candidates(grid, area.as_ref());
        let evaluated = candidates.len();
        debug!("Query '{}' generated {} candidates", query.query_id, evaluated);

        let survivors: Vec<&Cell> = if evaluated > self.settings.parallel_threshold {
            candidates
                .par_iter()
                .copied()
                .filter(|cell| passes_all(&conditions, cell, snapshot))
                .collect()
        } else {
            candidates
                .iter()
                .copied()
                .filter(|cell| passes_all(&conditions, cell, snapshot))
                .collect()
        };

        if survivors.is_empty() {
            let error = EqsError::NoQueryResults(format!(
                "none of {} candidates passed the query conditions",
                evaluated
            ));
            let mut result = QueryResult::failure(&query.query_id, &error);
            result.candidates_evaluated = evaluated;
            result.warnings = warnings;
            return Ok(result);
        }

        let raw_scores: Vec<Vec<f64>> = if survivors.len() > self.settings.parallel_threshold {
            survivors
                .par_iter()
                .map(|cell| criteria.iter().map(|c| c.raw_score(cell, snapshot)).collect::<Vec<f64>>())
                .collect()
        } else {
            survivors
                .iter()
                .map(|cell| criteria.iter().map(|c| c.raw_score(cell, snapshot)).collect::<Vec<f64>>())
                .collect()
        };

        let mut ranked = survivors
            .iter()
            .map(|cell| {
                Ok(Candidate {
                    world_position: cell.world_position,
                    rotation: facing.map(|target| Quat::look_rotation_y(cell.world_position, target)),
                    score: 0.0,
                    breakdown_scores: BTreeMap::new(),
                    cell_indices: Some(cell.indices),
                    cell_index: grid.coordinate_to_index(cell.indices)?,
                    associated_object_ids: cell.dynamic_occupants.iter().copied().collect(),
                })
            })
            .collect::<EqsResult<Vec<_>>>()?;

        for (column, criterion) in criteria.iter().enumerate() {
            let (min, max) = raw_scores
                .iter()
                .map(|row| row[column])
                .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
            for (candidate, row) in ranked.iter_mut().zip(&raw_scores) {
                let contribution = normalize(row[column], min, max, criterion.spec.normalization) * criterion.spec.weight;
                candidate.score += contribution;
                candidate.breakdown_scores.insert(criterion.label.clone(), contribution);
            }
        }

        let passed = ranked.len();
        ranked.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.cell_index.cmp(&b.cell_index)));
        let limit = query
            .desired_result_count
            .unwrap_or(self.settings.default_result_count)
            .max(1);
        ranked.truncate(limit);

        Ok(QueryResult {
            query_id: query.query_id.clone(),
            status: if warnings.is_empty() {
                QueryStatus::Success
            } else {
                QueryStatus::PartialSuccess
            },
            error_kind: None,
            error_message: None,
            execution_time_ms: 0.0,
            environment_hash: String::new(),
            candidates_evaluated: evaluated,
            candidates_passed: passed,
            warnings,
            results: ranked,
        })
    }
}

fn active_conditions<'q>(query: &'q QueryModel, warnings: &mut Vec<String>) -> Vec<ActiveCondition<'q>> {
    let mut active = Vec::with_capacity(query.conditions.len());
    for (position, spec) in query.conditions.iter().enumerate() {
        let reference = match spec.kind.reference() {
            Some(name) => match query.reference(name) {
                Some(point) => Some(point),
                None => {
                    warnings.push(format!(
                        "condition #{} ({}) skipped: reference point '{}' not found",
                        position + 1,
                        spec.kind.type_name(),
                        name
                    ));
                    continue;
                }
            },
            None => None,
        };
        active.push(ActiveCondition { spec, reference });
    }
    active
}

fn active_criteria<'q>(query: &'q QueryModel, warnings: &mut Vec<String>) -> Vec<ActiveCriterion<'q>> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut active = Vec::with_capacity(query.scoring_criteria.len());
    for spec in &query.scoring_criteria {
        let base = spec
            .name
            .clone()
            .unwrap_or_else(|| spec.kind.type_name().to_string());
        let occurrence = seen.entry(base.clone()).or_insert(0);
        *occurrence += 1;
        let label = if *occurrence == 1 {
            base
        } else {
            format!("{}#{}", base, occurrence)
        };

        let reference = match spec.kind.reference() {
            Some(name) => match query.reference(name) {
                Some(point) => Some(point),
                None => {
                    warnings.push(format!(
                        "criterion '{}' skipped: reference point '{}' not found",
                        label, name
                    ));
                    continue;
                }
            },
            None => None,
        };
        active.push(ActiveCriterion { spec, label, reference });
    }
    active
}

/// Cells inside `area`, in ascending index order.
fn generate_candidates<'g>(grid: &'g SpatialGrid, area: Option<&AreaShape>) -> Vec<&'g Cell> {
    let Some(shape) = area else {
        return grid.cells().iter().collect();
    };
    let Some(range) = grid.lattice_within(&shape.bounding_box()) else {
        return Vec::new();
    };
    range
        .iter()
        .filter_map(|coord| grid.cell(coord).ok())
        .filter(|cell| shape.contains(cell.world_position))
        .collect()
}

fn passes_all(conditions: &[ActiveCondition<'_>], cell: &Cell, snapshot: &EnvironmentSnapshot) -> bool {
    conditions.iter().all(|c| c.passes(cell, snapshot))
}

fn type_matches(filter: &Option<String>, actual: &str) -> bool {
    filter.as_deref().map_or(true, |wanted| wanted == actual)
}

impl ActiveCondition<'_> {
    fn passes(&self, cell: &Cell, snapshot: &EnvironmentSnapshot) -> bool {
        let grid = snapshot.grid();
        let position = cell.world_position;
        let outcome = match &self.spec.kind {
            ConditionKind::StaticOccupancy { occupied } => cell.static_occupancy == *occupied,
            ConditionKind::DistanceTo {
                min_distance,
                max_distance,
                metric,
                ..
            } => self.reference.map_or(true, |target| {
                min_distance.map_or(true, |min| metric.beyond(position, target, min))
                    && max_distance.map_or(true, |max| metric.within(position, target, max))
            }),
            ConditionKind::Clearance { radius } => grid
                .cells_within_radius(position, *radius)
                .all(|nearby| !nearby.static_occupancy),
            ConditionKind::NearObject {
                object_type,
                max_distance,
                metric,
            } => {
                snapshot
                    .dynamic_objects()
                    .iter()
                    .filter(|o| type_matches(object_type, &o.object_type))
                    .any(|o| metric.within(position, o.position, *max_distance))
                    || snapshot
                        .static_geometry()
                        .iter()
                        .filter(|g| type_matches(object_type, &g.geometry_type))
                        .any(|g| metric.within(position, g.bounds.closest_point(position), *max_distance))
            }
            ConditionKind::HasDynamicOccupant { object_type } => match object_type {
                None => !cell.dynamic_occupants.is_empty(),
                Some(wanted) => cell.dynamic_occupants.iter().any(|id| {
                    snapshot
                        .dynamic_object(*id)
                        .is_some_and(|o| &o.object_type == wanted)
                }),
            },
            ConditionKind::LineOfSight { .. } => self
                .reference
                .map_or(true, |target| !grid.segment_blocked(position, target)),
            ConditionKind::CellProperty { key, equals } => cell.properties.get(key) == Some(equals),
            ConditionKind::HeightRange { min, max } => {
                min.map_or(true, |min| position.y >= min) && max.map_or(true, |max| position.y <= max)
            }
        };
        outcome != self.spec.invert
    }
}

impl ActiveCriterion<'_> {
    fn raw_score(&self, cell: &Cell, snapshot: &EnvironmentSnapshot) -> f64 {
        let grid = snapshot.grid();
        let position = cell.world_position;
        let target = self.reference.unwrap_or(position);
        match &self.spec.kind {
            CriterionKind::ProximityTo { metric, .. } => -metric.distance(position, target),
            CriterionKind::DistanceFrom { metric, .. } => metric.distance(position, target),
            CriterionKind::HeightPreference { target_height } => match target_height {
                Some(height) => -(position.y - height).abs(),
                None => position.y,
            },
            CriterionKind::ObjectDensity { radius, object_type } => snapshot
                .dynamic_objects()
                .iter()
                .filter(|o| type_matches(object_type, &o.object_type))
                .filter(|o| DistanceMetric::Euclidean.within(position, o.position, *radius))
                .count() as f64,
            CriterionKind::OpenSpace { radius } => {
                let (free, total) = grid
                    .cells_within_radius(position, *radius)
                    .fold((0usize, 0usize), |(free, total), nearby| {
                        (free + usize::from(!nearby.static_occupancy), total + 1)
                    });
                if total == 0 {
                    1.0
                } else {
                    free as f64 / total as f64
                }
            }
            CriterionKind::CoverFrom { .. } => {
                if grid.segment_blocked(position, target) {
                    1.0
                } else {
                    0.0
                }
            }
            CriterionKind::CellProperty { key } => cell.numeric_property(key).unwrap_or(0.0),
        }
    }
}

/// Maps a raw score into the batch range `[min, max]`.
///
/// A degenerate range (every candidate scored the same) maps to 1.0 so the
/// criterion still contributes its full weight.
fn normalize(raw: f64, min: f64, max: f64, mode: Normalization) -> f64 {
    let range = max - min;
    let linear = if range > f64::EPSILON { (raw - min) / range } else { 1.0 };
    match mode {
        Normalization::Linear => linear,
        Normalization::Inverse if range > f64::EPSILON => 1.0 - linear,
        Normalization::Inverse => 1.0,
        Normalization::Raw => raw,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::{DynamicObject, NoNamedAreas, StaticGeometry};
    use crate::error::ErrorKind;
    use crate::query::AreaOfInterest;
    use crate::types::{Bounds, GridCoord, GridDimensions, ObjectId};

    fn scenario_snapshot() -> EnvironmentSnapshot {
        let mut grid = SpatialGrid::new(Vec3::ZERO, 1.0, GridDimensions::new(2, 1, 2), 100).unwrap();
        let blocker = Bounds::new(Vec3::splat(0.1), Vec3::splat(0.9));
        grid.mark_static(&blocker);
        EnvironmentSnapshot::new(
            grid,
            vec![StaticGeometry {
                id: ObjectId(1),
                name: "Block".into(),
                bounds: blocker,
                geometry_type: "wall".into(),
            }],
            Vec::new(),
        )
    }

    /// 5 x 1 x 5 floor with a wall segment at x = 2 and two guards
    fn yard_snapshot() -> EnvironmentSnapshot {
        let mut grid = SpatialGrid::new(Vec3::ZERO, 1.0, GridDimensions::new(5, 1, 5), 1000).unwrap();
        let wall = Bounds::new(Vec3::new(2.1, 0.0, 1.1), Vec3::new(2.9, 1.0, 3.9));
        grid.mark_static(&wall);
        let guards = vec![
            DynamicObject {
                id: ObjectId(10),
                name: "GuardA".into(),
                position: Vec3::new(4.2, 0.0, 0.3),
                object_type: "enemy".into(),
                properties: BTreeMap::new(),
            },
            DynamicObject {
                id: ObjectId(11),
                name: "Dog".into(),
                position: Vec3::new(0.4, 0.0, 4.6),
                object_type: "animal".into(),
                properties: BTreeMap::new(),
            },
        ];
        for guard in &guards {
            grid.add_dynamic_occupant(guard.id, guard.position);
        }
        EnvironmentSnapshot::new(
            grid,
            vec![StaticGeometry {
                id: ObjectId(1),
                name: "Wall".into(),
                bounds: wall,
                geometry_type: "wall".into(),
            }],
            guards,
        )
    }

    fn run(snapshot: &EnvironmentSnapshot, query: &QueryModel) -> QueryResult {
        let settings = QuerySettings::default();
        QueryExecutor::new(&settings, &NoNamedAreas).execute(snapshot, query)
    }

    fn free_cells() -> ConditionSpec {
        ConditionSpec::new(ConditionKind::StaticOccupancy { occupied: false })
    }

    fn proximity(reference: &str) -> CriterionSpec {
        CriterionSpec::new(CriterionKind::ProximityTo {
            reference: reference.into(),
            metric: DistanceMetric::Euclidean,
        })
    }

    #[test]
    fn test_free_cell_proximity_scenario() {
        let query = QueryModel::new("scenario")
            .with_reference("target", Vec3::new(1.0, 0.0, 1.0))
            .with_condition(free_cells())
            .with_criterion(proximity("target"));
        let result = run(&scenario_snapshot(), &query);

        assert_eq!(result.status, QueryStatus::Success);
        assert_eq!(result.candidates_evaluated, 4);
        assert_eq!(result.candidates_passed, 3);
        let cells: Vec<GridCoord> = result.results.iter().filter_map(|c| c.cell_indices).collect();
        assert_eq!(
            cells,
            vec![GridCoord::new(1, 0, 1), GridCoord::new(1, 0, 0), GridCoord::new(0, 0, 1)]
        );
        assert_eq!(result.results[0].score, 1.0);
        assert_eq!(result.results[0].breakdown_scores["proximityTo"], 1.0);
        assert_eq!(result.results[1].score, 0.0);
        assert_eq!(result.environment_hash, scenario_snapshot().hash());
    }

    #[test]
    fn test_invert_flips_condition() {
        let query = QueryModel::new("occupied").with_condition(free_cells().inverted());
        let result = run(&scenario_snapshot(), &query);
        assert_eq!(result.candidates_passed, 1);
        assert_eq!(result.results[0].cell_indices, Some(GridCoord::new(0, 0, 0)));
    }

    #[test]
    fn test_invalid_sphere_fails_query() {
        let query = QueryModel::new("bad-area").with_area(AreaOfInterest::sphere(Vec3::ZERO, 0.0));
        let result = run(&scenario_snapshot(), &query);
        assert_eq!(result.status, QueryStatus::Failure);
        assert_eq!(result.error_kind, Some(ErrorKind::InvalidAreaOfInterest));
        assert!(result.error_message.is_some());
    }

    #[test]
    fn test_no_survivors_is_failure() {
        let query = QueryModel::new("too-high").with_condition(ConditionSpec::new(ConditionKind::HeightRange {
            min: Some(10.0),
            max: None,
        }));
        let result = run(&yard_snapshot(), &query);
        assert_eq!(result.status, QueryStatus::Failure);
        assert_eq!(result.error_kind, Some(ErrorKind::NoQueryResults));
        assert_eq!(result.candidates_evaluated, 25);
        assert_eq!(result.candidates_passed, 0);
    }

    #[test]
    fn test_missing_reference_gives_partial_success() {
        let query = QueryModel::new("ghost")
            .with_condition(ConditionSpec::new(ConditionKind::LineOfSight { reference: "ghost".into() }))
            .with_criterion(proximity("ghost"))
            .with_criterion(CriterionSpec::new(CriterionKind::HeightPreference { target_height: None }));
        let result = run(&yard_snapshot(), &query);
        assert_eq!(result.status, QueryStatus::PartialSuccess);
        assert_eq!(result.warnings.len(), 2);
        assert_eq!(result.candidates_passed, 25);
        assert!(result.results[0].breakdown_scores.contains_key("heightPreference"));
        assert!(!result.results[0].breakdown_scores.contains_key("proximityTo"));
    }

    #[test]
    fn test_sphere_area_limits_candidates() {
        let query = QueryModel::new("ring").with_area(AreaOfInterest::sphere(Vec3::new(2.0, 0.0, 2.0), 1.0));
        let result = run(&yard_snapshot(), &query);
        assert_eq!(result.candidates_evaluated, 5);
        // No criteria: every score is 0 and ties fall back to index order
        let indices: Vec<usize> = result.results.iter().map(|c| c.cell_index).collect();
        assert_eq!(indices, vec![7, 11, 12, 13, 17]);
    }

    #[test]
    fn test_result_count_truncates() {
        let query = QueryModel::new("three").with_result_count(3);
        assert_eq!(run(&yard_snapshot(), &query).results.len(), 3);
        let default_count = QueryModel::new("default");
        assert_eq!(run(&yard_snapshot(), &default_count).results.len(), 10);
    }

    #[test]
    fn test_parallel_and_sequential_agree() {
        let query = QueryModel::new("det")
            .with_reference("enemy", Vec3::new(4.0, 0.0, 2.0))
            .with_condition(free_cells())
            .with_criterion(CriterionSpec::new(CriterionKind::CoverFrom { reference: "enemy".into() }).with_weight(2.0))
            .with_criterion(CriterionSpec::new(CriterionKind::OpenSpace { radius: 1.5 }))
            .with_result_count(25);
        let snapshot = yard_snapshot();

        let sequential = QuerySettings {
            parallel_threshold: usize::MAX,
            ..Default::default()
        };
        let parallel = QuerySettings {
            parallel_threshold: 0,
            ..Default::default()
        };
        let a = QueryExecutor::new(&sequential, &NoNamedAreas).execute(&snapshot, &query);
        let b = QueryExecutor::new(&parallel, &NoNamedAreas).execute(&snapshot, &query);
        assert_eq!(a.results, b.results);

        // Behind the wall, seen from the enemy at x = 4
        let best = a.best().unwrap();
        assert_eq!(best.breakdown_scores["coverFrom"], 2.0);
        assert!(best.world_position.x < 2.0);
    }

    #[test]
    fn test_inverse_distance_matches_proximity() {
        let reference = Vec3::new(3.0, 0.0, 1.0);
        let proximity_query = QueryModel::new("p")
            .with_reference("r", reference)
            .with_criterion(proximity("r"))
            .with_result_count(25);
        let inverse_query = QueryModel::new("i")
            .with_reference("r", reference)
            .with_criterion(
                CriterionSpec::new(CriterionKind::DistanceFrom {
                    reference: "r".into(),
                    metric: DistanceMetric::Euclidean,
                })
                .with_normalization(Normalization::Inverse),
            )
            .with_result_count(25);
        let snapshot = yard_snapshot();
        let p = run(&snapshot, &proximity_query);
        let i = run(&snapshot, &inverse_query);
        for (a, b) in p.results.iter().zip(&i.results) {
            assert_eq!(a.cell_index, b.cell_index);
            assert!((a.score - b.score).abs() < 1e-12);
        }
    }

    #[test]
    fn test_duplicate_criteria_get_distinct_labels() {
        let query = QueryModel::new("dup")
            .with_reference("a", Vec3::ZERO)
            .with_reference("b", Vec3::new(4.0, 0.0, 4.0))
            .with_criterion(proximity("a"))
            .with_criterion(proximity("b").with_weight(0.5));
        let result = run(&yard_snapshot(), &query);
        let keys: Vec<&String> = result.results[0].breakdown_scores.keys().collect();
        assert_eq!(keys, vec!["proximityTo", "proximityTo#2"]);
    }

    #[test]
    fn test_dynamic_occupants_and_object_conditions() {
        let occupied = QueryModel::new("enemies").with_condition(ConditionSpec::new(ConditionKind::HasDynamicOccupant {
            object_type: Some("enemy".into()),
        }));
        let result = run(&yard_snapshot(), &occupied);
        assert_eq!(result.candidates_passed, 1);
        assert_eq!(result.results[0].associated_object_ids, vec![ObjectId(10)]);

        let near_wall = QueryModel::new("near-wall")
            .with_condition(free_cells())
            .with_condition(ConditionSpec::new(ConditionKind::NearObject {
                object_type: Some("wall".into()),
                max_distance: 0.5,
                metric: DistanceMetric::Euclidean,
            }));
        let result = run(&yard_snapshot(), &near_wall);
        // Free lattice points beside the wall box (2.1..2.9, 1.1..3.9)
        assert_eq!(result.candidates_passed, 5);
        assert!(result
            .results
            .iter()
            .all(|c| (2.0..=3.0).contains(&c.world_position.x) && c.world_position.z >= 1.0));
    }

    #[test]
    fn test_face_towards_rotates_candidates() {
        let mut query = QueryModel::new("face")
            .with_reference("target", Vec3::new(4.0, 0.0, 4.0))
            .with_result_count(25);
        query.face_towards = Some("target".into());
        let result = run(&yard_snapshot(), &query);
        let origin = result.results.iter().find(|c| c.cell_index == 0).unwrap();
        let forward = origin.rotation.unwrap().rotate(Vec3::new(0.0, 0.0, 1.0));
        let expected = std::f64::consts::FRAC_1_SQRT_2;
        assert!((forward.x - expected).abs() < 1e-9);
        assert!((forward.z - expected).abs() < 1e-9);
    }
}
