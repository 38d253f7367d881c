//! Declarative query description.
//!
//! Conditions and criteria arrive on the wire as `{type, parameters, ...}`
//! bags. They are resolved into [`ConditionKind`] / [`CriterionKind`] while
//! deserializing, so an unknown type or a malformed parameter set is rejected
//! before the executor ever sees the query.

use super::area::AreaOfInterest;
use crate::error::{EqsError, EqsResult};
use crate::spatial::DistanceMetric;
use crate::types::Vec3;
use serde::{Deserialize, Serialize};

/// Named anchor usable by conditions and criteria ("observer", "target", ...)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferencePoint {
    pub name: String,
    pub position: Vec3,
}

/// A complete query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryModel {
    /// Caller-supplied, unique per logical query; also the cache key
    pub query_id: String,
    /// Semantic hint only, not enforced by the executor
    #[serde(default)]
    pub target_object_type: Option<String>,
    #[serde(default)]
    pub reference_points: Vec<ReferencePoint>,
    /// Absent means the whole grid
    #[serde(default)]
    pub area_of_interest: Option<AreaOfInterest>,
    #[serde(default)]
    pub conditions: Vec<ConditionSpec>,
    #[serde(default)]
    pub scoring_criteria: Vec<CriterionSpec>,
    /// Falls back to the engine's configured default (10)
    #[serde(default)]
    pub desired_result_count: Option<usize>,
    /// Reference point every returned candidate should face (yaw only)
    #[serde(default)]
    pub face_towards: Option<String>,
}

impl QueryModel {
    pub fn new(query_id: impl Into<String>) -> Self {
        Self {
            query_id: query_id.into(),
            target_object_type: None,
            reference_points: Vec::new(),
            area_of_interest: None,
            conditions: Vec::new(),
            scoring_criteria: Vec::new(),
            desired_result_count: None,
            face_towards: None,
        }
    }

    pub fn with_reference(mut self, name: impl Into<String>, position: Vec3) -> Self {
        self.reference_points.push(ReferencePoint {
            name: name.into(),
            position,
        });
        self
    }

    pub fn with_area(mut self, area: AreaOfInterest) -> Self {
        self.area_of_interest = Some(area);
        self
    }

    pub fn with_condition(mut self, condition: ConditionSpec) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn with_criterion(mut self, criterion: CriterionSpec) -> Self {
        self.scoring_criteria.push(criterion);
        self
    }

    pub fn with_result_count(mut self, count: usize) -> Self {
        self.desired_result_count = Some(count);
        self
    }

    /// First reference point called `name`.
    pub fn reference(&self, name: &str) -> Option<Vec3> {
        self.reference_points
            .iter()
            .find(|r| r.name == name)
            .map(|r| r.position)
    }

    /// Structural checks that do not need an environment.
    pub fn validate(&self) -> EqsResult<()> {
        if self.query_id.trim().is_empty() {
            return Err(EqsError::InvalidParameter("queryId must not be empty".to_string()));
        }
        if self.desired_result_count == Some(0) {
            return Err(EqsError::InvalidParameter("desiredResultCount must be >= 1".to_string()));
        }
        if let Some(point) = self.reference_points.iter().find(|r| !r.position.is_finite()) {
            return Err(EqsError::InvalidParameter(format!(
                "reference point '{}' has a non-finite position",
                point.name
            )));
        }
        for condition in &self.conditions {
            if !condition.weight.is_finite() {
                return Err(EqsError::InvalidParameter(format!(
                    "condition {} has a non-finite weight",
                    condition.kind.type_name()
                )));
            }
            condition.kind.validate()?;
        }
        for criterion in &self.scoring_criteria {
            if !criterion.weight.is_finite() {
                return Err(EqsError::InvalidParameter(format!(
                    "criterion {} has a non-finite weight",
                    criterion.kind.type_name()
                )));
            }
            criterion.kind.validate()?;
        }
        Ok(())
    }
}

// ============================================================================
// Conditions
// ============================================================================

/// A filter predicate evaluated per candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawCondition")]
pub struct ConditionSpec {
    #[serde(flatten)]
    pub kind: ConditionKind,
    /// Carried for callers; pass/fail ignores it
    pub weight: f64,
    /// Flip the predicate
    pub invert: bool,
}

impl ConditionSpec {
    pub fn new(kind: ConditionKind) -> Self {
        Self {
            kind,
            weight: 1.0,
            invert: false,
        }
    }

    pub fn inverted(mut self) -> Self {
        self.invert = !self.invert;
        self
    }
}

/// Condition types and their parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "parameters",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum ConditionKind {
    /// Cell static occupancy equals `occupied`
    StaticOccupancy {
        #[serde(default)]
        occupied: bool,
    },
    /// Distance to a reference point within `[min_distance, max_distance]`
    DistanceTo {
        reference: String,
        min_distance: Option<f64>,
        max_distance: Option<f64>,
        #[serde(default)]
        metric: DistanceMetric,
    },
    /// No statically occupied cell within `radius`
    Clearance { radius: f64 },
    /// Some object (optionally of a type) within `max_distance`
    NearObject {
        object_type: Option<String>,
        max_distance: f64,
        #[serde(default)]
        metric: DistanceMetric,
    },
    /// The cell holds a dynamic object (optionally of a type)
    HasDynamicOccupant { object_type: Option<String> },
    /// No static geometry between the cell and a reference point
    LineOfSight { reference: String },
    /// A cell property equals a value
    CellProperty { key: String, equals: serde_json::Value },
    /// Cell height (Y) within bounds
    HeightRange { min: Option<f64>, max: Option<f64> },
}

impl ConditionKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            ConditionKind::StaticOccupancy { .. } => "staticOccupancy",
            ConditionKind::DistanceTo { .. } => "distanceTo",
            ConditionKind::Clearance { .. } => "clearance",
            ConditionKind::NearObject { .. } => "nearObject",
            ConditionKind::HasDynamicOccupant { .. } => "hasDynamicOccupant",
            ConditionKind::LineOfSight { .. } => "lineOfSight",
            ConditionKind::CellProperty { .. } => "cellProperty",
            ConditionKind::HeightRange { .. } => "heightRange",
        }
    }

    /// Name of the reference point this condition depends on, if any.
    pub fn reference(&self) -> Option<&str> {
        match self {
            ConditionKind::DistanceTo { reference, .. } | ConditionKind::LineOfSight { reference } => {
                Some(reference.as_str())
            }
            _ => None,
        }
    }

    fn validate(&self) -> EqsResult<()> {
        match self {
            ConditionKind::DistanceTo {
                min_distance,
                max_distance,
                ..
            } => {
                check_optional_distance("minDistance", *min_distance)?;
                check_optional_distance("maxDistance", *max_distance)?;
                if let (Some(min), Some(max)) = (min_distance, max_distance) {
                    if min > max {
                        return Err(EqsError::InvalidParameter(format!(
                            "distanceTo minDistance {} exceeds maxDistance {}",
                            min, max
                        )));
                    }
                }
                Ok(())
            }
            ConditionKind::Clearance { radius } => check_distance("clearance radius", *radius),
            ConditionKind::NearObject { max_distance, .. } => check_distance("nearObject maxDistance", *max_distance),
            ConditionKind::HeightRange { min, max } => match (min, max) {
                (Some(min), Some(max)) if min > max => Err(EqsError::InvalidParameter(format!(
                    "heightRange min {} exceeds max {}",
                    min, max
                ))),
                _ => Ok(()),
            },
            _ => Ok(()),
        }
    }
}

#[derive(Deserialize)]
struct RawCondition {
    #[serde(rename = "type")]
    condition_type: String,
    #[serde(default = "empty_parameters")]
    parameters: serde_json::Value,
    #[serde(default = "unit_weight")]
    weight: f64,
    #[serde(default)]
    invert: bool,
}

impl TryFrom<RawCondition> for ConditionSpec {
    type Error = String;

    fn try_from(raw: RawCondition) -> Result<Self, Self::Error> {
        let kind = resolve_kind(&raw.condition_type, raw.parameters).map_err(|e| format!("condition {}", e))?;
        Ok(Self {
            kind,
            weight: raw.weight,
            invert: raw.invert,
        })
    }
}

// ============================================================================
// Scoring criteria
// ============================================================================

/// How raw criterion scores are mapped before weighting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Normalization {
    /// `(raw - min) / (max - min)` over the surviving candidates
    #[default]
    Linear,
    /// `1 - linear`
    Inverse,
    /// Raw score unchanged
    Raw,
}

/// A weighted contribution to the final score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawCriterion")]
pub struct CriterionSpec {
    /// Label used in the score breakdown; defaults to the type name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(flatten)]
    pub kind: CriterionKind,
    pub weight: f64,
    pub normalization: Normalization,
}

impl CriterionSpec {
    pub fn new(kind: CriterionKind) -> Self {
        Self {
            name: None,
            kind,
            weight: 1.0,
            normalization: Normalization::Linear,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_normalization(mut self, normalization: Normalization) -> Self {
        self.normalization = normalization;
        self
    }
}

/// Criterion types and their parameters. Raw scores are "higher is better".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "parameters",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum CriterionKind {
    /// Closer to the reference point scores higher (`-distance`)
    ProximityTo {
        reference: String,
        #[serde(default)]
        metric: DistanceMetric,
    },
    /// Farther from the reference point scores higher (`distance`)
    DistanceFrom {
        reference: String,
        #[serde(default)]
        metric: DistanceMetric,
    },
    /// Higher cells, or cells closer to `target_height` when given
    HeightPreference { target_height: Option<f64> },
    /// Number of dynamic objects within `radius`
    ObjectDensity { radius: f64, object_type: Option<String> },
    /// Fraction of statically free cells within `radius`
    OpenSpace { radius: f64 },
    /// 1 when static geometry blocks the line to the reference point
    CoverFrom { reference: String },
    /// Numeric cell property, 0 when absent
    CellProperty { key: String },
}

impl CriterionKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            CriterionKind::ProximityTo { .. } => "proximityTo",
            CriterionKind::DistanceFrom { .. } => "distanceFrom",
            CriterionKind::HeightPreference { .. } => "heightPreference",
            CriterionKind::ObjectDensity { .. } => "objectDensity",
            CriterionKind::OpenSpace { .. } => "openSpace",
            CriterionKind::CoverFrom { .. } => "coverFrom",
            CriterionKind::CellProperty { .. } => "cellProperty",
        }
    }

    pub fn reference(&self) -> Option<&str> {
        match self {
            CriterionKind::ProximityTo { reference, .. }
            | CriterionKind::DistanceFrom { reference, .. }
            | CriterionKind::CoverFrom { reference } => Some(reference.as_str()),
            _ => None,
        }
    }

    fn validate(&self) -> EqsResult<()> {
        match self {
            CriterionKind::ObjectDensity { radius, .. } => check_distance("objectDensity radius", *radius),
            CriterionKind::OpenSpace { radius } => check_distance("openSpace radius", *radius),
            CriterionKind::HeightPreference { target_height } => match target_height {
                Some(h) if !h.is_finite() => Err(EqsError::InvalidParameter(
                    "heightPreference targetHeight must be finite".to_string(),
                )),
                _ => Ok(()),
            },
            _ => Ok(()),
        }
    }
}

#[derive(Deserialize)]
struct RawCriterion {
    #[serde(default)]
    name: Option<String>,
    #[serde(rename = "type")]
    criterion_type: String,
    #[serde(default = "empty_parameters")]
    parameters: serde_json::Value,
    #[serde(default = "unit_weight")]
    weight: f64,
    #[serde(default)]
    normalization: Normalization,
}

impl TryFrom<RawCriterion> for CriterionSpec {
    type Error = String;

    fn try_from(raw: RawCriterion) -> Result<Self, Self::Error> {
        let kind = resolve_kind(&raw.criterion_type, raw.parameters).map_err(|e| format!("criterion {}", e))?;
        Ok(Self {
            name: raw.name,
            kind,
            weight: raw.weight,
            normalization: raw.normalization,
        })
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn empty_parameters() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

fn unit_weight() -> f64 {
    1.0
}

/// Resolves a `{type, parameters}` pair into a typed kind. Type names are
/// accepted in camelCase or PascalCase.
fn resolve_kind<K>(type_name: &str, parameters: serde_json::Value) -> Result<K, String>
where
    K: serde::de::DeserializeOwned,
{
    let mut chars = type_name.trim().chars();
    let canonical: String = match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => return Err("type must not be empty".to_string()),
    };
    let tagged = serde_json::json!({ "type": canonical, "parameters": parameters });
    serde_json::from_value(tagged).map_err(|e| format!("'{}': {}", type_name, e))
}

fn check_distance(what: &str, value: f64) -> EqsResult<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(EqsError::InvalidParameter(format!("{} must be a finite value >= 0, got {}", what, value)))
    }
}

fn check_optional_distance(what: &str, value: Option<f64>) -> EqsResult<()> {
    value.map_or(Ok(()), |v| check_distance(what, v))
}
