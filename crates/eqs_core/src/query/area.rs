/// Area of interest: the region candidates are generated from
use crate::environment::AreaResolver;
use crate::error::{EqsError, EqsResult};
use crate::types::{Bounds, Quat, Vec3};
use serde::{Deserialize, Serialize};

/// Slack applied to rotated box containment so lattice points on a face are kept
const BOX_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AreaType {
    Sphere,
    Box,
    NamedArea,
}

/// Area of interest as written in a query.
///
/// Which fields are required depends on `area_type`: a sphere needs
/// `center` and `radius`, a box needs `center` and `size` (and optionally
/// `rotation`), a named area needs `area_name`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AreaOfInterest {
    #[serde(rename = "type")]
    pub area_type: AreaType,
    #[serde(default)]
    pub center: Option<Vec3>,
    #[serde(default)]
    pub radius: Option<f64>,
    /// Full edge lengths of a box
    #[serde(default)]
    pub size: Option<Vec3>,
    #[serde(default)]
    pub rotation: Option<Quat>,
    #[serde(default)]
    pub area_name: Option<String>,
}

impl AreaOfInterest {
    pub fn sphere(center: Vec3, radius: f64) -> Self {
        Self {
            area_type: AreaType::Sphere,
            center: Some(center),
            radius: Some(radius),
            size: None,
            rotation: None,
            area_name: None,
        }
    }

    pub fn boxed(center: Vec3, size: Vec3, rotation: Option<Quat>) -> Self {
        Self {
            area_type: AreaType::Box,
            center: Some(center),
            radius: None,
            size: Some(size),
            rotation,
            area_name: None,
        }
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            area_type: AreaType::NamedArea,
            center: None,
            radius: None,
            size: None,
            rotation: None,
            area_name: Some(name.into()),
        }
    }

    /// Turns the query-side description into a concrete, validated shape.
    pub fn resolve<A>(&self, resolver: &A) -> EqsResult<AreaShape>
    where
        A: AreaResolver + ?Sized,
    {
        let shape = match self.area_type {
            AreaType::Sphere => AreaShape::Sphere {
                center: self.required_center("sphere")?,
                radius: self
                    .radius
                    .ok_or_else(|| invalid("sphere requires a radius"))?,
            },
            AreaType::Box => {
                let size = self.size.ok_or_else(|| invalid("box requires a size"))?;
                AreaShape::Box {
                    center: self.required_center("box")?,
                    half_extents: size * 0.5,
                    rotation: self.rotation.unwrap_or(Quat::IDENTITY),
                }
            }
            AreaType::NamedArea => {
                let name = self
                    .area_name
                    .as_deref()
                    .filter(|n| !n.trim().is_empty())
                    .ok_or_else(|| invalid("namedArea requires an areaName"))?;
                resolver
                    .resolve_named_area(name)
                    .ok_or_else(|| invalid(&format!("named area '{}' is not known to the host", name)))?
            }
        };
        shape.validate()?;
        Ok(shape)
    }

    fn required_center(&self, what: &str) -> EqsResult<Vec3> {
        self.center
            .ok_or_else(|| invalid(&format!("{} requires a center", what)))
    }
}

fn invalid(reason: &str) -> EqsError {
    EqsError::InvalidAreaOfInterest(reason.to_string())
}

/// Concrete region used for candidate generation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "camelCase")]
pub enum AreaShape {
    Sphere {
        center: Vec3,
        radius: f64,
    },
    Box {
        center: Vec3,
        #[serde(rename = "halfExtents")]
        half_extents: Vec3,
        #[serde(default)]
        rotation: Quat,
    },
}

impl AreaShape {
    pub fn validate(&self) -> EqsResult<()> {
        match *self {
            AreaShape::Sphere { center, radius } => {
                if !center.is_finite() {
                    return Err(invalid("sphere center is not finite"));
                }
                if !(radius.is_finite() && radius > 0.0) {
                    return Err(invalid(&format!("sphere radius must be > 0, got {}", radius)));
                }
            }
            AreaShape::Box {
                center,
                half_extents,
                rotation,
            } => {
                if !center.is_finite() || !rotation.is_finite() {
                    return Err(invalid("box center and rotation must be finite"));
                }
                let h = half_extents;
                if !(h.is_finite() && h.x > 0.0 && h.y > 0.0 && h.z > 0.0) {
                    return Err(invalid(&format!("box size must be > 0 on every axis, got {}", h * 2.0)));
                }
            }
        }
        Ok(())
    }

    pub fn contains(&self, point: Vec3) -> bool {
        match *self {
            AreaShape::Sphere { center, radius } => point.distance_squared(center) <= radius * radius,
            AreaShape::Box {
                center,
                half_extents,
                rotation,
            } => {
                let local = rotation.normalized().conjugate().rotate(point - center).abs();
                local.x <= half_extents.x + BOX_EPSILON
                    && local.y <= half_extents.y + BOX_EPSILON
                    && local.z <= half_extents.z + BOX_EPSILON
            }
        }
    }

    /// World-space axis-aligned box enclosing the shape.
    pub fn bounding_box(&self) -> Bounds {
        match *self {
            AreaShape::Sphere { center, radius } => Bounds::from_center_size(center, Vec3::splat(radius * 2.0)),
            AreaShape::Box {
                center,
                half_extents,
                rotation,
            } => {
                let q = rotation.normalized();
                let extent = q.rotate(Vec3::new(half_extents.x, 0.0, 0.0)).abs()
                    + q.rotate(Vec3::new(0.0, half_extents.y, 0.0)).abs()
                    + q.rotate(Vec3::new(0.0, 0.0, half_extents.z)).abs();
                let slack = Vec3::splat(BOX_EPSILON);
                Bounds::new(center - extent - slack, center + extent + slack)
            }
        }
    }
}
