/// Distance metrics shared by conditions and scoring criteria
use crate::types::Vec3;
use serde::{Deserialize, Serialize};

/// How distance between two points is measured.
///
/// `Horizontal` ignores Y (XZ plane), `Vertical` only looks at Y.
/// `Squared` is the squared Euclidean distance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DistanceMetric {
    #[default]
    Euclidean,
    Manhattan,
    Chebyshev,
    Horizontal,
    Vertical,
    Squared,
}

impl DistanceMetric {
    pub fn distance(self, a: Vec3, b: Vec3) -> f64 {
        let d = (a - b).abs();
        match self {
            DistanceMetric::Euclidean => d.length(),
            DistanceMetric::Manhattan => d.x + d.y + d.z,
            DistanceMetric::Chebyshev => d.x.max(d.y).max(d.z),
            DistanceMetric::Horizontal => (d.x * d.x + d.z * d.z).sqrt(),
            DistanceMetric::Vertical => d.y,
            DistanceMetric::Squared => d.length_squared(),
        }
    }

    /// Monotonic stand-in for [`DistanceMetric::distance`] that skips square roots.
    ///
    /// Only valid for comparing distances measured with the same metric.
    pub fn ordering_key(self, a: Vec3, b: Vec3) -> f64 {
        let d = (a - b).abs();
        match self {
            DistanceMetric::Euclidean | DistanceMetric::Squared => d.length_squared(),
            DistanceMetric::Horizontal => d.x * d.x + d.z * d.z,
            other => other.distance(a, b),
        }
    }

    /// Converts a distance threshold into the space of [`DistanceMetric::ordering_key`].
    pub fn threshold_key(self, threshold: f64) -> f64 {
        match self {
            DistanceMetric::Euclidean | DistanceMetric::Horizontal => threshold * threshold,
            _ => threshold,
        }
    }

    /// `distance(a, b) <= max` without square roots.
    pub fn within(self, a: Vec3, b: Vec3, max: f64) -> bool {
        self.ordering_key(a, b) <= self.threshold_key(max)
    }

    /// `distance(a, b) >= min` without square roots.
    pub fn beyond(self, a: Vec3, b: Vec3, min: f64) -> bool {
        self.ordering_key(a, b) >= self.threshold_key(min)
    }
}
