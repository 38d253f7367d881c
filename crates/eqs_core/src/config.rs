//! Engine configuration types and defaults.
//!
//! These structures are embedded in the host process configuration file
//! (see the `eqs_server` crate) and can be serialized to/from TOML.

use serde::{Deserialize, Serialize};

/// Root configuration of an [`crate::EqsEngine`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Grid construction settings
    #[serde(default)]
    pub grid: GridSettings,
    /// Query execution settings
    #[serde(default)]
    pub query: QuerySettings,
    /// Debug visualization settings
    #[serde(default)]
    pub visualization: VisualizationSettings,
}

/// How environment grids are sized
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridSettings {
    /// Edge length of a cell in world units
    pub cell_size: f64,

    /// Margin added around the discovered geometry when no bounds override
    /// is given
    pub bounds_margin: f64,

    /// Upper limit on nx * ny * nz; larger regions are rejected
    pub max_cells: usize,

    /// Ask the host for per-cell properties while building
    pub collect_cell_properties: bool,
}

impl Default for GridSettings {
    fn default() -> Self {
        Self {
            cell_size: 1.0,
            bounds_margin: 2.0,
            max_cells: 2_000_000,
            collect_cell_properties: false,
        }
    }
}

/// Query executor tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuerySettings {
    /// Result count used when a query does not specify one
    pub default_result_count: usize,

    /// Candidate count above which evaluation is spread over the rayon pool
    pub parallel_threshold: usize,

    /// Store results in the query cache
    pub cache_enabled: bool,
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self {
            default_result_count: 10,
            parallel_threshold: 512,
            cache_enabled: true,
        }
    }
}

/// Debug visualization lifecycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualizationSettings {
    /// TTL used when a caller does not give one
    pub default_ttl_seconds: f64,

    /// Maximum markers spawned per activation
    pub max_markers: usize,
}

impl Default for VisualizationSettings {
    fn default() -> Self {
        Self {
            default_ttl_seconds: 30.0,
            max_markers: 50,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: EngineConfig = serde_json::from_str(r#"{"grid": {"cell_size": 0.5, "bounds_margin": 1.0, "max_cells": 1000, "collect_cell_properties": true}}"#).unwrap();
        assert_eq!(config.grid.cell_size, 0.5);
        assert!(config.grid.collect_cell_properties);
        assert_eq!(config.query, QuerySettings::default());
        assert_eq!(config.visualization.max_markers, 50);
    }
}
