//! Configuration settings structures
//!
//! The root [`Config`] embeds the engine's own [`EngineConfig`] so a single
//! TOML file drives both the process and the query core.

use eqs_core::EngineConfig;
use serde::{Deserialize, Serialize};

/// Main configuration structure
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct Config {
    /// Grid, query and visualization settings for the engine
    #[serde(default)]
    pub engine: EngineConfig,
    /// Where the world comes from
    #[serde(default)]
    pub scene: SceneSettings,
    /// Process loop settings
    pub server: ServerSettings,
    /// Optional logging configuration
    pub logging: Option<LoggingSettings>,
}

/// Scene source
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct SceneSettings {
    /// JSON scene document; an empty host is used when absent
    pub path: Option<String>,

    /// Scene created when no document is loaded
    pub default_scene: String,
}

impl Default for SceneSettings {
    fn default() -> Self {
        Self {
            path: None,
            default_scene: "Main".to_string(),
        }
    }
}

/// Request loop and housekeeping
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct ServerSettings {
    /// How often expired visualizations are swept, in milliseconds (0 disables)
    pub sweep_interval_ms: u64,

    /// Build the environment before accepting requests
    pub build_on_start: bool,
}

/// Logging system configuration
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct LoggingSettings {
    /// Valid values: "trace", "debug", "info", "warn", "error"
    pub level: String,

    /// Enable JSON-formatted log output
    pub json_format: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            scene: SceneSettings::default(),
            server: ServerSettings {
                sweep_interval_ms: 1000,
                build_on_start: true,
            },
            logging: Some(LoggingSettings {
                level: "info".to_string(),
                json_format: false,
            }),
        }
    }
}

impl Config {
    /// Checks values the engine would otherwise reject at first use.
    pub fn validate(&self) -> Result<(), String> {
        let cell_size = self.engine.grid.cell_size;
        if !(cell_size.is_finite() && cell_size > 0.0) {
            return Err(format!("Grid cell_size must be positive and finite, got {}", cell_size));
        }
        if self.engine.grid.max_cells == 0 {
            return Err("Grid max_cells must be at least 1".to_string());
        }
        if self.engine.query.default_result_count == 0 {
            return Err("Query default_result_count must be at least 1".to_string());
        }
        let ttl = self.engine.visualization.default_ttl_seconds;
        if !(ttl.is_finite() && ttl > 0.0) {
            return Err(format!("Visualization default_ttl_seconds must be positive, got {}", ttl));
        }
        if self.scene.default_scene.trim().is_empty() {
            return Err("Scene default_scene cannot be empty".to_string());
        }

        if let Some(logging) = &self.logging {
            let valid_levels = ["trace", "debug", "info", "warn", "error"];
            if !valid_levels.contains(&logging.level.as_str()) {
                return Err(format!(
                    "Invalid log level: {}. Must be one of: {valid_levels:?}",
                    logging.level
                ));
            }
        }

        Ok(())
    }
}
