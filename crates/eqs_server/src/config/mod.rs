//! Configuration module for the EQS host process
//!
//! Handles command-line arguments, configuration file parsing and the
//! scene document the in-memory host is seeded from.

pub mod args;
pub mod settings;

pub use args::Args;
pub use settings::{Config, LoggingSettings, SceneSettings, ServerSettings};

use anyhow::{Context, Result};
use eqs_core::SceneDocument;
use std::path::Path;
use tracing::{info, warn};

/// Load configuration from file or create default configuration
///
/// Command-line overrides from `args` are applied on top and the result is
/// validated before it is returned.
///
/// # Errors
/// * Returns error if file I/O operations fail
/// * Returns error if TOML parsing fails
/// * Returns error if the merged configuration is invalid
pub async fn load_config(args: &Args) -> Result<Config> {
    let mut config = if args.config.exists() {
        let config_str = tokio::fs::read_to_string(&args.config).await?;
        match toml::de::from_str::<Config>(&config_str) {
            Ok(config) => config,
            Err(e) => {
                warn!("Failed to parse config file {}: {}", args.config.display(), e);
                return Err(e.into());
            }
        }
    } else {
        warn!("Configuration file not found: {}, using defaults", args.config.display());

        let default_config = Config::default();
        let config_str = toml::to_string_pretty(&default_config)?;
        tokio::fs::write(&args.config, config_str).await?;
        info!("Created default configuration file: {}", args.config.display());

        default_config
    };

    apply_overrides(&mut config, args);
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Configuration validation failed: {}", e))?;
    Ok(config)
}

fn apply_overrides(config: &mut Config, args: &Args) {
    if let Some(scene) = &args.scene {
        config.scene.path = Some(scene.to_string_lossy().to_string());
    }
    if let Some(cell_size) = args.cell_size {
        config.engine.grid.cell_size = cell_size;
    }
    if args.debug || args.json_logs {
        let logging = config.logging.get_or_insert_with(|| LoggingSettings {
            level: "info".to_string(),
            json_format: false,
        });
        if args.debug {
            logging.level = "debug".to_string();
        }
        if args.json_logs {
            logging.json_format = true;
        }
    }
}

/// Reads a JSON scene document.
pub async fn load_scene_document(path: &Path) -> Result<SceneDocument> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read scene document {}", path.display()))?;
    let document: SceneDocument = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse scene document {}", path.display()))?;
    info!(
        "📂 Loaded scene document {} ({} scene(s), {} template(s))",
        path.display(),
        document.scenes.len(),
        document.templates.len()
    );
    Ok(document)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[tokio::test]
    async fn test_load_config_default() {
        let temp_file = NamedTempFile::new().unwrap();
        let args = Args {
            config: temp_file.path().to_path_buf(),
            ..Default::default()
        };

        // Delete the file to test default creation
        drop(temp_file);

        let config = load_config(&args).await.unwrap();
        assert_eq!(config, Config::default());
        assert!(args.config.exists());

        tokio::fs::remove_file(&args.config).await.ok();
    }

    #[tokio::test]
    async fn test_load_config_existing_with_overrides() {
        let mut temp_file = NamedTempFile::new().unwrap();
        let config_content = r#"
[server]
sweep_interval_ms = 500
build_on_start = true

[logging]
level = "warn"
json_format = false
        "#;
        temp_file.write_all(config_content.as_bytes()).unwrap();

        let args = Args {
            config: temp_file.path().to_path_buf(),
            scene: Some("world.json".into()),
            debug: true,
            cell_size: Some(0.25),
            ..Default::default()
        };

        let config = load_config(&args).await.unwrap();
        assert_eq!(config.server.sweep_interval_ms, 500);
        assert_eq!(config.engine.grid.cell_size, 0.25);
        assert_eq!(config.scene.path.as_deref(), Some("world.json"));
        assert_eq!(config.logging.unwrap().level, "debug");
    }

    #[tokio::test]
    async fn test_invalid_override_is_rejected() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file
            .write_all(b"[server]\nsweep_interval_ms = 0\nbuild_on_start = false\n")
            .unwrap();
        let args = Args {
            config: temp_file.path().to_path_buf(),
            cell_size: Some(-1.0),
            ..Default::default()
        };
        assert!(load_config(&args).await.is_err());
    }

    #[tokio::test]
    async fn test_load_scene_document() {
        let mut temp_file = NamedTempFile::new().unwrap();
        let document = r#"{
            "scenes": [{ "name": "Main", "objects": [] }],
            "namedAreas": { "spawn": { "shape": "sphere", "center": { "x": 0.0, "y": 0.0, "z": 0.0 }, "radius": 3.0 } }
        }"#;
        temp_file.write_all(document.as_bytes()).unwrap();

        let document = load_scene_document(temp_file.path()).await.unwrap();
        assert_eq!(document.scenes.len(), 1);
        assert!(document.named_areas.contains_key("spawn"));

        assert!(load_scene_document(Path::new("does/not/exist.json")).await.is_err());
    }
}
