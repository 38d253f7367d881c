//! Command-line argument parsing
//!
//! Every flag overrides the matching value from the configuration file.

use clap::Parser;
use std::path::PathBuf;

/// Command-line arguments for the EQS host process
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Configuration file path
    ///
    /// If the file doesn't exist, a default configuration will be created.
    #[arg(short, long, default_value = "eqs.toml")]
    pub config: PathBuf,

    /// Scene document (JSON) to load into the in-memory host
    #[arg(short, long)]
    pub scene: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    pub debug: bool,

    /// Output logs in JSON format
    #[arg(long)]
    pub json_logs: bool,

    /// Override the grid cell size in world units
    #[arg(long)]
    pub cell_size: Option<f64>,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            config: PathBuf::from("eqs.toml"),
            scene: None,
            debug: false,
            json_logs: false,
            cell_size: None,
        }
    }
}
