//! # EQS Server
//!
//! Host process for [`eqs_core`]. It seeds an [`eqs_core::InMemoryHost`]
//! from a JSON scene document, optionally builds the environment, then
//! answers one JSON tool request per stdin line with one JSON response per
//! stdout line. Expired debug visualizations are swept on a timer.
//!
//! ## Key Types
//!
//! - [`config::Config`]: TOML process configuration, created with defaults on first run
//! - [`dispatch::ToolRequest`] / [`dispatch::ToolResponse`]: the wire envelope
//! - [`app::Application`]: wiring and the request loop

pub mod app;
pub mod config;
pub mod dispatch;
pub mod logging;
pub mod signals;

pub use app::{spawn_line_reader, Application};
pub use config::{load_config, Args, Config};
pub use dispatch::{dispatch, handle_line, ToolRequest, ToolResponse};
