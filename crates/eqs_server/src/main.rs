//! `eqs-server` entry point

use clap::Parser;
use eqs_server::{load_config, logging::setup_logging, Application, Args};
use tracing::error;

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Configuration is loaded before logging so its level applies
    let config = match load_config(&args).await {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ Failed to load configuration: {:#}", e);
            std::process::exit(1);
        }
    };
    setup_logging(config.logging.as_ref())?;

    let app = Application::new(config).await?;
    if let Err(e) = app.run().await {
        error!("❌ Application error: {:#}", e);
        std::process::exit(1);
    }
    Ok(())
}
