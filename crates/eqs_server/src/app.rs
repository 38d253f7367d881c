//! Application wiring and the JSON-lines request loop

use crate::config::{load_scene_document, Config};
use crate::dispatch::handle_line;
use crate::signals::wait_for_shutdown;
use anyhow::{Context, Result};
use eqs_core::{current_timestamp, BuildOptions, EqsEngine, HostBindings, InMemoryHost};
use std::io::BufRead;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub struct Application {
    config: Config,
    host: Arc<InMemoryHost>,
    engine: Arc<EqsEngine>,
}

impl Application {
    /// Seeds the host and, when configured, builds the first environment.
    pub async fn new(config: Config) -> Result<Self> {
        let host = match config.scene.path.as_deref() {
            Some(path) => InMemoryHost::from_document(load_scene_document(Path::new(path)).await?),
            None => {
                let host = InMemoryHost::new();
                host.add_scene(&config.scene.default_scene);
                host
            }
        };
        let host = Arc::new(host);
        let engine = Arc::new(EqsEngine::new(config.engine.clone(), HostBindings::from_host(host.clone())));

        if config.server.build_on_start {
            let snapshot = engine
                .build_environment(&BuildOptions::default())
                .context("Initial environment build failed")?;
            let grid = snapshot.grid().info();
            info!(
                "🌍 Environment ready: {}x{}x{} cells, hash {}",
                grid.dimensions.nx,
                grid.dimensions.ny,
                grid.dimensions.nz,
                snapshot.hash()
            );
        }

        Ok(Self { config, host, engine })
    }

    pub fn engine(&self) -> &Arc<EqsEngine> {
        &self.engine
    }

    /// Serves stdin/stdout until EOF or a shutdown signal.
    pub async fn run(self) -> Result<()> {
        info!("🚀 EQS server v{} started", env!("CARGO_PKG_VERSION"));
        info!("  📦 Host objects: {}", self.host.object_count());
        info!("  📐 Cell size: {}", self.config.engine.grid.cell_size);

        let requests =
            spawn_line_reader(std::io::BufReader::new(std::io::stdin())).context("Failed to start stdin reader")?;
        let sweeper = self.spawn_sweeper();
        let stdout = tokio::io::stdout();

        let outcome = tokio::select! {
            served = self.serve(requests, stdout) => served.map(|count| {
                info!("📭 Input closed after {} request(s)", count);
            }),
            signal = wait_for_shutdown() => signal.map_err(anyhow::Error::from),
        };

        if let Some(handle) = sweeper {
            handle.abort();
        }
        let released = self.engine.deactivate_all_visualizations();
        if released > 0 {
            debug!("Released {} visualization(s) on shutdown", released);
        }
        info!("✅ EQS server shutdown complete");
        outcome
    }

    /// Handles one request per received line and writes one response per line.
    ///
    /// Blank lines are skipped. Ends when the channel closes and returns the
    /// number of requests handled.
    pub async fn serve<W>(&self, mut lines: mpsc::Receiver<String>, mut output: W) -> Result<usize>
    where
        W: AsyncWrite + Unpin,
    {
        let mut handled = 0;

        while let Some(line) = lines.recv().await {
            if line.trim().is_empty() {
                continue;
            }
            let engine = self.engine.clone();
            let response = tokio::task::spawn_blocking(move || handle_line(&engine, &line)).await?;
            if !response.success {
                if let Some(error) = &response.error {
                    warn!("Request failed: {:?}: {}", error.kind, error.message);
                }
            }

            let mut encoded = serde_json::to_vec(&response)?;
            encoded.push(b'\n');
            output.write_all(&encoded).await?;
            output.flush().await?;
            handled += 1;
        }

        Ok(handled)
    }

    fn spawn_sweeper(&self) -> Option<JoinHandle<()>> {
        let interval_ms = self.config.server.sweep_interval_ms;
        if interval_ms == 0 {
            return None;
        }
        let engine = self.engine.clone();
        Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_millis(interval_ms));
            loop {
                interval.tick().await;
                engine.sweep_visualizations(current_timestamp());
            }
        }))
    }
}

/// Forwards lines from a blocking reader onto a channel.
///
/// The reads happen on a plain OS thread, outside the runtime, so a read that
/// never returns cannot hold up runtime shutdown. The channel closes at EOF,
/// on a read error, or once the receiver is dropped.
pub fn spawn_line_reader<R>(reader: R) -> std::io::Result<mpsc::Receiver<String>>
where
    R: BufRead + Send + 'static,
{
    let (tx, rx) = mpsc::channel(64);
    std::thread::Builder::new()
        .name("eqs-input".into())
        .spawn(move || {
            for line in reader.lines() {
                match line {
                    Ok(line) => {
                        if tx.blocking_send(line).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!("Input read failed: {}", e);
                        break;
                    }
                }
            }
        })?;
    Ok(rx)
}
