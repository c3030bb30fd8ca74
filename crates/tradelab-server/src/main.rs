//! Tradelab exchange server.
//!
//! Wires the dispatcher to `Dragonfly`, seeds the experiment and then
//! drives events from standard input, writing one JSON reply per event to
//! standard output. Logs go to standard error.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `tradelab-config.yaml`
//! 2. Initialize structured logging (tracing)
//! 3. Connect to `Dragonfly`
//! 4. Seed markets, traders and sessions from the `setup` section
//! 5. Start the checkpoint writer
//! 6. Serve events until standard input closes
//! 7. Drain the checkpoint writer and log totals

mod driver;
mod error;

use std::path::Path;
use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;
use tradelab_dispatch::{
    ChannelCheckpointSink, CheckpointSink, DispatchSettings, Dispatcher, ExchangeConfig,
    NullCheckpointSink, spawn_checkpoint_writer,
};
use tradelab_store::DragonflyStore;

use crate::error::ServerError;

const CONFIG_PATH: &str = "tradelab-config.yaml";

/// Application entry point.
///
/// # Errors
///
/// Returns an error if configuration, logging, the store connection, seeding
/// or the I/O loop fails.
#[tokio::main]
async fn main() -> Result<(), ServerError> {
    // 1. Load configuration. Logging is not up yet, so remember whether
    //    defaults were used and report it below.
    let (config, from_file) = load_config()?;

    // 2. Initialize structured logging.
    init_tracing(&config)?;
    info!(from_file, "tradelab-server starting");
    info!(
        session_format = %config.session.session_format,
        exchange_format = %config.session.exchange_format,
        max_attempts = config.retry.max_attempts,
        checkpoints = config.checkpoints.enabled,
        "Configuration loaded"
    );

    // 3. Connect to Dragonfly.
    let store = DragonflyStore::connect(&config.store.dragonfly_url).await?;

    // 4. Seed the experiment.
    let settings = DispatchSettings::from(&config);
    let seeded = tradelab_dispatch::seed(&store, &config.setup, &settings).await?;
    info!(
        markets = seeded.markets,
        traders = seeded.traders,
        sessions = seeded.sessions,
        existing = seeded.existing,
        "Experiment seeded"
    );

    // 5. Start the checkpoint writer.
    let mut writer = None;
    let checkpoints: Arc<dyn CheckpointSink> = if config.checkpoints.enabled {
        let (sink, rx) = ChannelCheckpointSink::new();
        writer = Some(spawn_checkpoint_writer(rx, config.checkpoints.path.clone()));
        info!(path = %config.checkpoints.path.display(), "Checkpoint writer started");
        Arc::new(sink)
    } else {
        info!("Checkpoints disabled");
        Arc::new(NullCheckpointSink)
    };

    // 6. Serve events.
    let dispatcher = Arc::new(Dispatcher::new(Arc::new(store), checkpoints, settings));
    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let summary = driver::serve(dispatcher, stdin, tokio::io::stdout()).await?;

    // 7. The dispatcher held the last checkpoint sender; the writer now
    //    drains and exits.
    let written = match writer {
        Some(handle) => match handle.await {
            Ok(written) => written,
            Err(e) => {
                tracing::warn!(error = %e, "checkpoint writer task failed");
                0
            }
        },
        None => 0,
    };

    info!(
        applied = summary.applied,
        failed = summary.failed,
        checkpoints = written,
        "tradelab-server shutdown complete"
    );
    Ok(())
}

/// Load configuration from `tradelab-config.yaml` in the working directory,
/// falling back to defaults (plus environment overrides) if it is absent.
fn load_config() -> Result<(ExchangeConfig, bool), ServerError> {
    let config_path = Path::new(CONFIG_PATH);
    if config_path.exists() {
        Ok((ExchangeConfig::from_file(config_path)?, true))
    } else {
        let mut config = ExchangeConfig::default();
        config.apply_env_overrides();
        Ok((config, false))
    }
}

/// Install the global subscriber. `RUST_LOG` takes precedence over
/// `logging.level`.
fn init_tracing(config: &ExchangeConfig) -> Result<(), ServerError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);
    let installed = if config.logging.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| ServerError::Logging {
        message: e.to_string(),
    })
}
