pub mod commands;
pub mod db;
pub mod error;
pub mod inference;
pub mod preprocessing;
pub mod recommendation;
pub mod service;
pub mod settings;
mod utils;

use std::path::PathBuf;

use anyhow::{Context, Result};
use log::{info, warn};

pub use error::{ApiError, ClientError, ModelError, PredictionError};
pub use service::{GlycemicService, PredictionResult};
pub use settings::ServiceSettings;

const DEBUG_ENV: &str = "GLUCOCAST_DEBUG";
const SETTINGS_ENV: &str = "GLUCOCAST_SETTINGS";
const DEFAULT_SETTINGS_FILE: &str = "glucocast.json";

fn debug_enabled() -> bool {
    std::env::var(DEBUG_ENV)
        .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// Initialise `env_logger` once. `RUST_LOG` still applies on top of the
/// default level.
pub fn init_logging() {
    let level = if debug_enabled() {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    let _ = env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .try_init();
}

pub fn run() -> Result<()> {
    init_logging();

    info!("glucocast starting up...");

    let settings_path = std::env::var(SETTINGS_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_SETTINGS_FILE));
    let settings = ServiceSettings::load(&settings_path)?.with_env_overrides();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;

    runtime.block_on(async move {
        let service = GlycemicService::start(settings).await?;

        match service.purge_old_recommendations().await {
            Ok(removed) => info!("Startup retention purge removed {removed} records"),
            Err(err) => warn!("Startup retention purge failed: {err:?}"),
        }

        info!(
            "glucocast ready (inference: {})",
            commands::health(&service).inference
        );

        tokio::signal::ctrl_c()
            .await
            .context("failed to listen for shutdown signal")?;
        info!("Shutdown requested");

        service.shutdown().await
    })
}
