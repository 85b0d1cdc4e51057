use anyhow::{anyhow, bail, Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::recommendation::OrchestratorConfig;

pub const DB_PATH_ENV: &str = "GLUCOCAST_DB_PATH";
pub const MODEL_DIR_ENV: &str = "GLUCOCAST_MODEL_DIR";
pub const RECOMMENDER_URL_ENV: &str = "GLUCOCAST_RECOMMENDER_URL";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServiceSettings {
    pub database_path: PathBuf,
    /// Directory holding model artifacts. `None` selects rule-based inference.
    pub model_dir: Option<PathBuf>,
    pub recommender_url: String,
    pub request_timeout_secs: u64,
    pub enrichment_grace_ms: u64,
    pub recommendation_ttl_hours: i64,
    pub retention_days: i64,
    pub sweep_interval_secs: u64,
    pub context_window_hours: i64,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("glucocast.sqlite3"),
            model_dir: Some(PathBuf::from("models")),
            recommender_url: "http://localhost:5080/recommend".into(),
            request_timeout_secs: 10,
            enrichment_grace_ms: 500,
            recommendation_ttl_hours: 24,
            retention_days: 7,
            sweep_interval_secs: 600,
            context_window_hours: 12,
        }
    }
}

impl ServiceSettings {
    /// Read settings from `path`. A missing file yields defaults; a file that
    /// exists but does not parse is an error.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings from {}", path.display()))?;
        let settings: Self = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse settings in {}", path.display()))?;
        settings
            .validate()
            .with_context(|| format!("Invalid settings in {}", path.display()))?;
        Ok(settings)
    }

    /// Reject windows that are non-positive or would overflow a timestamp.
    pub fn validate(&self) -> Result<()> {
        let windows = [
            (
                "recommendation_ttl_hours",
                chrono::Duration::try_hours(self.recommendation_ttl_hours),
                self.recommendation_ttl_hours,
            ),
            (
                "retention_days",
                chrono::Duration::try_days(self.retention_days),
                self.retention_days,
            ),
            (
                "context_window_hours",
                chrono::Duration::try_hours(self.context_window_hours),
                self.context_window_hours,
            ),
        ];

        for (field, window, raw) in windows {
            if raw <= 0 {
                bail!("{field} must be positive, got {raw}");
            }
            window
                .and_then(|window| Utc::now().checked_sub_signed(window))
                .ok_or_else(|| anyhow!("{field} is out of range: {raw}"))?;
        }
        Ok(())
    }

    /// Apply `GLUCOCAST_*` environment overrides.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| env::var(key).ok())
    }

    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(path) = lookup(DB_PATH_ENV).filter(|v| !v.is_empty()) {
            self.database_path = PathBuf::from(path);
        }
        if let Some(dir) = lookup(MODEL_DIR_ENV) {
            self.model_dir = (!dir.is_empty()).then(|| PathBuf::from(dir));
        }
        if let Some(url) = lookup(RECOMMENDER_URL_ENV).filter(|v| !v.is_empty()) {
            self.recommender_url = url;
        }
        self
    }

    pub fn persist(&self, path: &Path) -> Result<()> {
        let serialized = serde_json::to_string_pretty(self)?;
        fs::write(path, serialized)
            .with_context(|| format!("Failed to write settings to {}", path.display()))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }

    pub fn record_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.recommendation_ttl_hours)
    }

    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::days(self.retention_days)
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            grace_delay: Duration::from_millis(self.enrichment_grace_ms),
            request_timeout: self.request_timeout(),
            context_window: chrono::Duration::hours(self.context_window_hours),
            record_ttl: self.record_ttl(),
        }
    }
}
