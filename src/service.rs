use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use log::info;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::db::Database;
use crate::error::PredictionError;
use crate::inference::{InferenceEngine, PredictionInput, PredictionSource, RiskLevel};
use crate::recommendation::{
    HttpRecommendationClient, RecommendationClient, RecommendationLookup,
    RecommendationOrchestrator, RetentionSweeper,
};
use crate::settings::ServiceSettings;

/// Immutable result of one prediction call. `prediction_id` keys the
/// recommendation record that enrichment fills in later.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionResult {
    pub prediction_id: String,
    pub current_glucose: f64,
    pub hypo_probability: f64,
    pub hyper_probability: f64,
    pub hypo_risk: RiskLevel,
    pub hyper_risk: RiskLevel,
    pub time_to_hypo_minutes: Option<f64>,
    pub time_to_hyper_minutes: Option<f64>,
    pub recommendation: String,
    pub timestamp: DateTime<Utc>,
    pub source: PredictionSource,
}

/// Owns the store, the inference engine, the orchestrator and the retention
/// sweeper. Built once at startup and torn down with `shutdown`.
pub struct GlycemicService {
    db: Database,
    engine: InferenceEngine,
    orchestrator: RecommendationOrchestrator,
    sweeper: Mutex<RetentionSweeper>,
    settings: ServiceSettings,
}

impl GlycemicService {
    pub async fn start(settings: ServiceSettings) -> Result<Self> {
        settings.validate()?;
        let db = Database::new(settings.database_path.clone())?;
        let engine = InferenceEngine::from_model_dir(settings.model_dir.as_deref());
        let client = HttpRecommendationClient::new(
            settings.recommender_url.clone(),
            settings.request_timeout(),
        )?;
        info!("Recommendation service at {}", client.url());

        let service = Self::from_parts(db, engine, Arc::new(client), settings);
        service.start_sweeper().await?;
        Ok(service)
    }

    /// Assemble a service from explicit parts without starting the sweeper.
    pub fn from_parts(
        db: Database,
        engine: InferenceEngine,
        client: Arc<dyn RecommendationClient>,
        settings: ServiceSettings,
    ) -> Self {
        let orchestrator =
            RecommendationOrchestrator::new(db.clone(), client, settings.orchestrator_config());

        Self {
            db,
            engine,
            orchestrator,
            sweeper: Mutex::new(RetentionSweeper::new()),
            settings,
        }
    }

    pub async fn start_sweeper(&self) -> Result<()> {
        let mut sweeper = self.sweeper.lock().await;
        sweeper.start(
            self.db.clone(),
            self.settings.sweep_interval(),
            self.settings.record_ttl(),
        )
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn orchestrator(&self) -> &RecommendationOrchestrator {
        &self.orchestrator
    }

    pub fn settings(&self) -> &ServiceSettings {
        &self.settings
    }

    pub fn uses_model(&self) -> bool {
        self.engine.uses_model()
    }

    /// Predict from at least one full window of glucose readings.
    pub async fn predict(&self, input: &PredictionInput) -> Result<PredictionResult, PredictionError> {
        let estimate = self.engine.estimate(input)?;

        let prediction_id = Uuid::new_v4().to_string();
        let recommendation = self.orchestrator.initiate(&prediction_id, &estimate).await;

        Ok(PredictionResult {
            prediction_id,
            current_glucose: estimate.current_glucose,
            hypo_probability: estimate.hypo_probability,
            hyper_probability: estimate.hyper_probability,
            hypo_risk: estimate.hypo_risk(),
            hyper_risk: estimate.hyper_risk(),
            time_to_hypo_minutes: estimate.reported_time_to_hypo(),
            time_to_hyper_minutes: estimate.reported_time_to_hyper(),
            recommendation,
            timestamp: Utc::now(),
            source: estimate.source,
        })
    }

    /// Predict from streams of any length by resampling each to one window first.
    pub async fn predict_interpolated(
        &self,
        input: &PredictionInput,
    ) -> Result<PredictionResult, PredictionError> {
        self.predict(&input.interpolated()).await
    }

    pub async fn recommendation_status(&self, prediction_id: &str) -> RecommendationLookup {
        self.orchestrator.status(prediction_id).await
    }

    /// Remove records older than the configured retention window.
    pub async fn purge_old_recommendations(&self) -> Result<usize> {
        self.orchestrator.purge(self.settings.retention()).await
    }

    /// Stop the sweeper, wait for in-flight enrichment, then close the store.
    pub async fn shutdown(self) -> Result<()> {
        self.sweeper
            .lock()
            .await
            .stop()
            .await
            .context("failed to stop retention sweeper")?;
        self.orchestrator.shutdown().await;

        let path = self.db.path().to_path_buf();
        drop(self.orchestrator);
        drop(self.db);
        info!("Service stopped; store at {} closed", path.display());
        Ok(())
    }
}
