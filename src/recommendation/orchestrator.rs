use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use log::{error, info};
use tokio_util::task::TaskTracker;

use crate::db::{Database, PredictionSnapshot, RecommendationRecord, UpsertOutcome};
use crate::inference::Estimate;

use super::client::RecommendationClient;
use super::heuristic::immediate_recommendation;
use super::worker::{enrich, EnrichmentContext, EnrichmentJob};

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Pause before the outbound call so the pending write is visible.
    pub grace_delay: Duration,
    pub request_timeout: Duration,
    pub context_window: chrono::Duration,
    /// Records initiated longer ago than this are treated as expired.
    pub record_ttl: chrono::Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            grace_delay: Duration::from_millis(500),
            request_timeout: Duration::from_secs(10),
            context_window: chrono::Duration::hours(12),
            record_ttl: chrono::Duration::hours(24),
        }
    }
}

/// Result of a status lookup.
#[derive(Debug, Clone)]
pub enum RecommendationLookup {
    Found(RecommendationRecord),
    NotFound,
}

impl RecommendationLookup {
    pub fn record(&self) -> Option<&RecommendationRecord> {
        match self {
            RecommendationLookup::Found(record) => Some(record),
            RecommendationLookup::NotFound => None,
        }
    }

    pub fn into_record(self) -> Option<RecommendationRecord> {
        match self {
            RecommendationLookup::Found(record) => Some(record),
            RecommendationLookup::NotFound => None,
        }
    }
}

/// Owns the prediction-to-recommendation lifecycle. The only writer of
/// recommendation records.
pub struct RecommendationOrchestrator {
    db: Database,
    context: Arc<EnrichmentContext>,
    tracker: TaskTracker,
    record_ttl: chrono::Duration,
}

impl RecommendationOrchestrator {
    pub fn new(
        db: Database,
        client: Arc<dyn RecommendationClient>,
        config: OrchestratorConfig,
    ) -> Self {
        let context = Arc::new(EnrichmentContext {
            db: db.clone(),
            client,
            grace_delay: config.grace_delay,
            request_timeout: config.request_timeout,
            context_window: config.context_window,
        });

        Self {
            db,
            context,
            tracker: TaskTracker::new(),
            record_ttl: config.record_ttl,
        }
    }

    /// Record `prediction_id` as pending, schedule enrichment, and return the
    /// immediate heuristic text. Store failures are logged, not returned.
    pub async fn initiate(&self, prediction_id: &str, estimate: &Estimate) -> String {
        let snapshot = PredictionSnapshot {
            current_glucose: estimate.current_glucose,
            hypo_probability: estimate.hypo_probability,
            hyper_probability: estimate.hyper_probability,
            time_to_hypo: estimate.reported_time_to_hypo(),
            time_to_hyper: estimate.reported_time_to_hyper(),
        };

        let record = RecommendationRecord::pending(prediction_id, snapshot.clone(), Utc::now());
        match self.db.upsert_pending_recommendation(&record).await {
            Ok(UpsertOutcome::Created) => {
                info!("Created recommendation record for prediction {prediction_id}")
            }
            Ok(UpsertOutcome::Refreshed) => {
                info!("Refreshed recommendation record for prediction {prediction_id}")
            }
            Err(err) => error!(
                "Failed to create recommendation record for prediction {prediction_id}: {err:?}"
            ),
        }

        self.spawn_enrichment(EnrichmentJob {
            prediction_id: prediction_id.to_string(),
            estimate: estimate.clone(),
            snapshot,
        });

        immediate_recommendation(estimate)
    }

    fn spawn_enrichment(&self, job: EnrichmentJob) {
        let prediction_id = job.prediction_id.clone();
        let task = tokio::spawn(enrich(Arc::clone(&self.context), job));

        self.tracker.spawn(async move {
            if let Err(err) = task.await {
                error!("Enrichment task for prediction {prediction_id} aborted: {err}");
            }
        });
    }

    /// Current record for `prediction_id`, or not-found when it is absent,
    /// expired, or the store cannot be read.
    pub async fn status(&self, prediction_id: &str) -> RecommendationLookup {
        let not_before = Utc::now() - self.record_ttl;
        match self.db.get_recommendation(prediction_id, not_before).await {
            Ok(Some(record)) => RecommendationLookup::Found(record),
            Ok(None) => RecommendationLookup::NotFound,
            Err(err) => {
                error!("Failed to read recommendation for prediction {prediction_id}: {err:?}");
                RecommendationLookup::NotFound
            }
        }
    }

    /// Delete records initiated more than `older_than` ago.
    pub async fn purge(&self, older_than: chrono::Duration) -> Result<usize> {
        let cutoff = Utc::now() - older_than;
        let removed = self.db.purge_recommendations_before(cutoff).await?;
        info!("Purged {removed} recommendation records initiated before {cutoff}");
        Ok(removed)
    }

    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Wait for every enrichment task spawned so far, then accept new ones again.
    pub async fn wait_idle(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }

    /// Stop accepting work and wait for in-flight enrichment to finish.
    pub async fn shutdown(&self) {
        self.tracker.close();
        if !self.tracker.is_empty() {
            info!(
                "Waiting for {} in-flight enrichment task(s)",
                self.tracker.len()
            );
        }
        self.tracker.wait().await;
    }
}
