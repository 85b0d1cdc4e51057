//! Recommendation record data model.
//!
//! One record per prediction id. The orchestrator is the only writer; status
//! lookups only read.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::telemetry::{GlucoseTrend, InsulinSummary};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationStatus {
    Pending,
    Processing,
    Completed,
    Error,
}

impl RecommendationStatus {
    pub const ALL: [RecommendationStatus; 4] = [
        RecommendationStatus::Pending,
        RecommendationStatus::Processing,
        RecommendationStatus::Completed,
        RecommendationStatus::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RecommendationStatus::Pending => "pending",
            RecommendationStatus::Processing => "processing",
            RecommendationStatus::Completed => "completed",
            RecommendationStatus::Error => "error",
        }
    }

    /// pending → processing → {completed | error}; pending may also fail directly.
    pub fn can_transition_to(&self, next: RecommendationStatus) -> bool {
        use RecommendationStatus::*;
        matches!(
            (self, next),
            (Pending, Processing) | (Pending, Error) | (Processing, Completed) | (Processing, Error)
        )
    }

    /// States a record must be in for a move to `next` to apply.
    pub fn predecessors(next: RecommendationStatus) -> Vec<RecommendationStatus> {
        Self::ALL
            .into_iter()
            .filter(|status| status.can_transition_to(next))
            .collect()
    }
}

/// Prediction values captured when the record is created. Time-to-event values
/// are only kept when the matching probability exceeds 0.3.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PredictionSnapshot {
    pub current_glucose: f64,
    pub hypo_probability: f64,
    pub hyper_probability: f64,
    pub time_to_hypo: Option<f64>,
    pub time_to_hyper: Option<f64>,
}

/// Payload sent to the recommendation-text service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecommendationRequest {
    pub current_glucose: f64,
    pub trend: GlucoseTrend,
    pub recent_insulin: InsulinSummary,
    pub recent_carbs: f64,
    pub recent_activity: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationRecord {
    pub prediction_id: String,
    pub status: RecommendationStatus,
    pub initiated_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub prediction_data: Option<PredictionSnapshot>,
    pub request_data: Option<RecommendationRequest>,
    pub recommendation: Option<String>,
    /// Raw body returned by the recommendation service.
    pub response_data: Option<serde_json::Value>,
    pub error: Option<String>,
}

impl RecommendationRecord {
    pub fn pending(
        prediction_id: impl Into<String>,
        snapshot: PredictionSnapshot,
        initiated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            prediction_id: prediction_id.into(),
            status: RecommendationStatus::Pending,
            initiated_at,
            updated_at: None,
            completed_at: None,
            prediction_data: Some(snapshot),
            request_data: None,
            recommendation: None,
            response_data: None,
            error: None,
        }
    }
}
