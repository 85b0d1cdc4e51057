//! Prediction-to-recommendation lifecycle: the immediate heuristic text, the
//! tracked record, and background enrichment from the recommendation service.

pub mod client;
pub mod heuristic;
pub mod orchestrator;
pub mod sweeper;
mod worker;

pub use client::{
    HttpRecommendationClient, RecommendationClient, RecommendationReply, RecommendationResponse,
    NO_RECOMMENDATION,
};
pub use heuristic::{immediate_recommendation, trend_label};
pub use orchestrator::{OrchestratorConfig, RecommendationLookup, RecommendationOrchestrator};
pub use sweeper::{sweep_expired, RetentionSweeper};
