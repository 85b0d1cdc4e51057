use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::db::{Database, PredictionSnapshot, RecentContext, RecommendationRequest};
use crate::error::ClientError;
use crate::inference::Estimate;

use super::client::RecommendationClient;
use super::heuristic::trend_label;

// Set to false to silence enrichment logs
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

/// Shared by every enrichment task spawned by one orchestrator.
pub(crate) struct EnrichmentContext {
    pub db: Database,
    pub client: Arc<dyn RecommendationClient>,
    pub grace_delay: Duration,
    pub request_timeout: Duration,
    pub context_window: chrono::Duration,
}

pub(crate) struct EnrichmentJob {
    pub prediction_id: String,
    pub estimate: Estimate,
    pub snapshot: PredictionSnapshot,
}

/// Move one record from pending to a terminal state. Never returns an error;
/// every failure ends up in the log and, where possible, on the record.
pub(crate) async fn enrich(ctx: Arc<EnrichmentContext>, job: EnrichmentJob) {
    let EnrichmentJob {
        prediction_id,
        estimate,
        snapshot,
    } = job;
    let db = &ctx.db;

    log_debug!("enrichment started for prediction {}", prediction_id);

    let now = Utc::now();
    match db
        .recreate_recommendation_if_missing(&prediction_id, Some(snapshot), now)
        .await
    {
        Ok(true) => log_warn!("record for prediction {} was missing; recreated", prediction_id),
        Ok(false) => {}
        Err(err) => log_error!("failed to verify record for prediction {}: {err:?}", prediction_id),
    }

    let trend = trend_label(&estimate);
    let context = match db.recent_context(None, now - ctx.context_window, now).await {
        Ok(context) => context,
        Err(err) => {
            log_warn!(
                "recent telemetry unavailable for prediction {} ({err:?}); using prediction data only",
                prediction_id
            );
            RecentContext::default()
        }
    };

    let request = RecommendationRequest {
        current_glucose: estimate.current_glucose,
        trend,
        recent_insulin: context.recent_insulin,
        recent_carbs: context.recent_carbs,
        recent_activity: context.recent_activity,
    };

    match db
        .mark_recommendation_processing(&prediction_id, &request, Utc::now())
        .await
    {
        Ok(true) => {}
        Ok(false) => {
            log_info!(
                "prediction {} is no longer pending; skipping enrichment",
                prediction_id
            );
            return;
        }
        Err(err) => log_error!(
            "failed to mark prediction {} as processing: {err:?}",
            prediction_id
        ),
    }

    tokio::time::sleep(ctx.grace_delay).await;

    let outcome = match tokio::time::timeout(ctx.request_timeout, ctx.client.recommend(&request)).await
    {
        Ok(result) => result,
        Err(_) => Err(ClientError::Timeout(ctx.request_timeout)),
    };

    let stored = match outcome {
        Ok(reply) => {
            log_info!("recommendation received for prediction {}", prediction_id);
            db.mark_recommendation_completed(
                &prediction_id,
                &reply.recommendation,
                &reply.raw,
                Utc::now(),
            )
            .await
        }
        Err(err) => {
            log_error!("recommendation request failed for prediction {}: {err}", prediction_id);
            db.mark_recommendation_failed(&prediction_id, &err.record_message(), Utc::now())
                .await
        }
    };

    match stored {
        Ok(true) => log_debug!("enrichment finished for prediction {}", prediction_id),
        Ok(false) => log_warn!(
            "record for prediction {} changed state before enrichment finished",
            prediction_id
        ),
        Err(err) => log_error!(
            "failed to store enrichment result for prediction {}: {err:?}",
            prediction_id
        ),
    }
}
