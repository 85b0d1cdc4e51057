use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

use crate::db::{
    connection::Database,
    helpers::{
        format_datetime, from_json_column, parse_datetime, parse_optional_datetime, parse_status,
        to_json_column,
    },
    models::{
        PredictionSnapshot, RecommendationRecord, RecommendationRequest, RecommendationStatus,
    },
};

const RECREATED_NOTE: &str = "record recreated by enrichment task";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Refreshed,
}

/// `status IN (...)` condition admitting only the legal predecessors of `next`.
fn transition_guard(next: RecommendationStatus) -> String {
    let allowed: Vec<String> = RecommendationStatus::predecessors(next)
        .into_iter()
        .map(|status| format!("'{}'", status.as_str()))
        .collect();
    format!("status IN ({})", allowed.join(", "))
}

fn row_to_record(row: &Row) -> Result<RecommendationRecord> {
    let status: String = row.get("status")?;
    let initiated_at: String = row.get("initiated_at")?;
    let updated_at: Option<String> = row.get("updated_at")?;
    let completed_at: Option<String> = row.get("completed_at")?;

    Ok(RecommendationRecord {
        prediction_id: row.get("prediction_id")?,
        status: parse_status(&status)?,
        initiated_at: parse_datetime(&initiated_at, "initiated_at")?,
        updated_at: parse_optional_datetime(updated_at, "updated_at")?,
        completed_at: parse_optional_datetime(completed_at, "completed_at")?,
        prediction_data: from_json_column(row.get("prediction_data")?, "prediction_data")?,
        request_data: from_json_column(row.get("request_data")?, "request_data")?,
        recommendation: row.get("recommendation")?,
        response_data: from_json_column(row.get("response_data")?, "response_data")?,
        error: row.get("error")?,
    })
}

impl Database {
    /// Create the record as `pending`, or refresh the snapshot of an existing one.
    /// An existing record keeps its status so a finished record never regresses.
    pub async fn upsert_pending_recommendation(
        &self,
        record: &RecommendationRecord,
    ) -> Result<UpsertOutcome> {
        let record = record.clone();
        self.execute(move |conn| {
            let existed: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM recommendations WHERE prediction_id = ?1)",
                params![record.prediction_id],
                |row| row.get(0),
            )?;

            conn.execute(
                "INSERT INTO recommendations (prediction_id, status, initiated_at, prediction_data)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(prediction_id) DO UPDATE SET
                     initiated_at = excluded.initiated_at,
                     prediction_data = excluded.prediction_data,
                     updated_at = excluded.initiated_at",
                params![
                    record.prediction_id,
                    RecommendationStatus::Pending.as_str(),
                    format_datetime(&record.initiated_at),
                    to_json_column(&record.prediction_data, "prediction_data")?,
                ],
            )?;

            Ok(if existed {
                UpsertOutcome::Refreshed
            } else {
                UpsertOutcome::Created
            })
        })
        .await
    }

    /// Insert a `pending` record if none exists. Returns whether it had to be recreated.
    pub async fn recreate_recommendation_if_missing(
        &self,
        prediction_id: &str,
        snapshot: Option<PredictionSnapshot>,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let prediction_id = prediction_id.to_string();
        self.execute(move |conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO recommendations
                     (prediction_id, status, initiated_at, prediction_data, error)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    prediction_id,
                    RecommendationStatus::Pending.as_str(),
                    format_datetime(&now),
                    to_json_column(&snapshot, "prediction_data")?,
                    RECREATED_NOTE,
                ],
            )?;
            Ok(inserted == 1)
        })
        .await
    }

    /// pending → processing. Returns false if the record is missing or already past pending.
    pub async fn mark_recommendation_processing(
        &self,
        prediction_id: &str,
        request: &RecommendationRequest,
        updated_at: DateTime<Utc>,
    ) -> Result<bool> {
        let prediction_id = prediction_id.to_string();
        let request = Some(request.clone());
        self.execute(move |conn| {
            let sql = format!(
                "UPDATE recommendations
                 SET status = ?1,
                     request_data = ?2,
                     updated_at = ?3
                 WHERE prediction_id = ?4 AND {}",
                transition_guard(RecommendationStatus::Processing)
            );
            let changed = conn.execute(
                &sql,
                params![
                    RecommendationStatus::Processing.as_str(),
                    to_json_column(&request, "request_data")?,
                    format_datetime(&updated_at),
                    prediction_id,
                ],
            )?;
            Ok(changed == 1)
        })
        .await
    }

    /// processing → completed.
    pub async fn mark_recommendation_completed(
        &self,
        prediction_id: &str,
        recommendation: &str,
        response: &serde_json::Value,
        completed_at: DateTime<Utc>,
    ) -> Result<bool> {
        let prediction_id = prediction_id.to_string();
        let recommendation = recommendation.to_string();
        let response = Some(response.clone());
        self.execute(move |conn| {
            let sql = format!(
                "UPDATE recommendations
                 SET status = ?1,
                     recommendation = ?2,
                     response_data = ?3,
                     completed_at = ?4,
                     updated_at = ?4
                 WHERE prediction_id = ?5 AND {}",
                transition_guard(RecommendationStatus::Completed)
            );
            let changed = conn.execute(
                &sql,
                params![
                    RecommendationStatus::Completed.as_str(),
                    recommendation,
                    to_json_column(&response, "response_data")?,
                    format_datetime(&completed_at),
                    prediction_id,
                ],
            )?;
            Ok(changed == 1)
        })
        .await
    }

    pub async fn mark_recommendation_failed(
        &self,
        prediction_id: &str,
        error: &str,
        updated_at: DateTime<Utc>,
    ) -> Result<bool> {
        let prediction_id = prediction_id.to_string();
        let error = error.to_string();
        self.execute(move |conn| {
            let sql = format!(
                "UPDATE recommendations
                 SET status = ?1,
                     error = ?2,
                     updated_at = ?3
                 WHERE prediction_id = ?4 AND {}",
                transition_guard(RecommendationStatus::Error)
            );
            let changed = conn.execute(
                &sql,
                params![
                    RecommendationStatus::Error.as_str(),
                    error,
                    format_datetime(&updated_at),
                    prediction_id,
                ],
            )?;
            Ok(changed == 1)
        })
        .await
    }

    /// Records initiated before `not_before` are treated as expired and not returned.
    pub async fn get_recommendation(
        &self,
        prediction_id: &str,
        not_before: DateTime<Utc>,
    ) -> Result<Option<RecommendationRecord>> {
        let prediction_id = prediction_id.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT prediction_id, status, initiated_at, updated_at, completed_at,
                        prediction_data, request_data, recommendation, response_data, error
                 FROM recommendations
                 WHERE prediction_id = ?1 AND initiated_at >= ?2",
            )?;

            let record = stmt
                .query_row(params![prediction_id, format_datetime(&not_before)], |row| {
                    Ok(row_to_record(row))
                })
                .optional()?
                .transpose()?;

            Ok(record)
        })
        .await
    }

    pub async fn purge_recommendations_before(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        self.execute(move |conn| {
            let deleted = conn.execute(
                "DELETE FROM recommendations WHERE initiated_at < ?1",
                params![format_datetime(&cutoff)],
            )?;
            Ok(deleted)
        })
        .await
    }
}
