//! Exposed API surface. Each command validates its input at the boundary and
//! maps failures onto an `ApiError` carrying an HTTP-equivalent status.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::db::{
    ActivityEntry, GlucoseReading, InsulinDose, MealEntry, RecentTimeline, RecommendationRecord,
    TelemetryKind, TelemetryQuery, VitalsEntry,
};
use crate::error::ApiError;
use crate::inference::PredictionInput;
use crate::service::{GlycemicService, PredictionResult};

pub type PredictRequest = PredictionInput;

const DEFAULT_RECENT_HOURS: i64 = 24;
const DEFAULT_RECENT_LIMIT: u32 = 100;

fn internal(err: anyhow::Error) -> ApiError {
    ApiError::internal(format!("{err:#}"))
}

pub async fn predict(
    service: &GlycemicService,
    request: PredictRequest,
) -> Result<PredictionResult, ApiError> {
    service.predict(&request).await.map_err(ApiError::from)
}

pub async fn predict_interpolated(
    service: &GlycemicService,
    request: PredictRequest,
) -> Result<PredictionResult, ApiError> {
    service
        .predict_interpolated(&request)
        .await
        .map_err(ApiError::from)
}

pub async fn recommendation_status(
    service: &GlycemicService,
    prediction_id: String,
) -> Result<RecommendationRecord, ApiError> {
    if prediction_id.trim().is_empty() {
        return Err(ApiError::bad_request("prediction_id is required"));
    }

    service
        .recommendation_status(&prediction_id)
        .await
        .into_record()
        .ok_or_else(|| ApiError::not_found("not_found"))
}

/// One telemetry entry, tagged by collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TelemetryEntry {
    Glucose(GlucoseReading),
    Insulin(InsulinDose),
    Meal(MealEntry),
    Activity(ActivityEntry),
    Vitals(VitalsEntry),
}

impl TelemetryEntry {
    fn validate(&self) -> Result<(), ApiError> {
        let check = |ok: bool, message: &str| {
            if ok {
                Ok(())
            } else {
                Err(ApiError::bad_request(message))
            }
        };

        match self {
            TelemetryEntry::Glucose(reading) => check(
                reading.value.is_finite() && reading.value > 0.0,
                "glucose value must be a positive number",
            ),
            TelemetryEntry::Insulin(dose) => check(
                dose.dose.is_finite() && dose.dose >= 0.0,
                "insulin dose must be a non-negative number",
            ),
            TelemetryEntry::Meal(meal) => check(
                meal.carbs.is_finite() && meal.carbs >= 0.0,
                "carbs must be a non-negative number",
            ),
            TelemetryEntry::Activity(activity) => check(
                !activity.activity_type.trim().is_empty(),
                "activity_type is required",
            ),
            TelemetryEntry::Vitals(vitals) => check(
                vitals.gsr.map_or(true, f64::is_finite),
                "gsr must be a finite number",
            ),
        }
    }
}

/// Store one entry and return its row id.
pub async fn record_telemetry(
    service: &GlycemicService,
    entry: TelemetryEntry,
) -> Result<i64, ApiError> {
    entry.validate()?;

    let db = service.database();
    let inserted = match &entry {
        TelemetryEntry::Glucose(reading) => db.insert_glucose_reading(reading).await,
        TelemetryEntry::Insulin(dose) => db.insert_insulin_dose(dose).await,
        TelemetryEntry::Meal(meal) => db.insert_meal_entry(meal).await,
        TelemetryEntry::Activity(activity) => db.insert_activity_entry(activity).await,
        TelemetryEntry::Vitals(vitals) => db.insert_vitals_entry(vitals).await,
    };
    inserted.map_err(internal)
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecentTelemetryQuery {
    #[serde(default)]
    pub user_id: Option<String>,
    /// Look-back window in hours (default 24).
    #[serde(default)]
    pub hours: Option<i64>,
    /// Maximum entries (default 100).
    #[serde(default)]
    pub limit: Option<u32>,
}

impl RecentTelemetryQuery {
    fn resolve(&self) -> Result<TelemetryQuery, ApiError> {
        let since = lookback_start(self.hours)?;
        let limit = self.limit.unwrap_or(DEFAULT_RECENT_LIMIT);
        if limit == 0 {
            return Err(ApiError::bad_request("limit must be positive"));
        }

        Ok(TelemetryQuery::since(since, limit).for_user(self.user_id.clone()))
    }
}

/// Start of a look-back window of `hours` (default 24) ending now.
fn lookback_start(hours: Option<i64>) -> Result<DateTime<Utc>, ApiError> {
    let hours = hours.unwrap_or(DEFAULT_RECENT_HOURS);
    if hours <= 0 {
        return Err(ApiError::bad_request("hours must be positive"));
    }

    Duration::try_hours(hours)
        .and_then(|window| Utc::now().checked_sub_signed(window))
        .ok_or_else(|| ApiError::bad_request("hours out of range"))
}

/// Newest-first listing of one collection.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", content = "entries", rename_all = "snake_case")]
pub enum TelemetryListing {
    Glucose(Vec<GlucoseReading>),
    Insulin(Vec<InsulinDose>),
    Meal(Vec<MealEntry>),
    Activity(Vec<ActivityEntry>),
    Vitals(Vec<VitalsEntry>),
}

impl TelemetryListing {
    pub fn len(&self) -> usize {
        match self {
            TelemetryListing::Glucose(entries) => entries.len(),
            TelemetryListing::Insulin(entries) => entries.len(),
            TelemetryListing::Meal(entries) => entries.len(),
            TelemetryListing::Activity(entries) => entries.len(),
            TelemetryListing::Vitals(entries) => entries.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub async fn recent_telemetry(
    service: &GlycemicService,
    kind: TelemetryKind,
    query: RecentTelemetryQuery,
) -> Result<TelemetryListing, ApiError> {
    let query = query.resolve()?;
    let db = service.database();

    let listing = match kind {
        TelemetryKind::Glucose => db.recent_glucose_readings(query).await.map(TelemetryListing::Glucose),
        TelemetryKind::Insulin => db.recent_insulin_doses(query).await.map(TelemetryListing::Insulin),
        TelemetryKind::Meal => db.recent_meal_entries(query).await.map(TelemetryListing::Meal),
        TelemetryKind::Activity => {
            db.recent_activity_entries(query).await.map(TelemetryListing::Activity)
        }
        TelemetryKind::Vitals => db.recent_vitals_entries(query).await.map(TelemetryListing::Vitals),
    };
    listing.map_err(internal)
}

/// Recent glucose, insulin, meal and activity entries merged into one
/// newest-first timeline, plus the glucose series oldest first for charting.
pub async fn recent_timeline(
    service: &GlycemicService,
    user_id: Option<String>,
    hours: Option<i64>,
) -> Result<RecentTimeline, ApiError> {
    let since = lookback_start(hours)?;
    service
        .database()
        .recent_timeline(user_id, since)
        .await
        .map_err(internal)
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct HealthStatus {
    pub status: &'static str,
    pub version: &'static str,
    pub inference: &'static str,
}

pub fn health(service: &GlycemicService) -> HealthStatus {
    HealthStatus {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        inference: if service.uses_model() { "model" } else { "rules" },
    }
}
