//! Raw telemetry data models.
//!
//! One struct per collection. Readings are owned by the caller; the prediction
//! pipeline only ever reads them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InsulinType {
    Basal,
    Bolus,
}

impl InsulinType {
    pub fn as_str(&self) -> &'static str {
        match self {
            InsulinType::Basal => "basal",
            InsulinType::Bolus => "bolus",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum MealType {
    Breakfast,
    Lunch,
    Dinner,
    Snack,
}

impl MealType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MealType::Breakfast => "Breakfast",
            MealType::Lunch => "Lunch",
            MealType::Dinner => "Dinner",
            MealType::Snack => "Snack",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Breakfast" => Some(MealType::Breakfast),
            "Lunch" => Some(MealType::Lunch),
            "Dinner" => Some(MealType::Dinner),
            "Snack" => Some(MealType::Snack),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlucoseReading {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub user_id: Option<String>,
    /// mg/dL
    pub value: f64,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub meal_context: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsulinDose {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub user_id: Option<String>,
    pub insulin_type: InsulinType,
    /// Units
    pub dose: f64,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MealEntry {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub user_id: Option<String>,
    /// Grams of carbohydrate
    pub carbs: f64,
    #[serde(default)]
    pub meal_type: Option<MealType>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityEntry {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub user_id: Option<String>,
    pub activity_type: String,
    pub duration_minutes: u32,
    #[serde(default)]
    pub intensity: Option<String>,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VitalsEntry {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub heart_rate: Option<u32>,
    #[serde(default)]
    pub gsr: Option<f64>,
    #[serde(default)]
    pub stress_level: Option<String>,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TelemetryKind {
    Glucose,
    Insulin,
    Meal,
    Activity,
    Vitals,
}

/// Point-in-time filter shared by every collection: optional user, lower time
/// bound, newest first, capped at `limit` rows.
#[derive(Debug, Clone)]
pub struct TelemetryQuery {
    pub user_id: Option<String>,
    pub since: DateTime<Utc>,
    pub limit: u32,
}

impl TelemetryQuery {
    pub fn since(since: DateTime<Utc>, limit: u32) -> Self {
        Self {
            user_id: None,
            since,
            limit,
        }
    }

    pub fn for_user(mut self, user_id: Option<String>) -> Self {
        self.user_id = user_id;
        self
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum GlucoseTrend {
    Rising,
    Falling,
    #[default]
    Stable,
}

impl GlucoseTrend {
    /// Coarse label derived from prediction probabilities.
    pub fn from_probabilities(hypo_probability: f64, hyper_probability: f64) -> Self {
        if hypo_probability > 0.6 {
            GlucoseTrend::Falling
        } else if hyper_probability > 0.6 {
            GlucoseTrend::Rising
        } else {
            GlucoseTrend::Stable
        }
    }

    /// Label from readings ordered newest first; needs at least three.
    pub fn from_newest_first(values: &[f64]) -> Self {
        match values {
            [a, b, c, ..] if a > b && b > c => GlucoseTrend::Rising,
            [a, b, c, ..] if a < b && b < c => GlucoseTrend::Falling,
            _ => GlucoseTrend::Stable,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct InsulinSummary {
    pub basal: f64,
    pub bolus: f64,
    pub time_since_last_bolus: i64,
}

/// Aggregated recent telemetry handed to the recommendation generator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecentContext {
    pub current_glucose: Option<f64>,
    pub trend: GlucoseTrend,
    pub recent_insulin: InsulinSummary,
    pub recent_carbs: f64,
    pub recent_activity: f64,
    pub latest_reading_time: Option<DateTime<Utc>>,
}

/// One entry of the merged recent-activity timeline. `value` is the reading,
/// dose, carbs or duration depending on the kind.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TimelineEvent {
    Glucose {
        id: Option<i64>,
        value: f64,
        timestamp: DateTime<Utc>,
    },
    Insulin {
        id: Option<i64>,
        value: f64,
        insulin_type: InsulinType,
        timestamp: DateTime<Utc>,
    },
    Meal {
        id: Option<i64>,
        value: f64,
        meal_type: Option<MealType>,
        timestamp: DateTime<Utc>,
    },
    Activity {
        id: Option<i64>,
        value: f64,
        activity_type: String,
        timestamp: DateTime<Utc>,
    },
}

impl TimelineEvent {
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            TimelineEvent::Glucose { timestamp, .. }
            | TimelineEvent::Insulin { timestamp, .. }
            | TimelineEvent::Meal { timestamp, .. }
            | TimelineEvent::Activity { timestamp, .. } => *timestamp,
        }
    }
}

impl From<&GlucoseReading> for TimelineEvent {
    fn from(reading: &GlucoseReading) -> Self {
        TimelineEvent::Glucose {
            id: reading.id,
            value: reading.value,
            timestamp: reading.timestamp,
        }
    }
}

impl From<&InsulinDose> for TimelineEvent {
    fn from(dose: &InsulinDose) -> Self {
        TimelineEvent::Insulin {
            id: dose.id,
            value: dose.dose,
            insulin_type: dose.insulin_type,
            timestamp: dose.timestamp,
        }
    }
}

impl From<&MealEntry> for TimelineEvent {
    fn from(meal: &MealEntry) -> Self {
        TimelineEvent::Meal {
            id: meal.id,
            value: meal.carbs,
            meal_type: meal.meal_type,
            timestamp: meal.timestamp,
        }
    }
}

impl From<&ActivityEntry> for TimelineEvent {
    fn from(activity: &ActivityEntry) -> Self {
        TimelineEvent::Activity {
            id: activity.id,
            value: f64::from(activity.duration_minutes),
            activity_type: activity.activity_type.clone(),
            timestamp: activity.timestamp,
        }
    }
}

/// Chart point; `time` is `HH:MM` in UTC.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GlucosePoint {
    pub time: String,
    pub value: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RecentTimeline {
    /// Newest first across every collection.
    pub timeline: Vec<TimelineEvent>,
    /// Oldest first.
    pub glucose_data: Vec<GlucosePoint>,
}
