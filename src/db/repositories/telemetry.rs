use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};

use crate::db::{
    connection::Database,
    helpers::{format_datetime, parse_datetime, parse_insulin_type},
    models::{
        ActivityEntry, GlucosePoint, GlucoseReading, GlucoseTrend, InsulinDose, InsulinSummary,
        InsulinType, MealEntry, MealType, RecentContext, RecentTimeline, TelemetryQuery,
        TimelineEvent, VitalsEntry,
    },
};

const TIMELINE_GLUCOSE_LIMIT: u32 = 20;
const TIMELINE_INSULIN_LIMIT: u32 = 10;
const TIMELINE_MEAL_LIMIT: u32 = 10;
const TIMELINE_ACTIVITY_LIMIT: u32 = 5;

// Every collection shares the same point-in-time filter.
const RECENT_FILTER: &str = "WHERE timestamp >= ?1 AND (?2 IS NULL OR user_id = ?2)
                             ORDER BY timestamp DESC
                             LIMIT ?3";

fn query_rows<T>(
    conn: &Connection,
    columns: &str,
    table: &str,
    query: &TelemetryQuery,
    map: impl Fn(&Row) -> Result<T>,
) -> Result<Vec<T>> {
    let sql = format!("SELECT {columns} FROM {table} {RECENT_FILTER}");
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query(params![
        format_datetime(&query.since),
        query.user_id,
        i64::from(query.limit),
    ])?;

    let mut items = Vec::new();
    while let Some(row) = rows.next()? {
        items.push(map(row).with_context(|| format!("failed to read row from {table}"))?);
    }
    Ok(items)
}

fn row_timestamp(row: &Row) -> Result<DateTime<Utc>> {
    let raw: String = row.get("timestamp")?;
    parse_datetime(&raw, "timestamp")
}

fn select_glucose(conn: &Connection, query: &TelemetryQuery) -> Result<Vec<GlucoseReading>> {
    query_rows(
        conn,
        "id, user_id, value, timestamp, meal_context, notes",
        "glucose_readings",
        query,
        |row| {
            Ok(GlucoseReading {
                id: row.get("id")?,
                user_id: row.get("user_id")?,
                value: row.get("value")?,
                timestamp: row_timestamp(row)?,
                meal_context: row.get("meal_context")?,
                notes: row.get("notes")?,
            })
        },
    )
}

fn select_insulin(conn: &Connection, query: &TelemetryQuery) -> Result<Vec<InsulinDose>> {
    query_rows(
        conn,
        "id, user_id, insulin_type, dose, timestamp, notes",
        "insulin_doses",
        query,
        |row| {
            let insulin_type: String = row.get("insulin_type")?;
            Ok(InsulinDose {
                id: row.get("id")?,
                user_id: row.get("user_id")?,
                insulin_type: parse_insulin_type(&insulin_type)?,
                dose: row.get("dose")?,
                timestamp: row_timestamp(row)?,
                notes: row.get("notes")?,
            })
        },
    )
}

fn select_meals(conn: &Connection, query: &TelemetryQuery) -> Result<Vec<MealEntry>> {
    query_rows(
        conn,
        "id, user_id, carbs, meal_type, description, timestamp",
        "meal_entries",
        query,
        |row| {
            let meal_type: Option<String> = row.get("meal_type")?;
            Ok(MealEntry {
                id: row.get("id")?,
                user_id: row.get("user_id")?,
                carbs: row.get("carbs")?,
                meal_type: meal_type.as_deref().and_then(MealType::parse),
                description: row.get("description")?,
                timestamp: row_timestamp(row)?,
            })
        },
    )
}

fn select_activity(conn: &Connection, query: &TelemetryQuery) -> Result<Vec<ActivityEntry>> {
    query_rows(
        conn,
        "id, user_id, activity_type, duration_minutes, intensity, timestamp, notes",
        "activity_entries",
        query,
        |row| {
            Ok(ActivityEntry {
                id: row.get("id")?,
                user_id: row.get("user_id")?,
                activity_type: row.get("activity_type")?,
                duration_minutes: row.get("duration_minutes")?,
                intensity: row.get("intensity")?,
                timestamp: row_timestamp(row)?,
                notes: row.get("notes")?,
            })
        },
    )
}

fn select_vitals(conn: &Connection, query: &TelemetryQuery) -> Result<Vec<VitalsEntry>> {
    query_rows(
        conn,
        "id, user_id, heart_rate, gsr, stress_level, timestamp, notes",
        "vitals_entries",
        query,
        |row| {
            Ok(VitalsEntry {
                id: row.get("id")?,
                user_id: row.get("user_id")?,
                heart_rate: row.get("heart_rate")?,
                gsr: row.get("gsr")?,
                stress_level: row.get("stress_level")?,
                timestamp: row_timestamp(row)?,
                notes: row.get("notes")?,
            })
        },
    )
}

impl Database {
    pub async fn insert_glucose_reading(&self, reading: &GlucoseReading) -> Result<i64> {
        let record = reading.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO glucose_readings (user_id, value, timestamp, meal_context, notes)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    record.user_id,
                    record.value,
                    format_datetime(&record.timestamp),
                    record.meal_context,
                    record.notes,
                ],
            )
            .with_context(|| "failed to insert glucose reading")?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    pub async fn insert_insulin_dose(&self, dose: &InsulinDose) -> Result<i64> {
        let record = dose.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO insulin_doses (user_id, insulin_type, dose, timestamp, notes)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    record.user_id,
                    record.insulin_type.as_str(),
                    record.dose,
                    format_datetime(&record.timestamp),
                    record.notes,
                ],
            )
            .with_context(|| "failed to insert insulin dose")?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    pub async fn insert_meal_entry(&self, meal: &MealEntry) -> Result<i64> {
        let record = meal.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO meal_entries (user_id, carbs, meal_type, description, timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    record.user_id,
                    record.carbs,
                    record.meal_type.map(|meal_type| meal_type.as_str()),
                    record.description,
                    format_datetime(&record.timestamp),
                ],
            )
            .with_context(|| "failed to insert meal entry")?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    pub async fn insert_activity_entry(&self, activity: &ActivityEntry) -> Result<i64> {
        let record = activity.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO activity_entries
                     (user_id, activity_type, duration_minutes, intensity, timestamp, notes)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    record.user_id,
                    record.activity_type,
                    record.duration_minutes,
                    record.intensity,
                    format_datetime(&record.timestamp),
                    record.notes,
                ],
            )
            .with_context(|| "failed to insert activity entry")?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    pub async fn insert_vitals_entry(&self, vitals: &VitalsEntry) -> Result<i64> {
        let record = vitals.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO vitals_entries (user_id, heart_rate, gsr, stress_level, timestamp, notes)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    record.user_id,
                    record.heart_rate,
                    record.gsr,
                    record.stress_level,
                    format_datetime(&record.timestamp),
                    record.notes,
                ],
            )
            .with_context(|| "failed to insert vitals entry")?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    pub async fn recent_glucose_readings(&self, query: TelemetryQuery) -> Result<Vec<GlucoseReading>> {
        self.execute(move |conn| select_glucose(conn, &query)).await
    }

    pub async fn recent_insulin_doses(&self, query: TelemetryQuery) -> Result<Vec<InsulinDose>> {
        self.execute(move |conn| select_insulin(conn, &query)).await
    }

    pub async fn recent_meal_entries(&self, query: TelemetryQuery) -> Result<Vec<MealEntry>> {
        self.execute(move |conn| select_meals(conn, &query)).await
    }

    pub async fn recent_activity_entries(&self, query: TelemetryQuery) -> Result<Vec<ActivityEntry>> {
        self.execute(move |conn| select_activity(conn, &query)).await
    }

    pub async fn recent_vitals_entries(&self, query: TelemetryQuery) -> Result<Vec<VitalsEntry>> {
        self.execute(move |conn| select_vitals(conn, &query)).await
    }

    /// Summarise telemetry recorded since `since` for the recommendation request.
    pub async fn recent_context(
        &self,
        user_id: Option<String>,
        since: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<RecentContext> {
        self.execute(move |conn| {
            let window = |limit| TelemetryQuery::since(since, limit).for_user(user_id.clone());

            let glucose = select_glucose(conn, &window(5))?;
            let insulin = select_insulin(conn, &window(3))?;
            let meals = select_meals(conn, &window(3))?;
            let activity = select_activity(conn, &window(3))?;

            let values: Vec<f64> = glucose.iter().map(|reading| reading.value).collect();

            let sum_of = |kind: InsulinType| -> f64 {
                insulin
                    .iter()
                    .filter(|dose| dose.insulin_type == kind)
                    .map(|dose| dose.dose)
                    .sum()
            };
            let time_since_last_bolus = insulin
                .iter()
                .find(|dose| dose.insulin_type == InsulinType::Bolus)
                .map(|dose| (now - dose.timestamp).num_minutes().max(0))
                .unwrap_or(0);

            Ok(RecentContext {
                current_glucose: values.first().copied(),
                trend: GlucoseTrend::from_newest_first(&values),
                recent_insulin: InsulinSummary {
                    basal: sum_of(InsulinType::Basal),
                    bolus: sum_of(InsulinType::Bolus),
                    time_since_last_bolus,
                },
                recent_carbs: meals.iter().map(|meal| meal.carbs).sum(),
                recent_activity: activity
                    .iter()
                    .map(|entry| f64::from(entry.duration_minutes))
                    .sum(),
                latest_reading_time: glucose.first().map(|reading| reading.timestamp),
            })
        })
        .await
    }

    /// Newest entries of every collection except vitals, merged newest first.
    pub async fn recent_timeline(
        &self,
        user_id: Option<String>,
        since: DateTime<Utc>,
    ) -> Result<RecentTimeline> {
        self.execute(move |conn| {
            let window = |limit| TelemetryQuery::since(since, limit).for_user(user_id.clone());

            let glucose = select_glucose(conn, &window(TIMELINE_GLUCOSE_LIMIT))?;
            let insulin = select_insulin(conn, &window(TIMELINE_INSULIN_LIMIT))?;
            let meals = select_meals(conn, &window(TIMELINE_MEAL_LIMIT))?;
            let activity = select_activity(conn, &window(TIMELINE_ACTIVITY_LIMIT))?;

            let mut timeline: Vec<TimelineEvent> = glucose
                .iter()
                .map(TimelineEvent::from)
                .chain(insulin.iter().map(TimelineEvent::from))
                .chain(meals.iter().map(TimelineEvent::from))
                .chain(activity.iter().map(TimelineEvent::from))
                .collect();
            timeline.sort_by(|a, b| b.timestamp().cmp(&a.timestamp()));

            let glucose_data = glucose
                .iter()
                .rev()
                .map(|reading| GlucosePoint {
                    time: reading.timestamp.format("%H:%M").to_string(),
                    value: reading.value,
                })
                .collect();

            Ok(RecentTimeline {
                timeline,
                glucose_data,
            })
        })
        .await
    }
}
