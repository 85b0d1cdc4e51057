use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{de::DeserializeOwned, Serialize};

use crate::db::models::{InsulinType, RecommendationStatus};

/// Fixed-width RFC 3339 (microseconds, `Z`), so lexical order is chronological order.
pub fn format_datetime(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_datetime(value: &str, field: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("failed to parse {field}"))
}

pub fn parse_optional_datetime(
    value: Option<String>,
    field: &str,
) -> Result<Option<DateTime<Utc>>> {
    match value {
        Some(raw) => parse_datetime(&raw, field).map(Some),
        None => Ok(None),
    }
}

pub fn parse_status(value: &str) -> Result<RecommendationStatus> {
    match value {
        "pending" => Ok(RecommendationStatus::Pending),
        "processing" => Ok(RecommendationStatus::Processing),
        "completed" => Ok(RecommendationStatus::Completed),
        "error" => Ok(RecommendationStatus::Error),
        other => Err(anyhow!("unknown recommendation status {other}")),
    }
}

pub fn parse_insulin_type(value: &str) -> Result<InsulinType> {
    match value {
        "basal" => Ok(InsulinType::Basal),
        "bolus" => Ok(InsulinType::Bolus),
        other => Err(anyhow!("unknown insulin type {other}")),
    }
}

pub fn to_json_column<T: Serialize>(value: &Option<T>, field: &str) -> Result<Option<String>> {
    value
        .as_ref()
        .map(|inner| {
            serde_json::to_string(inner).with_context(|| format!("failed to serialize {field}"))
        })
        .transpose()
}

pub fn from_json_column<T: DeserializeOwned>(value: Option<String>, field: &str) -> Result<Option<T>> {
    value
        .map(|raw| {
            serde_json::from_str(&raw).with_context(|| format!("failed to deserialize {field}"))
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn formatted_datetimes_sort_chronologically() {
        let whole = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();
        let fractional = whole + chrono::Duration::milliseconds(250);

        let a = format_datetime(&whole);
        let b = format_datetime(&fractional);

        assert_eq!(a.len(), b.len());
        assert!(a < b);
        assert_eq!(parse_datetime(&b, "ts").unwrap(), fractional);
    }

    #[test]
    fn status_strings_round_trip_through_parser() {
        for status in [
            RecommendationStatus::Pending,
            RecommendationStatus::Processing,
            RecommendationStatus::Completed,
            RecommendationStatus::Error,
        ] {
            assert_eq!(parse_status(status.as_str()).unwrap(), status);
        }
        assert!(parse_status("not_found").is_err());
    }
}
