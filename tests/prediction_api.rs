mod common;

use chrono::{Duration, Utc};
use glucocast_lib::commands::{
    self, PredictRequest, RecentTelemetryQuery, TelemetryEntry, TelemetryListing,
};
use glucocast_lib::db::{
    ActivityEntry, GlucoseReading, InsulinDose, InsulinType, MealEntry, MealType, TelemetryKind,
    TimelineEvent,
};
use glucocast_lib::inference::{InsulinSeries, PredictionSource, RiskLevel};
use tempfile::tempdir;

use common::{count_recommendations, service_with, Behavior, FakeClient};

fn request(glucose: Vec<f64>) -> PredictRequest {
    PredictRequest {
        glucose_readings: glucose,
        ..Default::default()
    }
}

fn band(probability: f64) -> RiskLevel {
    if probability > 0.7 {
        RiskLevel::High
    } else if probability > 0.3 {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}

#[tokio::test]
async fn low_glucose_returns_urgent_low_advice() {
    let dir = tempdir().unwrap();
    let service = service_with(&dir, FakeClient::open(Behavior::Reply("eat carbs")));

    let result = commands::predict(&service, request(vec![55.0; 12])).await.unwrap();

    assert_eq!(result.current_glucose, 55.0);
    assert_eq!(result.hypo_risk, RiskLevel::High);
    assert_eq!(result.source, PredictionSource::Rules);
    assert!(result.recommendation.starts_with("URGENT: Current glucose level is low."));
    assert_eq!(result.time_to_hypo_minutes, Some(0.0));

    service.shutdown().await.unwrap();
}

#[tokio::test]
async fn high_glucose_returns_urgent_high_advice() {
    let dir = tempdir().unwrap();
    let service = service_with(&dir, FakeClient::open(Behavior::Reply("walk")));

    let result = commands::predict(&service, request(vec![190.0; 12])).await.unwrap();

    assert_eq!(result.hyper_risk, RiskLevel::High);
    assert!(result.recommendation.starts_with("Your glucose is currently high."));

    service.shutdown().await.unwrap();
}

#[tokio::test]
async fn rising_glucose_gets_moderate_hyper_advice() {
    let dir = tempdir().unwrap();
    let service = service_with(&dir, FakeClient::open(Behavior::Reply("walk")));

    // 128, 130, ..., 150: trend = +2 per step
    let glucose: Vec<f64> = (0..12).map(|i| 128.0 + 2.0 * i as f64).collect();
    let result = commands::predict(&service, request(glucose)).await.unwrap();

    assert!(result.hyper_probability > 0.3 && result.hyper_probability <= 0.7);
    assert_eq!(result.hyper_risk, RiskLevel::Medium);
    assert_eq!(
        result.recommendation,
        "Moderate risk of high blood sugar. Be mindful of carb intake and insulin timing."
    );
    assert_eq!(result.time_to_hyper_minutes, Some(90.0));
    assert_eq!(result.time_to_hypo_minutes, None);

    service.shutdown().await.unwrap();
}

#[tokio::test]
async fn short_series_is_rejected_without_store_writes() {
    let dir = tempdir().unwrap();
    let client = FakeClient::open(Behavior::Reply("unused"));
    let service = service_with(&dir, client.clone());

    let err = commands::predict(&service, request(vec![120.0; 11])).await.unwrap_err();

    assert_eq!(err.status, 400);
    assert!(err.error.contains("12"));
    assert_eq!(count_recommendations(service.database()).await, 0);
    assert_eq!(service.orchestrator().in_flight(), 0);
    assert_eq!(client.calls(), 0);

    service.shutdown().await.unwrap();
}

#[tokio::test]
async fn invalid_readings_are_a_bad_request() {
    let dir = tempdir().unwrap();
    let service = service_with(&dir, FakeClient::open(Behavior::Reply("unused")));

    let mut glucose = vec![120.0; 12];
    glucose[3] = -5.0;
    let err = commands::predict(&service, request(glucose)).await.unwrap_err();
    assert_eq!(err.status, 400);

    service.shutdown().await.unwrap();
}

#[tokio::test]
async fn probabilities_stay_in_range_and_match_bands() {
    let dir = tempdir().unwrap();
    let service = service_with(&dir, FakeClient::open(Behavior::Reply("ok")));

    let series: Vec<Vec<f64>> = vec![
        (0..12).map(|i| 200.0 - 12.0 * i as f64).collect(),
        (0..12).map(|i| 60.0 + 11.0 * i as f64).collect(),
        vec![95.0, 94.0, 92.0, 91.0, 90.0, 89.0, 88.0, 87.0, 86.0, 84.0, 82.0, 79.0],
        vec![300.0; 20],
    ];

    for glucose in series {
        let mut req = request(glucose);
        req.carbs = vec![10.0, 25.0, 15.0];
        req.insulin = InsulinSeries {
            basal: vec![0.8; 12],
            bolus: vec![0.0, 1.5, 1.0],
        };

        let result = commands::predict(&service, req).await.unwrap();
        for p in [result.hypo_probability, result.hyper_probability] {
            assert!((0.0..=1.0).contains(&p), "probability {p} out of range");
        }
        assert_eq!(result.hypo_risk, band(result.hypo_probability));
        assert_eq!(result.hyper_risk, band(result.hyper_probability));
        assert_eq!(result.time_to_hypo_minutes.is_some(), result.hypo_probability > 0.3);
        assert_eq!(result.time_to_hyper_minutes.is_some(), result.hyper_probability > 0.3);
    }

    service.orchestrator().wait_idle().await;
    assert_eq!(count_recommendations(service.database()).await, 4);
    service.shutdown().await.unwrap();
}

#[tokio::test]
async fn interpolating_variant_accepts_short_series() {
    let dir = tempdir().unwrap();
    let service = service_with(&dir, FakeClient::open(Behavior::Reply("ok")));

    let result = commands::predict_interpolated(&service, request(vec![150.0, 160.0, 170.0]))
        .await
        .unwrap();
    assert_eq!(result.current_glucose, 170.0);

    let empty = commands::predict_interpolated(&service, request(vec![])).await.unwrap();
    assert_eq!(empty.current_glucose, 120.0);

    service.shutdown().await.unwrap();
}

#[tokio::test]
async fn prediction_ids_are_unique_and_tracked() {
    let dir = tempdir().unwrap();
    let service = service_with(&dir, FakeClient::open(Behavior::Reply("ok")));

    let first = commands::predict(&service, request(vec![110.0; 12])).await.unwrap();
    let second = commands::predict(&service, request(vec![110.0; 12])).await.unwrap();
    assert_ne!(first.prediction_id, second.prediction_id);

    let record = commands::recommendation_status(&service, first.prediction_id.clone())
        .await
        .unwrap();
    assert_eq!(record.prediction_id, first.prediction_id);
    let snapshot = record.prediction_data.unwrap();
    assert_eq!(snapshot.current_glucose, 110.0);

    service.shutdown().await.unwrap();
}

#[tokio::test]
async fn unknown_prediction_is_not_found() {
    let dir = tempdir().unwrap();
    let service = service_with(&dir, FakeClient::open(Behavior::Reply("ok")));

    let err = commands::recommendation_status(&service, "does-not-exist".into())
        .await
        .unwrap_err();
    assert_eq!(err.status, 404);
    assert_eq!(err.error, "not_found");

    service.shutdown().await.unwrap();
}

#[tokio::test]
async fn telemetry_round_trips_newest_first() {
    let dir = tempdir().unwrap();
    let service = service_with(&dir, FakeClient::open(Behavior::Reply("ok")));
    let now = Utc::now();

    for (minutes_ago, value) in [(30, 110.0), (10, 130.0), (20, 120.0)] {
        let reading = GlucoseReading {
            id: None,
            user_id: Some("u1".into()),
            value,
            timestamp: now - Duration::minutes(minutes_ago),
            meal_context: None,
            notes: None,
        };
        commands::record_telemetry(&service, TelemetryEntry::Glucose(reading))
            .await
            .unwrap();
    }
    let dose = InsulinDose {
        id: None,
        user_id: Some("u2".into()),
        insulin_type: InsulinType::Bolus,
        dose: 2.0,
        timestamp: now,
        notes: None,
    };
    commands::record_telemetry(&service, TelemetryEntry::Insulin(dose))
        .await
        .unwrap();

    let listing = commands::recent_telemetry(
        &service,
        TelemetryKind::Glucose,
        RecentTelemetryQuery {
            user_id: Some("u1".into()),
            limit: Some(2),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    match listing {
        TelemetryListing::Glucose(readings) => {
            let values: Vec<f64> = readings.iter().map(|r| r.value).collect();
            assert_eq!(values, vec![130.0, 120.0]);
        }
        other => panic!("unexpected listing {other:?}"),
    }

    let other_user = commands::recent_telemetry(
        &service,
        TelemetryKind::Insulin,
        RecentTelemetryQuery {
            user_id: Some("u1".into()),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert!(other_user.is_empty());

    service.shutdown().await.unwrap();
}

#[tokio::test]
async fn telemetry_entries_are_validated() {
    let dir = tempdir().unwrap();
    let service = service_with(&dir, FakeClient::open(Behavior::Reply("ok")));

    let entry: TelemetryEntry =
        serde_json::from_str(r#"{"kind": "glucose", "value": 0}"#).unwrap();
    let err = commands::record_telemetry(&service, entry).await.unwrap_err();
    assert_eq!(err.status, 400);

    let err = commands::recent_telemetry(
        &service,
        TelemetryKind::Meal,
        RecentTelemetryQuery {
            hours: Some(0),
            ..Default::default()
        },
    )
    .await
    .unwrap_err();
    assert_eq!(err.status, 400);

    service.shutdown().await.unwrap();
}

#[tokio::test]
async fn huge_lookback_is_a_bad_request() {
    let dir = tempdir().unwrap();
    let service = service_with(&dir, FakeClient::open(Behavior::Reply("ok")));

    let err = commands::recent_telemetry(
        &service,
        TelemetryKind::Glucose,
        RecentTelemetryQuery {
            hours: Some(i64::MAX),
            ..Default::default()
        },
    )
    .await
    .unwrap_err();
    assert_eq!(err.status, 400);
    assert_eq!(err.error, "hours out of range");

    let err = commands::recent_timeline(&service, None, Some(i64::MAX / 4))
        .await
        .unwrap_err();
    assert_eq!(err.status, 400);

    service.shutdown().await.unwrap();
}

#[tokio::test]
async fn timeline_merges_collections_newest_first() {
    let dir = tempdir().unwrap();
    let service = service_with(&dir, FakeClient::open(Behavior::Reply("ok")));
    let now = Utc::now();
    let ago = |minutes| now - Duration::minutes(minutes);

    for (minutes, value) in [(50, 140.0), (5, 118.0), (25, 126.0)] {
        let reading = GlucoseReading {
            id: None,
            user_id: Some("u1".into()),
            value,
            timestamp: ago(minutes),
            meal_context: None,
            notes: None,
        };
        commands::record_telemetry(&service, TelemetryEntry::Glucose(reading))
            .await
            .unwrap();
    }
    let entries = [
        TelemetryEntry::Insulin(InsulinDose {
            id: None,
            user_id: Some("u1".into()),
            insulin_type: InsulinType::Bolus,
            dose: 4.0,
            timestamp: ago(40),
            notes: None,
        }),
        TelemetryEntry::Meal(MealEntry {
            id: None,
            user_id: Some("u1".into()),
            carbs: 55.0,
            meal_type: Some(MealType::Lunch),
            description: None,
            timestamp: ago(45),
        }),
        TelemetryEntry::Activity(ActivityEntry {
            id: None,
            user_id: Some("u1".into()),
            activity_type: "cycling".into(),
            duration_minutes: 30,
            intensity: None,
            timestamp: ago(15),
            notes: None,
        }),
        // Another user's meal and one outside the window are excluded.
        TelemetryEntry::Meal(MealEntry {
            id: None,
            user_id: Some("u2".into()),
            carbs: 10.0,
            meal_type: None,
            description: None,
            timestamp: ago(10),
        }),
        TelemetryEntry::Meal(MealEntry {
            id: None,
            user_id: Some("u1".into()),
            carbs: 80.0,
            meal_type: None,
            description: None,
            timestamp: ago(60 * 30),
        }),
    ];
    for entry in entries {
        commands::record_telemetry(&service, entry).await.unwrap();
    }

    let view = commands::recent_timeline(&service, Some("u1".into()), None)
        .await
        .unwrap();

    let kinds: Vec<&str> = view
        .timeline
        .iter()
        .map(|event| match event {
            TimelineEvent::Glucose { .. } => "glucose",
            TimelineEvent::Insulin { .. } => "insulin",
            TimelineEvent::Meal { .. } => "meal",
            TimelineEvent::Activity { .. } => "activity",
        })
        .collect();
    assert_eq!(
        kinds,
        vec!["glucose", "activity", "glucose", "insulin", "meal", "glucose"]
    );
    assert!(view
        .timeline
        .windows(2)
        .all(|pair| pair[0].timestamp() >= pair[1].timestamp()));

    match &view.timeline[1] {
        TimelineEvent::Activity { value, activity_type, .. } => {
            assert_eq!(*value, 30.0);
            assert_eq!(activity_type, "cycling");
        }
        other => panic!("unexpected event {other:?}"),
    }
    match &view.timeline[4] {
        TimelineEvent::Meal { value, meal_type, .. } => {
            assert_eq!(*value, 55.0);
            assert_eq!(*meal_type, Some(MealType::Lunch));
        }
        other => panic!("unexpected event {other:?}"),
    }

    let chart: Vec<f64> = view.glucose_data.iter().map(|point| point.value).collect();
    assert_eq!(chart, vec![140.0, 126.0, 118.0]);
    assert!(view.glucose_data.iter().all(|point| point.time.len() == 5));

    let json = serde_json::to_value(&view).unwrap();
    assert_eq!(json["timeline"][0]["type"], "glucose");
    assert_eq!(json["timeline"][3]["insulin_type"], "bolus");

    service.shutdown().await.unwrap();
}

#[tokio::test]
async fn health_reports_active_strategy() {
    let dir = tempdir().unwrap();
    let service = service_with(&dir, FakeClient::open(Behavior::Reply("ok")));

    let health = commands::health(&service);
    assert_eq!(health.status, "healthy");
    assert_eq!(health.inference, "rules");

    service.shutdown().await.unwrap();
}
