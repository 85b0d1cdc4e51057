#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use glucocast_lib::db::{Database, RecommendationRequest};
use glucocast_lib::inference::InferenceEngine;
use glucocast_lib::recommendation::{RecommendationClient, RecommendationReply};
use glucocast_lib::{ClientError, GlycemicService, ServiceSettings};
use serde_json::json;
use tempfile::TempDir;
use tokio::sync::Notify;

#[derive(Clone)]
pub enum Behavior {
    Reply(&'static str),
    Status(u16),
    Hang,
}

/// Fake recommendation service. Each call blocks until `release` is called,
/// unless the client was built open.
pub struct FakeClient {
    behavior: Behavior,
    gate: Option<Arc<Notify>>,
    calls: AtomicUsize,
    requests: std::sync::Mutex<Vec<RecommendationRequest>>,
}

impl FakeClient {
    pub fn open(behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            behavior,
            gate: None,
            calls: AtomicUsize::new(0),
            requests: std::sync::Mutex::new(Vec::new()),
        })
    }

    pub fn gated(behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            behavior,
            gate: Some(Arc::new(Notify::new())),
            calls: AtomicUsize::new(0),
            requests: std::sync::Mutex::new(Vec::new()),
        })
    }

    pub fn release(&self) {
        if let Some(gate) = &self.gate {
            gate.notify_waiters();
            gate.notify_one();
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<RecommendationRequest> {
        self.requests.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl RecommendationClient for FakeClient {
    async fn recommend(
        &self,
        request: &RecommendationRequest,
    ) -> Result<RecommendationReply, ClientError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());

        if let Some(gate) = &self.gate {
            gate.notified().await;
        }

        match &self.behavior {
            Behavior::Reply(text) => RecommendationReply::from_body(json!({
                "recommendation": text,
                "source": "fake",
            })),
            Behavior::Status(code) => Err(ClientError::Status {
                code: *code,
                body: String::new(),
            }),
            Behavior::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(ClientError::Transport("unreachable".into()))
            }
        }
    }
}

pub fn test_settings(dir: &TempDir) -> ServiceSettings {
    ServiceSettings {
        database_path: dir.path().join("glucocast.sqlite3"),
        model_dir: None,
        request_timeout_secs: 2,
        enrichment_grace_ms: 0,
        ..Default::default()
    }
}

pub fn service_with(dir: &TempDir, client: Arc<FakeClient>) -> GlycemicService {
    service_with_settings(test_settings(dir), client)
}

pub fn service_with_settings(settings: ServiceSettings, client: Arc<FakeClient>) -> GlycemicService {
    let db = Database::new(settings.database_path.clone()).unwrap();
    GlycemicService::from_parts(db, InferenceEngine::rules_only(), client, settings)
}

pub async fn count_recommendations(db: &Database) -> i64 {
    db.execute(|conn| {
        Ok(conn.query_row("SELECT COUNT(*) FROM recommendations", [], |row| row.get(0))?)
    })
    .await
    .unwrap()
}
