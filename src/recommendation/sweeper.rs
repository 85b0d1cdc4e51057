use anyhow::{bail, Context, Result};
use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::{Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::db::Database;

// Set to false to silence sweep logs
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

const SWEEP_TIMEOUT_SECS: u64 = 30;

/// Periodically deletes recommendation records older than the record TTL.
pub struct RetentionSweeper {
    handle: Option<JoinHandle<()>>,
    cancel_token: Option<CancellationToken>,
}

impl RetentionSweeper {
    pub fn new() -> Self {
        Self {
            handle: None,
            cancel_token: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    pub fn start(&mut self, db: Database, interval: Duration, ttl: chrono::Duration) -> Result<()> {
        if self.handle.is_some() {
            bail!("retention sweeper already running");
        }
        if interval.is_zero() {
            bail!("sweep interval must be positive");
        }

        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(sweep_loop(db, interval, ttl, cancel_token.clone()));

        self.handle = Some(handle);
        self.cancel_token = Some(cancel_token);
        Ok(())
    }

    pub async fn stop(&mut self) -> Result<()> {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }

        if let Some(handle) = self.handle.take() {
            handle
                .await
                .context("retention sweep task failed to join")
                .map(|_| ())
        } else {
            Ok(())
        }
    }
}

impl Default for RetentionSweeper {
    fn default() -> Self {
        Self::new()
    }
}

/// Delete every record initiated more than `ttl` ago. Returns how many were removed.
pub async fn sweep_expired(db: &Database, ttl: chrono::Duration) -> Result<usize> {
    db.purge_recommendations_before(Utc::now() - ttl).await
}

async fn sweep_loop(
    db: Database,
    interval: Duration,
    ttl: chrono::Duration,
    cancel_token: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let fut = sweep_expired(&db, ttl);
                match tokio::time::timeout(Duration::from_secs(SWEEP_TIMEOUT_SECS), fut).await {
                    Ok(Ok(0)) => log_debug!("retention sweep found nothing to remove"),
                    Ok(Ok(removed)) => log_info!("retention sweep removed {} expired records", removed),
                    Ok(Err(err)) => log_error!("retention sweep failed: {err:?}"),
                    Err(_) => log_warn!("retention sweep timed out (> {}s)", SWEEP_TIMEOUT_SECS),
                }
            }
            _ = cancel_token.cancelled() => {
                log_info!("retention sweeper shutting down");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{PredictionSnapshot, RecommendationRecord};
    use tempfile::tempdir;

    fn snapshot() -> PredictionSnapshot {
        PredictionSnapshot {
            current_glucose: 120.0,
            hypo_probability: 0.1,
            hyper_probability: 0.2,
            time_to_hypo: None,
            time_to_hyper: None,
        }
    }

    #[tokio::test]
    async fn sweeper_removes_only_expired_records() {
        let dir = tempdir().unwrap();
        let db = Database::new(dir.path().join("sweep.sqlite3")).unwrap();
        let now = Utc::now();

        let stale = RecommendationRecord::pending("stale", snapshot(), now - chrono::Duration::hours(30));
        let fresh = RecommendationRecord::pending("fresh", snapshot(), now - chrono::Duration::hours(1));
        db.upsert_pending_recommendation(&stale).await.unwrap();
        db.upsert_pending_recommendation(&fresh).await.unwrap();

        let mut sweeper = RetentionSweeper::new();
        sweeper
            .start(db.clone(), Duration::from_millis(20), chrono::Duration::hours(24))
            .unwrap();
        assert!(sweeper.start(db.clone(), Duration::from_millis(20), chrono::Duration::hours(24)).is_err());

        // The first tick fires immediately.
        tokio::time::sleep(Duration::from_millis(100)).await;
        sweeper.stop().await.unwrap();
        assert!(!sweeper.is_running());

        let horizon = now - chrono::Duration::days(365);
        assert!(db.get_recommendation("stale", horizon).await.unwrap().is_none());
        assert!(db.get_recommendation("fresh", horizon).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn stop_without_start_is_a_no_op() {
        let mut sweeper = RetentionSweeper::default();
        sweeper.stop().await.unwrap();
    }
}
