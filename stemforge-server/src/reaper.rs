//! Expired-job reaper
//!
//! Periodic background task that deletes the on-disk directories and the
//! database row of every job whose retention window has elapsed. Files go
//! first, then the row; a crash in between recovers on the next run because
//! the row's `expires_at` is still in the past.
//!
//! Jobs written within the grace period are skipped even when expired, so
//! the reaper never races an orchestrator that is still producing output.

use crate::db;
use crate::storage::Storage;
use chrono::{Duration, Utc};
use sqlx::SqlitePool;

const GRACE_MINUTES: i64 = 5;

pub struct Reaper {
    db: SqlitePool,
    storage: Storage,
    interval: std::time::Duration,
}

impl Reaper {
    pub fn new(db: SqlitePool, storage: Storage, interval: std::time::Duration) -> Self {
        Self {
            db,
            storage,
            interval,
        }
    }

    /// Run forever on the configured schedule
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            // The immediate first tick sweeps leftovers from previous runs
            loop {
                ticker.tick().await;
                match self.run_once().await {
                    Ok(0) => {}
                    Ok(reaped) => tracing::info!(reaped, "Reaper pass finished"),
                    Err(e) => tracing::error!(error = ?e, "Reaper pass failed"),
                }
            }
        })
    }

    /// One sweep; returns the number of jobs removed
    pub async fn run_once(&self) -> anyhow::Result<usize> {
        let now = Utc::now();
        let expired =
            db::jobs::load_expired_jobs(&self.db, now, Duration::minutes(GRACE_MINUTES)).await?;

        let mut reaped = 0;
        for job in expired {
            tracing::info!(
                job_id = %job.id,
                status = job.status.as_str(),
                expired_at = %job.expires_at.map(|t| t.to_rfc3339()).unwrap_or_default(),
                "Reaping expired job"
            );

            // Bytes first, row second: if this crashes partway the row
            // remains expired and the next pass retries.
            self.storage.remove_job_dirs(job.id).await?;
            db::jobs::delete_job(&self.db, job.id).await?;
            reaped += 1;
        }

        Ok(reaped)
    }
}
