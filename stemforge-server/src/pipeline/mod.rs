//! Job orchestration engine
//!
//! Drives a job through the fixed step sequence, persisting status, progress
//! and the step's partial update at every boundary:
//!
//! | From | Step | To | Progress |
//! |---|---|---|---|
//! | `pending` | dispatch | `identifying` | 10 |
//! | `identifying` | identify | `acquiring` | 30 |
//! | `acquiring` | acquire | `separating` | 60 |
//! | `separating` | separate | `generating_midi` | 90 |
//! | `generating_midi` | midi | `completed` | 100 |
//!
//! Any step error transitions the job to `failed` (progress reset to 0) and
//! stops the pipeline. Every step short-circuits on already-completed work,
//! so re-dispatching a half-finished job converges instead of duplicating
//! downloads or assets.

pub mod steps;

use crate::db;
use crate::models::{Job, JobStatus, JobUpdate};
use crate::providers::{ProviderError, ProviderRegistry};
use crate::storage::Storage;
use chrono::{Duration, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// Step failures; the orchestrator converts these into the job's terminal
/// error message, so every variant reads well for an operator.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Could not identify track: {0}")]
    IdentificationFailed(String),

    #[error("No streaming provider could deliver this track. Configure Tidal, Deezer, or Qobuz credentials to enable acquisition{0}")]
    AcquisitionUnavailable(String),

    #[error("Stem separation failed: {0}")]
    SeparationFailed(String),

    #[error("MIDI generation failed: {0}")]
    MidiFailed(String),

    #[error("No stem assets exist for this job")]
    NoStems,

    #[error("Master audio file is missing: {0}")]
    MasterMissing(String),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Everything a step handler may touch
///
/// Steps read the job snapshot and this context; they never write the job
/// row themselves (asset rows are theirs to insert).
pub struct StepContext {
    pub db: SqlitePool,
    pub storage: Storage,
    pub registry: Arc<ProviderRegistry>,
    pub retention: Duration,
}

/// The state machine driving jobs through the pipeline
pub struct JobOrchestrator {
    ctx: StepContext,
}

impl JobOrchestrator {
    pub fn new(
        db: SqlitePool,
        storage: Storage,
        registry: Arc<ProviderRegistry>,
        retention: Duration,
    ) -> Self {
        Self {
            ctx: StepContext {
                db,
                storage,
                registry,
                retention,
            },
        }
    }

    /// Fire-and-forget dispatch; the HTTP response never waits on this
    pub fn dispatch(self: &Arc<Self>, job_id: Uuid) {
        let orchestrator = self.clone();
        tokio::spawn(async move {
            if let Err(e) = orchestrator.run(job_id).await {
                tracing::error!(job_id = %job_id, error = ?e, "Orchestration task failed");
            }
        });
    }

    /// Re-dispatch every job that was mid-flight when the previous process
    /// exited. Step short-circuits make re-running completed stages free.
    pub async fn resume_incomplete(self: &Arc<Self>) -> anyhow::Result<usize> {
        let jobs = db::jobs::load_incomplete_jobs(&self.ctx.db).await?;
        let count = jobs.len();

        for job in jobs {
            tracing::info!(
                job_id = %job.id,
                status = job.status.as_str(),
                "Resuming incomplete job from previous run"
            );
            self.dispatch(job.id);
        }

        Ok(count)
    }

    /// Execute the full pipeline for one job
    pub async fn run(&self, job_id: Uuid) -> anyhow::Result<()> {
        let Some(mut job) = db::jobs::load_job(&self.ctx.db, job_id).await? else {
            anyhow::bail!("Job not found: {}", job_id);
        };

        if job.is_terminal() {
            tracing::debug!(job_id = %job_id, status = job.status.as_str(), "Job already terminal, nothing to do");
            return Ok(());
        }

        tracing::info!(
            job_id = %job_id,
            source_type = job.source_type.as_str(),
            "Starting pipeline"
        );

        match self.execute(&mut job).await {
            Ok(()) => {
                tracing::info!(job_id = %job_id, "Pipeline completed");
                Ok(())
            }
            Err(e) => {
                tracing::error!(job_id = %job_id, error = %e, "Pipeline failed");
                self.mark_failed(&mut job, &e).await?;
                Ok(())
            }
        }
    }

    async fn execute(&self, job: &mut Job) -> Result<(), PipelineError> {
        self.enter_step(job, JobStatus::Identifying, 10, "Identifying track...")
            .await?;
        let update = steps::identify(&self.ctx, job).await?;
        self.apply_update(job, update).await?;

        self.enter_step(job, JobStatus::Acquiring, 30, "Acquiring master audio...")
            .await?;
        let update = steps::acquire(&self.ctx, job).await?;
        self.apply_update(job, update).await?;

        self.enter_step(job, JobStatus::Separating, 60, "Separating stems...")
            .await?;
        let update = steps::separate(&self.ctx, job).await?;
        self.apply_update(job, update).await?;

        self.enter_step(
            job,
            JobStatus::GeneratingMidi,
            90,
            "Transcribing stems to MIDI...",
        )
        .await?;
        let update = steps::generate_midi(&self.ctx, job).await?;
        self.apply_update(job, update).await?;

        // Terminal success: retention clock starts now
        job.status = JobStatus::Completed;
        job.progress = 100;
        job.progress_message = "Processing complete".to_string();
        job.expires_at = Some(Utc::now() + self.ctx.retention);
        job.touch();
        db::jobs::save_job(&self.ctx.db, job).await?;

        Ok(())
    }

    /// Write status, progress and a human message at step entry
    async fn enter_step(
        &self,
        job: &mut Job,
        status: JobStatus,
        progress: u8,
        message: &str,
    ) -> Result<(), PipelineError> {
        tracing::info!(job_id = %job.id, status = status.as_str(), progress, "{}", message);

        job.status = status;
        job.progress = progress;
        job.progress_message = message.to_string();
        job.touch();
        db::jobs::save_job(&self.ctx.db, job).await?;

        Ok(())
    }

    /// Merge a step's partial update into the snapshot and persist once
    async fn apply_update(&self, job: &mut Job, update: JobUpdate) -> Result<(), PipelineError> {
        if update.is_empty() {
            return Ok(());
        }

        update.apply_to(job);
        job.touch();
        db::jobs::save_job(&self.ctx.db, job).await?;

        Ok(())
    }

    /// Terminal failure: progress resets to 0 and the retention clock starts
    /// so the reaper collects whatever partial artifacts accumulated.
    async fn mark_failed(&self, job: &mut Job, error: &PipelineError) -> anyhow::Result<()> {
        job.status = JobStatus::Failed;
        job.progress = 0;
        job.progress_message = "Processing failed".to_string();
        job.error_message = Some(error.to_string());
        job.expires_at = Some(Utc::now() + self.ctx.retention);
        job.touch();
        db::jobs::save_job(&self.ctx.db, job).await?;

        Ok(())
    }
}
