//! Job persistence

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::models::{Job, JobStatus, PlatformIds, SourceType, TrackMetadata};
use stemforge_common::time;

/// Insert a freshly created job
pub async fn insert_job(pool: &SqlitePool, job: &Job) -> Result<()> {
    let songlink_data = job
        .songlink_data
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;

    sqlx::query(
        r#"
        INSERT INTO jobs (
            id, status, source_type, source_value,
            title, artist, album, album_art, duration_seconds, isrc, spotify_id,
            songlink_data, master_audio_path, master_audio_format, master_audio_service,
            progress, progress_message, error_message, expires_at, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(job.id.to_string())
    .bind(job.status.as_str())
    .bind(job.source_type.as_str())
    .bind(&job.source_value)
    .bind(&job.metadata.title)
    .bind(&job.metadata.artist)
    .bind(&job.metadata.album)
    .bind(&job.metadata.album_art)
    .bind(job.metadata.duration_seconds)
    .bind(&job.metadata.isrc)
    .bind(&job.metadata.spotify_id)
    .bind(songlink_data)
    .bind(&job.master_audio_path)
    .bind(&job.master_audio_format)
    .bind(&job.master_audio_service)
    .bind(job.progress as i64)
    .bind(&job.progress_message)
    .bind(&job.error_message)
    .bind(job.expires_at.map(time::to_rfc3339))
    .bind(time::to_rfc3339(job.created_at))
    .bind(time::to_rfc3339(job.updated_at))
    .execute(pool)
    .await?;

    Ok(())
}

/// Persist every mutable field of a job snapshot
pub async fn save_job(pool: &SqlitePool, job: &Job) -> Result<()> {
    let songlink_data = job
        .songlink_data
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;

    sqlx::query(
        r#"
        UPDATE jobs SET
            status = ?,
            title = ?,
            artist = ?,
            album = ?,
            album_art = ?,
            duration_seconds = ?,
            isrc = ?,
            spotify_id = ?,
            songlink_data = ?,
            master_audio_path = ?,
            master_audio_format = ?,
            master_audio_service = ?,
            progress = ?,
            progress_message = ?,
            error_message = ?,
            expires_at = ?,
            updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(job.status.as_str())
    .bind(&job.metadata.title)
    .bind(&job.metadata.artist)
    .bind(&job.metadata.album)
    .bind(&job.metadata.album_art)
    .bind(job.metadata.duration_seconds)
    .bind(&job.metadata.isrc)
    .bind(&job.metadata.spotify_id)
    .bind(songlink_data)
    .bind(&job.master_audio_path)
    .bind(&job.master_audio_format)
    .bind(&job.master_audio_service)
    .bind(job.progress as i64)
    .bind(&job.progress_message)
    .bind(&job.error_message)
    .bind(job.expires_at.map(time::to_rfc3339))
    .bind(time::to_rfc3339(job.updated_at))
    .bind(job.id.to_string())
    .execute(pool)
    .await?;

    Ok(())
}

/// Load a job by ID
pub async fn load_job(pool: &SqlitePool, job_id: Uuid) -> Result<Option<Job>> {
    let row = sqlx::query("SELECT * FROM jobs WHERE id = ?")
        .bind(job_id.to_string())
        .fetch_optional(pool)
        .await?;

    row.map(|row| job_from_row(&row)).transpose()
}

/// Most recently created jobs, newest first
pub async fn list_recent_jobs(pool: &SqlitePool, limit: i64) -> Result<Vec<Job>> {
    let rows = sqlx::query("SELECT * FROM jobs ORDER BY created_at DESC LIMIT ?")
        .bind(limit)
        .fetch_all(pool)
        .await?;

    rows.iter().map(job_from_row).collect()
}

/// Jobs in a non-terminal status, oldest first
///
/// Used on startup to re-dispatch work that was mid-flight when the previous
/// process exited; every step short-circuits on completed stages so re-running
/// is safe.
pub async fn load_incomplete_jobs(pool: &SqlitePool) -> Result<Vec<Job>> {
    let rows = sqlx::query(
        r#"
        SELECT * FROM jobs
        WHERE status NOT IN ('completed', 'failed')
        ORDER BY created_at ASC
        "#,
    )
    .fetch_all(pool)
    .await?;

    rows.iter().map(job_from_row).collect()
}

/// Jobs whose retention window has elapsed and that have been quiet for at
/// least `grace` (the reaper must not race an orchestrator that is still
/// writing).
pub async fn load_expired_jobs(
    pool: &SqlitePool,
    now: DateTime<Utc>,
    grace: Duration,
) -> Result<Vec<Job>> {
    let cutoff = now - grace;
    let rows = sqlx::query(
        r#"
        SELECT * FROM jobs
        WHERE expires_at IS NOT NULL AND expires_at < ? AND updated_at < ?
        "#,
    )
    .bind(time::to_rfc3339(now))
    .bind(time::to_rfc3339(cutoff))
    .fetch_all(pool)
    .await?;

    rows.iter().map(job_from_row).collect()
}

/// Delete a job row; asset rows cascade
pub async fn delete_job(pool: &SqlitePool, job_id: Uuid) -> Result<()> {
    sqlx::query("DELETE FROM jobs WHERE id = ?")
        .bind(job_id.to_string())
        .execute(pool)
        .await?;

    Ok(())
}

fn job_from_row(row: &SqliteRow) -> Result<Job> {
    let id: String = row.get("id");
    let status: String = row.get("status");
    let source_type: String = row.get("source_type");
    let songlink_data: Option<String> = row.get("songlink_data");
    let expires_at: Option<String> = row.get("expires_at");
    let created_at: String = row.get("created_at");
    let updated_at: String = row.get("updated_at");

    let status = JobStatus::parse(&status)
        .ok_or_else(|| anyhow::anyhow!("Unknown job status in database: {}", status))?;
    let source_type = SourceType::parse(&source_type)
        .ok_or_else(|| anyhow::anyhow!("Unknown source type in database: {}", source_type))?;
    let songlink_data: Option<PlatformIds> = songlink_data
        .map(|s| serde_json::from_str(&s))
        .transpose()?;

    Ok(Job {
        id: Uuid::parse_str(&id)?,
        status,
        source_type,
        source_value: row.get("source_value"),
        metadata: TrackMetadata {
            title: row.get("title"),
            artist: row.get("artist"),
            album: row.get("album"),
            album_art: row.get("album_art"),
            duration_seconds: row.get("duration_seconds"),
            isrc: row.get("isrc"),
            spotify_id: row.get("spotify_id"),
        },
        songlink_data,
        master_audio_path: row.get("master_audio_path"),
        master_audio_format: row.get("master_audio_format"),
        master_audio_service: row.get("master_audio_service"),
        progress: row.get::<i64, _>("progress") as u8,
        progress_message: row.get("progress_message"),
        error_message: row.get("error_message"),
        expires_at: time::parse_opt_rfc3339(expires_at)?,
        created_at: time::parse_rfc3339(&created_at)?,
        updated_at: time::parse_rfc3339(&updated_at)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::JobUpdate;
    use stemforge_common::db::init_memory_database;

    async fn pool() -> SqlitePool {
        init_memory_database().await.unwrap()
    }

    #[tokio::test]
    async fn test_insert_and_load_round_trip() {
        let pool = pool().await;
        let mut job = Job::new(SourceType::SpotifyUrl, "https://open.spotify.com/track/X".into());
        job.metadata.title = Some("Teardrop".to_string());
        job.songlink_data = Some(PlatformIds {
            tidal_id: Some("77646168".to_string()),
            ..Default::default()
        });
        insert_job(&pool, &job).await.unwrap();

        let loaded = load_job(&pool, job.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, JobStatus::Pending);
        assert_eq!(loaded.metadata.title.as_deref(), Some("Teardrop"));
        assert_eq!(
            loaded.songlink_data.unwrap().tidal_id.as_deref(),
            Some("77646168")
        );
    }

    #[tokio::test]
    async fn test_save_persists_merged_update() {
        let pool = pool().await;
        let mut job = Job::new(SourceType::Isrc, "GBUM71029604".into());
        insert_job(&pool, &job).await.unwrap();

        JobUpdate {
            master_audio_path: Some("/data/audio/x/master.flac".to_string()),
            master_audio_format: Some("FLAC".to_string()),
            master_audio_service: Some("tidal".to_string()),
            ..Default::default()
        }
        .apply_to(&mut job);
        job.status = JobStatus::Acquiring;
        job.progress = 30;
        job.touch();
        save_job(&pool, &job).await.unwrap();

        let loaded = load_job(&pool, job.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, JobStatus::Acquiring);
        assert_eq!(loaded.progress, 30);
        assert_eq!(loaded.master_audio_service.as_deref(), Some("tidal"));
    }

    #[tokio::test]
    async fn test_incomplete_excludes_terminal() {
        let pool = pool().await;
        let mut done = Job::new(SourceType::Isrc, "A".into());
        done.status = JobStatus::Completed;
        let mut failed = Job::new(SourceType::Isrc, "B".into());
        failed.status = JobStatus::Failed;
        let stuck = Job::new(SourceType::Isrc, "C".into());
        for job in [&done, &failed, &stuck] {
            insert_job(&pool, job).await.unwrap();
        }

        let incomplete = load_incomplete_jobs(&pool).await.unwrap();
        assert_eq!(incomplete.len(), 1);
        assert_eq!(incomplete[0].id, stuck.id);
    }

    #[tokio::test]
    async fn test_expired_respects_grace_period() {
        let pool = pool().await;
        let now = Utc::now();

        // Expired and quiet: eligible
        let mut old = Job::new(SourceType::Isrc, "A".into());
        old.expires_at = Some(now - Duration::hours(2));
        old.updated_at = now - Duration::hours(2);
        insert_job(&pool, &old).await.unwrap();

        // Expired but recently written: skipped
        let mut active = Job::new(SourceType::Isrc, "B".into());
        active.expires_at = Some(now - Duration::hours(2));
        active.updated_at = now;
        insert_job(&pool, &active).await.unwrap();

        let expired = load_expired_jobs(&pool, now, Duration::minutes(5))
            .await
            .unwrap();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].id, old.id);
    }

    #[tokio::test]
    async fn test_list_recent_applies_limit() {
        let pool = pool().await;
        for i in 0..5 {
            let mut job = Job::new(SourceType::Isrc, format!("ISRC{}", i));
            // Spread creation times so ordering is deterministic
            job.created_at = Utc::now() - Duration::seconds(100 - i);
            insert_job(&pool, &job).await.unwrap();
        }
        let jobs = list_recent_jobs(&pool, 3).await.unwrap();
        assert_eq!(jobs.len(), 3);
        assert!(jobs[0].created_at >= jobs[1].created_at);
    }
}
