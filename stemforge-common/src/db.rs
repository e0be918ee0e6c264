//! Database initialization
//!
//! Opens (creating if needed) the SQLite database and creates the schema.
//! Foreign keys are enabled on every pooled connection so asset rows cascade
//! when their job is deleted.

use crate::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;

/// Initialize database connection pool and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", db_path.display()))?
        .create_if_missing(true)
        .foreign_keys(true);

    let pool = SqlitePool::connect_with(options).await?;
    create_schema(&pool).await?;

    Ok(pool)
}

/// In-memory pool for tests
///
/// Pinned to a single never-recycled connection: every pooled connection to
/// `:memory:` would otherwise open its own empty database.
pub async fn init_memory_database() -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;
    create_schema(&pool).await?;
    Ok(pool)
}

/// Create all tables if they do not already exist
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_jobs_table(pool).await?;
    create_assets_table(pool).await?;
    create_provider_configs_table(pool).await?;
    Ok(())
}

async fn create_jobs_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS jobs (
            id TEXT PRIMARY KEY,
            status TEXT NOT NULL DEFAULT 'pending',
            source_type TEXT NOT NULL,
            source_value TEXT NOT NULL,
            title TEXT,
            artist TEXT,
            album TEXT,
            album_art TEXT,
            duration_seconds REAL,
            isrc TEXT,
            spotify_id TEXT,
            songlink_data TEXT,
            master_audio_path TEXT,
            master_audio_format TEXT,
            master_audio_service TEXT,
            progress INTEGER NOT NULL DEFAULT 0,
            progress_message TEXT NOT NULL DEFAULT '',
            error_message TEXT,
            expires_at TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_jobs_status ON jobs(status)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_jobs_expires_at ON jobs(expires_at)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_assets_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS assets (
            id TEXT PRIMARY KEY,
            job_id TEXT NOT NULL REFERENCES jobs(id) ON DELETE CASCADE,
            asset_type TEXT NOT NULL DEFAULT 'stem',
            stem_type TEXT NOT NULL,
            file_path TEXT NOT NULL,
            file_size INTEGER NOT NULL DEFAULT 0,
            mime_type TEXT NOT NULL DEFAULT 'audio/wav',
            has_midi INTEGER NOT NULL DEFAULT 0,
            midi_path TEXT,
            provider TEXT,
            expires_at TEXT,
            created_at TEXT NOT NULL,
            UNIQUE(job_id, stem_type)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_assets_job_id ON assets(job_id)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_provider_configs_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS provider_configs (
            service_name TEXT PRIMARY KEY,
            api_key TEXT,
            api_secret TEXT,
            priority INTEGER NOT NULL DEFAULT 100,
            is_enabled INTEGER NOT NULL DEFAULT 1,
            rate_limit INTEGER,
            rate_window_seconds INTEGER,
            current_usage INTEGER NOT NULL DEFAULT 0,
            usage_reset_at TEXT,
            config TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Seed known services so admin tooling has rows to edit; priorities match
    // the acquisition fallback order.
    let defaults = vec![
        ("tidal", 1),
        ("deezer", 2),
        ("qobuz", 3),
        ("lalal", 10),
        ("fadr", 11),
        ("basic_pitch", 20),
    ];

    for (service_name, priority) in defaults {
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO provider_configs (service_name, priority)
            VALUES (?, ?)
            "#,
        )
        .bind(service_name)
        .bind(priority)
        .execute(pool)
        .await?;
    }

    Ok(())
}
