//! Asset persistence

use anyhow::Result;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::models::{Asset, AssetType, StemType};
use stemforge_common::time;

/// Insert a new asset row
pub async fn insert_asset(pool: &SqlitePool, asset: &Asset) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO assets (
            id, job_id, asset_type, stem_type, file_path, file_size,
            mime_type, has_midi, midi_path, provider, expires_at, created_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(asset.id.to_string())
    .bind(asset.job_id.to_string())
    .bind(asset.asset_type.as_str())
    .bind(asset.stem_type.as_str())
    .bind(&asset.file_path)
    .bind(asset.file_size)
    .bind(&asset.mime_type)
    .bind(asset.has_midi)
    .bind(&asset.midi_path)
    .bind(&asset.provider)
    .bind(asset.expires_at.map(time::to_rfc3339))
    .bind(time::to_rfc3339(asset.created_at))
    .execute(pool)
    .await?;

    Ok(())
}

/// All assets for a job
pub async fn load_assets_for_job(pool: &SqlitePool, job_id: Uuid) -> Result<Vec<Asset>> {
    let rows = sqlx::query("SELECT * FROM assets WHERE job_id = ? ORDER BY stem_type")
        .bind(job_id.to_string())
        .fetch_all(pool)
        .await?;

    rows.iter().map(asset_from_row).collect()
}

/// A single stem asset, if present
pub async fn load_stem_asset(
    pool: &SqlitePool,
    job_id: Uuid,
    stem_type: StemType,
) -> Result<Option<Asset>> {
    let row = sqlx::query("SELECT * FROM assets WHERE job_id = ? AND stem_type = ?")
        .bind(job_id.to_string())
        .bind(stem_type.as_str())
        .fetch_optional(pool)
        .await?;

    row.map(|row| asset_from_row(&row)).transpose()
}

/// Number of stem assets a job owns; drives the separate-step short-circuit
pub async fn count_stem_assets(pool: &SqlitePool, job_id: Uuid) -> Result<i64> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM assets WHERE job_id = ? AND asset_type = 'stem'")
            .bind(job_id.to_string())
            .fetch_one(pool)
            .await?;
    Ok(count)
}

/// Attach a generated MIDI transcription to a stem asset
///
/// `has_midi` and `midi_path` are written together; the pair is never split.
pub async fn set_midi(pool: &SqlitePool, asset_id: Uuid, midi_path: &str) -> Result<()> {
    sqlx::query("UPDATE assets SET has_midi = 1, midi_path = ? WHERE id = ?")
        .bind(midi_path)
        .bind(asset_id.to_string())
        .execute(pool)
        .await?;

    Ok(())
}

fn asset_from_row(row: &SqliteRow) -> Result<Asset> {
    let id: String = row.get("id");
    let job_id: String = row.get("job_id");
    let asset_type: String = row.get("asset_type");
    let stem_type: String = row.get("stem_type");
    let expires_at: Option<String> = row.get("expires_at");
    let created_at: String = row.get("created_at");

    let asset_type = AssetType::parse(&asset_type)
        .ok_or_else(|| anyhow::anyhow!("Unknown asset type in database: {}", asset_type))?;
    let stem_type = StemType::parse(&stem_type)
        .ok_or_else(|| anyhow::anyhow!("Unknown stem type in database: {}", stem_type))?;

    Ok(Asset {
        id: Uuid::parse_str(&id)?,
        job_id: Uuid::parse_str(&job_id)?,
        asset_type,
        stem_type,
        file_path: row.get("file_path"),
        file_size: row.get("file_size"),
        mime_type: row.get("mime_type"),
        has_midi: row.get("has_midi"),
        midi_path: row.get("midi_path"),
        provider: row.get("provider"),
        expires_at: time::parse_opt_rfc3339(expires_at)?,
        created_at: time::parse_rfc3339(&created_at)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::jobs::insert_job;
    use crate::models::{Job, SourceType};
    use stemforge_common::db::init_memory_database;

    async fn pool_with_job() -> (SqlitePool, Job) {
        let pool = init_memory_database().await.unwrap();
        let job = Job::new(SourceType::Isrc, "GBUM71029604".into());
        insert_job(&pool, &job).await.unwrap();
        (pool, job)
    }

    #[tokio::test]
    async fn test_insert_and_load_round_trip() {
        let (pool, job) = pool_with_job().await;
        let asset = Asset::new_stem(
            job.id,
            StemType::Vocals,
            "/data/stems/x/vocals.wav".to_string(),
            4096,
            "lalal",
            None,
        );
        insert_asset(&pool, &asset).await.unwrap();

        let assets = load_assets_for_job(&pool, job.id).await.unwrap();
        assert_eq!(assets.len(), 1);
        assert_eq!(assets[0].stem_type, StemType::Vocals);
        assert_eq!(assets[0].provider.as_deref(), Some("lalal"));
    }

    #[tokio::test]
    async fn test_duplicate_stem_type_rejected() {
        let (pool, job) = pool_with_job().await;
        let first = Asset::new_stem(job.id, StemType::Bass, "/a.wav".into(), 1, "lalal", None);
        let second = Asset::new_stem(job.id, StemType::Bass, "/b.wav".into(), 2, "fadr", None);
        insert_asset(&pool, &first).await.unwrap();
        assert!(
            insert_asset(&pool, &second).await.is_err(),
            "(job_id, stem_type) must be unique"
        );
    }

    #[tokio::test]
    async fn test_set_midi_keeps_flag_and_path_together() {
        let (pool, job) = pool_with_job().await;
        let asset = Asset::new_stem(job.id, StemType::Melody, "/m.wav".into(), 1, "fadr", None);
        insert_asset(&pool, &asset).await.unwrap();

        set_midi(&pool, asset.id, "/data/midi/x/melody.mid")
            .await
            .unwrap();

        let loaded = load_stem_asset(&pool, job.id, StemType::Melody)
            .await
            .unwrap()
            .unwrap();
        assert!(loaded.has_midi);
        assert_eq!(loaded.midi_path.as_deref(), Some("/data/midi/x/melody.mid"));
    }

    #[tokio::test]
    async fn test_count_stem_assets() {
        let (pool, job) = pool_with_job().await;
        assert_eq!(count_stem_assets(&pool, job.id).await.unwrap(), 0);
        for stem in [StemType::Vocals, StemType::Drums] {
            let asset = Asset::new_stem(job.id, stem, format!("/{}.wav", stem.as_str()), 1, "lalal", None);
            insert_asset(&pool, &asset).await.unwrap();
        }
        assert_eq!(count_stem_assets(&pool, job.id).await.unwrap(), 2);
    }
}
