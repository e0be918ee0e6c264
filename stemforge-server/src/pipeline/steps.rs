//! Pipeline step handlers
//!
//! Each step consumes a job snapshot and yields a partial update; the
//! orchestrator persists the merge. Steps never write the job row, though
//! separate/midi touch asset rows, which are independently owned.
//!
//! Every handler is idempotent: a short-circuit guard detects work already
//! done and returns an empty update.

use super::{PipelineError, StepContext};
use crate::db;
use crate::models::{Asset, Job, JobUpdate, SourceType};
use chrono::Utc;
use std::path::Path;

/// Identify: resolve the source reference to canonical track metadata
///
/// Uploaded files have no canonical identity yet; they skip identification
/// and acquisition reuses the uploaded bytes.
pub async fn identify(ctx: &StepContext, job: &Job) -> Result<JobUpdate, PipelineError> {
    if job.source_type == SourceType::FileUpload {
        tracing::debug!(job_id = %job.id, "Upload source, skipping identification");
        return Ok(JobUpdate::default());
    }

    if job.is_identified() {
        tracing::debug!(job_id = %job.id, "Already identified, skipping");
        return Ok(JobUpdate::default());
    }

    let identified = ctx
        .registry
        .identify(job.source_type, &job.source_value)
        .await?
        .ok_or_else(|| {
            PipelineError::IdentificationFailed(format!(
                "no track matched {} '{}'",
                job.source_type.as_str(),
                job.source_value
            ))
        })?;

    tracing::info!(
        job_id = %job.id,
        title = identified.title.as_deref().unwrap_or("?"),
        artist = identified.artist.as_deref().unwrap_or("?"),
        isrc = identified.isrc.as_deref().unwrap_or("?"),
        "Track identified"
    );

    Ok(JobUpdate {
        title: identified.title,
        artist: identified.artist,
        album: identified.album,
        album_art: identified.album_art,
        duration_seconds: identified.duration_seconds,
        isrc: identified.isrc,
        spotify_id: identified.spotify_id,
        songlink_data: Some(identified.platform_ids),
        ..Default::default()
    })
}

/// Acquire: obtain the lossless master
///
/// Uploads adopt the uploaded file as master; everything else goes through
/// the streaming-provider selection against the canonical master path.
pub async fn acquire(ctx: &StepContext, job: &Job) -> Result<JobUpdate, PipelineError> {
    if let Some(existing) = &job.master_audio_path {
        if Path::new(existing).exists() {
            tracing::debug!(job_id = %job.id, path = %existing, "Master already on disk, skipping");
            return Ok(JobUpdate::default());
        }
    }

    if job.source_type == SourceType::FileUpload {
        let upload_path = Path::new(&job.source_value);
        if !upload_path.exists() {
            return Err(PipelineError::MasterMissing(job.source_value.clone()));
        }

        let format = upload_path
            .extension()
            .map(|e| e.to_string_lossy().to_uppercase())
            .unwrap_or_else(|| "BIN".to_string());

        tracing::info!(job_id = %job.id, format = %format, "Using uploaded file as master");

        return Ok(JobUpdate {
            master_audio_path: Some(job.source_value.clone()),
            master_audio_format: Some(format),
            master_audio_service: Some("upload".to_string()),
            ..Default::default()
        });
    }

    let output_path = ctx.storage.master_path(job.id);
    let (service, download) = ctx.registry.acquire(job, &output_path).await?;

    tracing::info!(
        job_id = %job.id,
        service = %service,
        path = %download.path.display(),
        format = %download.format,
        quality = download.quality.as_deref().unwrap_or("unknown"),
        "Master acquired"
    );

    Ok(JobUpdate {
        master_audio_path: Some(download.path.to_string_lossy().to_string()),
        master_audio_format: Some(download.format),
        master_audio_service: Some(service),
        ..Default::default()
    })
}

/// Separate: split the master into instrument stems and persist them as
/// assets
///
/// Idempotence policy: short-circuit when stem assets already exist for the
/// job. Delete-then-recreate was rejected because a later crash in the MIDI
/// step would orphan `midi_path`s into a recreated directory.
pub async fn separate(ctx: &StepContext, job: &Job) -> Result<JobUpdate, PipelineError> {
    let existing = db::assets::count_stem_assets(&ctx.db, job.id).await?;
    if existing > 0 {
        tracing::debug!(job_id = %job.id, existing, "Stem assets already present, skipping");
        return Ok(JobUpdate::default());
    }

    let master_path = job
        .master_audio_path
        .as_deref()
        .ok_or_else(|| PipelineError::MasterMissing("no master audio recorded".to_string()))?;
    let master_path = Path::new(master_path);
    if !master_path.exists() {
        return Err(PipelineError::MasterMissing(
            master_path.display().to_string(),
        ));
    }

    let output_dir = ctx.storage.stems_dir(job.id);
    let (provider, stems) = ctx.registry.separate(master_path, &output_dir).await?;

    tracing::info!(
        job_id = %job.id,
        provider = %provider,
        stems = stems.len(),
        "Stems separated"
    );

    // Vendors occasionally map two of their stem names onto one of ours;
    // keep the first so (job_id, stem_type) stays unique
    let mut seen = std::collections::HashSet::new();
    let expires_at = Some(Utc::now() + ctx.retention);
    for stem in stems {
        if !seen.insert(stem.stem_type) {
            tracing::warn!(
                job_id = %job.id,
                stem = stem.stem_type.as_str(),
                "Duplicate stem type from provider, keeping the first"
            );
            continue;
        }
        let asset = Asset::new_stem(
            job.id,
            stem.stem_type,
            stem.file_path.to_string_lossy().to_string(),
            stem.file_size,
            &provider,
            expires_at,
        );
        db::assets::insert_asset(&ctx.db, &asset).await?;
    }

    Ok(JobUpdate::default())
}

/// Generate MIDI: transcribe each tonal stem
///
/// Per-stem failures are tolerated; the step only fails when the job has no
/// stems at all.
pub async fn generate_midi(ctx: &StepContext, job: &Job) -> Result<JobUpdate, PipelineError> {
    let assets = db::assets::load_assets_for_job(&ctx.db, job.id).await?;
    if assets.is_empty() {
        return Err(PipelineError::NoStems);
    }

    let output_dir = ctx.storage.midi_dir(job.id);
    let mut transcribed = 0usize;
    let mut skipped = 0usize;

    for asset in &assets {
        if !asset.stem_type.is_tonal() {
            skipped += 1;
            continue;
        }
        if asset.has_midi {
            tracing::debug!(job_id = %job.id, stem = asset.stem_type.as_str(), "MIDI already present, skipping");
            continue;
        }

        match ctx
            .registry
            .generate_midi(Path::new(&asset.file_path), &output_dir, asset.stem_type)
            .await
        {
            Ok((provider, midi)) => {
                db::assets::set_midi(&ctx.db, asset.id, &midi.midi_path.to_string_lossy())
                    .await?;
                transcribed += 1;
                tracing::info!(
                    job_id = %job.id,
                    stem = asset.stem_type.as_str(),
                    provider = %provider,
                    "Stem transcribed to MIDI"
                );
            }
            Err(e) => {
                // Not terminal; the job completes with has_midi=false here
                tracing::warn!(
                    job_id = %job.id,
                    stem = asset.stem_type.as_str(),
                    error = %e,
                    "MIDI transcription failed for stem"
                );
            }
        }
    }

    tracing::info!(job_id = %job.id, transcribed, skipped, "MIDI step finished");

    Ok(JobUpdate::default())
}
