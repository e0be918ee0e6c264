//! Job API handlers
//!
//! POST /jobs, GET /jobs, GET /jobs/{id}, GET /jobs/{id}/stems/{stem_type},
//! GET /jobs/{id}/download

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::Response,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio_util::io::ReaderStream;
use uuid::Uuid;

use crate::{
    db,
    error::{ApiError, ApiResult},
    models::{Job, JobStatus, SourceType, StemType},
    AppState,
};

const DEFAULT_LIST_LIMIT: i64 = 20;
const MAX_LIST_LIMIT: i64 = 100;

/// POST /jobs request
#[derive(Debug, Deserialize)]
pub struct CreateJobRequest {
    pub source_type: String,
    pub source_value: String,
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
}

/// POST /jobs response
#[derive(Debug, Serialize)]
pub struct CreateJobResponse {
    pub id: Uuid,
    pub status: JobStatus,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// GET /jobs query parameters
#[derive(Debug, Deserialize)]
pub struct ListJobsQuery {
    pub limit: Option<i64>,
}

/// GET /jobs response
#[derive(Debug, Serialize)]
pub struct ListJobsResponse {
    pub jobs: Vec<JobSummary>,
}

/// One row of the recent-jobs list
#[derive(Debug, Serialize)]
pub struct JobSummary {
    pub id: Uuid,
    pub status: JobStatus,
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub album_art: Option<String>,
    pub progress: u8,
    pub progress_message: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// GET /jobs/{id} response
#[derive(Debug, Serialize)]
pub struct JobDetailResponse {
    pub id: Uuid,
    pub status: JobStatus,
    pub progress: u8,
    pub progress_message: String,
    pub metadata: MetadataPayload,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_source: Option<AudioSourcePayload>,
    pub stems: Vec<StemSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<chrono::DateTime<chrono::Utc>>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Serialize)]
pub struct MetadataPayload {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub album_art: Option<String>,
    pub duration_seconds: Option<f64>,
    pub isrc: Option<String>,
    pub spotify_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AudioSourcePayload {
    pub format: Option<String>,
    pub service: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StemSummary {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub stem_type: StemType,
    pub has_midi: bool,
    pub file_size: i64,
}

/// GET /jobs/{id}/stems/{stem_type} query parameters
#[derive(Debug, Deserialize)]
pub struct StemDownloadQuery {
    pub format: Option<String>,
}

/// GET /jobs/{id}/download response
#[derive(Debug, Serialize)]
pub struct DownloadManifestResponse {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub files: Vec<DownloadFileEntry>,
}

#[derive(Debug, Serialize)]
pub struct DownloadFileEntry {
    #[serde(rename = "type")]
    pub stem_type: StemType,
    pub audio_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub midi_path: Option<String>,
}

/// POST /jobs
///
/// Creates the job row and hands it to the orchestrator exactly once; the
/// response returns before the pipeline starts.
pub async fn create_job(
    State(state): State<AppState>,
    Json(request): Json<CreateJobRequest>,
) -> ApiResult<(StatusCode, Json<CreateJobResponse>)> {
    let source_type = SourceType::parse(&request.source_type)
        .filter(|t| {
            matches!(
                t,
                SourceType::SpotifyUrl | SourceType::AudioUrl | SourceType::Isrc
            )
        })
        .ok_or_else(|| {
            ApiError::BadRequest(format!(
                "source_type must be one of spotify_url, audio_url, isrc (got '{}')",
                request.source_type
            ))
        })?;

    if request.source_value.trim().is_empty() {
        return Err(ApiError::BadRequest(
            "source_value must not be empty".to_string(),
        ));
    }

    let mut job = Job::new(source_type, request.source_value);
    job.metadata.title = request.title;
    job.metadata.artist = request.artist;
    job.metadata.album = request.album;

    db::jobs::insert_job(&state.db, &job).await?;

    tracing::info!(
        job_id = %job.id,
        source_type = source_type.as_str(),
        "Job created"
    );

    state.orchestrator.dispatch(job.id);

    Ok((
        StatusCode::CREATED,
        Json(CreateJobResponse {
            id: job.id,
            status: job.status,
            created_at: job.created_at,
        }),
    ))
}

/// GET /jobs?limit=N
pub async fn list_jobs(
    State(state): State<AppState>,
    Query(query): Query<ListJobsQuery>,
) -> ApiResult<Json<ListJobsResponse>> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_LIST_LIMIT)
        .clamp(1, MAX_LIST_LIMIT);

    let jobs = db::jobs::list_recent_jobs(&state.db, limit).await?;

    Ok(Json(ListJobsResponse {
        jobs: jobs
            .into_iter()
            .map(|job| JobSummary {
                id: job.id,
                status: job.status,
                title: job.metadata.title,
                artist: job.metadata.artist,
                album: job.metadata.album,
                album_art: job.metadata.album_art,
                progress: job.progress,
                progress_message: job.progress_message,
                created_at: job.created_at,
                updated_at: job.updated_at,
            })
            .collect(),
    }))
}

/// GET /jobs/{id}
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> ApiResult<Json<JobDetailResponse>> {
    let job = load_job_or_404(&state, job_id).await?;
    let assets = db::assets::load_assets_for_job(&state.db, job_id).await?;

    let audio_source = if job.master_audio_path.is_some() {
        Some(AudioSourcePayload {
            format: job.master_audio_format.clone(),
            service: job.master_audio_service.clone(),
        })
    } else {
        None
    };

    Ok(Json(JobDetailResponse {
        id: job.id,
        status: job.status,
        progress: job.progress,
        progress_message: job.progress_message,
        metadata: MetadataPayload {
            title: job.metadata.title,
            artist: job.metadata.artist,
            album: job.metadata.album,
            album_art: job.metadata.album_art,
            duration_seconds: job.metadata.duration_seconds,
            isrc: job.metadata.isrc,
            spotify_id: job.metadata.spotify_id,
        },
        audio_source,
        stems: assets
            .into_iter()
            .map(|asset| StemSummary {
                id: asset.id,
                stem_type: asset.stem_type,
                has_midi: asset.has_midi,
                file_size: asset.file_size,
            })
            .collect(),
        error: job.error_message,
        expires_at: job.expires_at,
        created_at: job.created_at,
        updated_at: job.updated_at,
    }))
}

/// GET /jobs/{id}/stems/{stem_type}?format=audio|midi
///
/// Streams the stem audio or its MIDI transcription as an attachment.
pub async fn download_stem(
    State(state): State<AppState>,
    Path((job_id, stem_name)): Path<(Uuid, String)>,
    Query(query): Query<StemDownloadQuery>,
) -> ApiResult<Response> {
    let job = load_job_or_404(&state, job_id).await?;

    if job.status != JobStatus::Completed {
        return Err(ApiError::BadRequest(format!(
            "job is not completed (status: {})",
            job.status.as_str()
        )));
    }

    let stem_type = StemType::parse(&stem_name)
        .ok_or_else(|| ApiError::BadRequest(format!("unknown stem type '{}'", stem_name)))?;

    let asset = db::assets::load_stem_asset(&state.db, job_id, stem_type)
        .await?
        .ok_or_else(|| {
            ApiError::NotFound(format!("no {} stem for job {}", stem_type.as_str(), job_id))
        })?;

    let format = query.format.as_deref().unwrap_or("audio");
    let (file_path, content_type, extension) = match format {
        "audio" => (asset.file_path.clone(), "audio/wav", "wav"),
        "midi" => {
            let midi_path = asset.midi_path.clone().ok_or_else(|| {
                ApiError::NotFound(format!(
                    "no MIDI transcription for {} stem",
                    stem_type.as_str()
                ))
            })?;
            (midi_path, "audio/midi", "mid")
        }
        other => {
            return Err(ApiError::BadRequest(format!(
                "format must be 'audio' or 'midi' (got '{}')",
                other
            )))
        }
    };

    let file = tokio::fs::File::open(&file_path).await.map_err(|_| {
        ApiError::NotFound(format!("stem file missing on disk: {}", file_path))
    })?;

    let filename = format!(
        "{}_{}.{}",
        sanitize_filename(job.metadata.title.as_deref().unwrap_or("track")),
        stem_type.as_str(),
        extension
    );

    let stream = ReaderStream::new(file);
    let response = Response::builder()
        .header(header::CONTENT_TYPE, content_type)
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", filename),
        )
        .body(Body::from_stream(stream))
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    Ok(response)
}

/// GET /jobs/{id}/download
///
/// Path manifest for a client-side bulk download.
pub async fn download_manifest(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> ApiResult<Json<DownloadManifestResponse>> {
    let job = load_job_or_404(&state, job_id).await?;
    let assets = db::assets::load_assets_for_job(&state.db, job_id).await?;

    Ok(Json(DownloadManifestResponse {
        title: job.metadata.title,
        artist: job.metadata.artist,
        files: assets
            .into_iter()
            .map(|asset| DownloadFileEntry {
                stem_type: asset.stem_type,
                audio_path: asset.file_path,
                midi_path: asset.midi_path,
            })
            .collect(),
    }))
}

async fn load_job_or_404(state: &AppState, job_id: Uuid) -> ApiResult<Job> {
    db::jobs::load_job(&state.db, job_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Job not found: {}", job_id)))
}

/// Keep alphanumerics, dashes and underscores; everything else becomes `_`
fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Build job routes
pub fn job_routes() -> Router<AppState> {
    Router::new()
        .route("/jobs", post(create_job).get(list_jobs))
        .route("/jobs/:job_id", get(get_job))
        .route("/jobs/:job_id/stems/:stem_type", get(download_stem))
        .route("/jobs/:job_id/download", get(download_manifest))
}
