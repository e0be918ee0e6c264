//! Audio upload endpoint
//!
//! Multipart uploads land in `{storage}/uploads/` and become `file_upload`
//! jobs. Validation (extension whitelist, content sniffing, size cap)
//! happens before any job row is created.

use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use uuid::Uuid;

use super::jobs::CreateJobResponse;
use crate::{
    db,
    error::{ApiError, ApiResult},
    models::{Job, SourceType},
    AppState,
};

/// 100 MiB upload cap
pub const MAX_UPLOAD_BYTES: usize = 100 * 1024 * 1024;

const ALLOWED_EXTENSIONS: [&str; 6] = ["mp3", "wav", "flac", "m4a", "aac", "ogg"];

/// POST /jobs/upload
///
/// Multipart form with an `audio` file field and optional `title`, `artist`,
/// `album` text fields.
pub async fn upload_audio(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<(StatusCode, Json<CreateJobResponse>)> {
    let mut audio: Option<(String, Vec<u8>)> = None;
    let mut title: Option<String> = None;
    let mut artist: Option<String> = None;
    let mut album: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("malformed multipart body: {}", e)))?
    {
        match field.name().unwrap_or_default() {
            "audio" => {
                let file_name = field
                    .file_name()
                    .map(str::to_string)
                    .ok_or_else(|| ApiError::BadRequest("audio field needs a filename".into()))?;
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("failed to read upload: {}", e)))?;
                audio = Some((file_name, data.to_vec()));
            }
            "title" => title = read_text_field(field).await?,
            "artist" => artist = read_text_field(field).await?,
            "album" => album = read_text_field(field).await?,
            _ => {}
        }
    }

    let (file_name, data) = audio
        .ok_or_else(|| ApiError::BadRequest("missing 'audio' file field".to_string()))?;

    let extension = validate_upload(&file_name, &data)?;

    let upload_id = Uuid::new_v4();
    let upload_path = state.storage.upload_path(upload_id, &extension);
    tokio::fs::create_dir_all(state.storage.uploads_dir()).await?;
    tokio::fs::write(&upload_path, &data).await?;

    let mut job = Job::new(
        SourceType::FileUpload,
        upload_path.to_string_lossy().to_string(),
    );
    job.metadata.title = title;
    job.metadata.artist = artist;
    job.metadata.album = album;

    db::jobs::insert_job(&state.db, &job).await?;

    tracing::info!(
        job_id = %job.id,
        file = %file_name,
        size = data.len(),
        "Upload accepted, job created"
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

async fn read_text_field(field: axum::extract::multipart::Field<'_>) -> ApiResult<Option<String>> {
    let text = field
        .text()
        .await
        .map_err(|e| ApiError::BadRequest(format!("malformed text field: {}", e)))?;
    Ok(Some(text).filter(|t| !t.trim().is_empty()))
}

/// Whitelist the extension, sniff the content, enforce the size cap.
/// Returns the lowercased extension.
fn validate_upload(file_name: &str, data: &[u8]) -> ApiResult<String> {
    if data.is_empty() {
        return Err(ApiError::BadRequest("uploaded file is empty".to_string()));
    }
    if data.len() > MAX_UPLOAD_BYTES {
        return Err(ApiError::BadRequest(format!(
            "file exceeds the {} MiB upload limit",
            MAX_UPLOAD_BYTES / (1024 * 1024)
        )));
    }

    let extension = std::path::Path::new(file_name)
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .ok_or_else(|| ApiError::BadRequest("file has no extension".to_string()))?;

    if !ALLOWED_EXTENSIONS.contains(&extension.as_str()) {
        return Err(ApiError::BadRequest(format!(
            "unsupported file type '.{}'; allowed: {}",
            extension,
            ALLOWED_EXTENSIONS.join(", ")
        )));
    }

    // A confident sniff that is neither audio nor an mp4-family container
    // (m4a/aac report as video under some matchers) means a spoofed extension
    if let Some(kind) = infer::get(data) {
        let matcher = kind.matcher_type();
        if matcher != infer::MatcherType::Audio && matcher != infer::MatcherType::Video {
            return Err(ApiError::BadRequest(format!(
                "file content ({}) does not look like audio",
                kind.mime_type()
            )));
        }
    }

    Ok(extension)
}

/// Build upload routes with the body-size cap applied
pub fn upload_routes() -> Router<AppState> {
    Router::new()
        .route("/jobs/upload", post(upload_audio))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES + 1024 * 1024))
}
