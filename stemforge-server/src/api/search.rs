//! Search endpoints
//!
//! Auxiliary helpers that turn text, lyrics, or hummed audio into
//! suggestions the client can select and resubmit as a job.

use axum::{
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::{
    error::{ApiError, ApiResult},
    models::SongSuggestion,
    services::musicbrainz_client::MBError,
    AppState,
};

/// POST /search/text request
#[derive(Debug, Deserialize)]
pub struct TextSearchRequest {
    pub query: String,
    /// `title`, `lyrics`, or `description`
    #[serde(rename = "type", default)]
    pub query_type: Option<String>,
}

/// POST /search/humming request; exactly one of the fields must be present
#[derive(Debug, Deserialize)]
pub struct HummingSearchRequest {
    pub audio_path: Option<String>,
    /// Base64-encoded audio sample
    pub audio_buffer: Option<String>,
}

/// GET /search/musicbrainz query parameters
#[derive(Debug, Deserialize)]
pub struct MusicBrainzQuery {
    pub query: String,
    /// `recording` (default) or `artist`
    #[serde(rename = "type", default)]
    pub entity: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SuggestionsResponse {
    pub suggestions: Vec<SongSuggestion>,
}

/// POST /search/text
pub async fn text_search(
    State(state): State<AppState>,
    Json(request): Json<TextSearchRequest>,
) -> ApiResult<Json<SuggestionsResponse>> {
    if request.query.trim().is_empty() {
        return Err(ApiError::BadRequest("query must not be empty".to_string()));
    }

    let Some(llm) = &state.llm else {
        return Err(ApiError::ServiceUnavailable(
            "no LLM gateway configured for text search".to_string(),
        ));
    };

    let query_type = request.query_type.as_deref().unwrap_or("title");
    let suggestions = llm
        .suggest_songs(&request.query, query_type)
        .await
        .map_err(|e| match e {
            crate::services::llm_client::LlmError::RateLimited => {
                ApiError::RateLimited("LLM gateway quota exhausted".to_string())
            }
            other => ApiError::Internal(other.to_string()),
        })?;

    Ok(Json(SuggestionsResponse { suggestions }))
}

/// POST /search/humming
pub async fn humming_search(
    State(state): State<AppState>,
    Json(request): Json<HummingSearchRequest>,
) -> ApiResult<Json<SuggestionsResponse>> {
    let Some(acrcloud) = &state.acrcloud else {
        return Err(ApiError::ServiceUnavailable(
            "no humming recognition service configured".to_string(),
        ));
    };

    let result = match (&request.audio_path, &request.audio_buffer) {
        (Some(path), _) => acrcloud.identify_file(std::path::Path::new(path)).await,
        (None, Some(buffer)) => {
            let sample = base64::engine::general_purpose::STANDARD
                .decode(buffer)
                .map_err(|e| ApiError::BadRequest(format!("invalid base64 audio: {}", e)))?;
            acrcloud.identify(sample).await
        }
        (None, None) => {
            return Err(ApiError::BadRequest(
                "one of audio_path or audio_buffer is required".to_string(),
            ))
        }
    };

    let suggestions = result.map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(Json(SuggestionsResponse { suggestions }))
}

/// GET /search/musicbrainz?query=...&type=recording|artist
pub async fn musicbrainz_search(
    State(state): State<AppState>,
    Query(query): Query<MusicBrainzQuery>,
) -> ApiResult<Json<SuggestionsResponse>> {
    if query.query.trim().is_empty() {
        return Err(ApiError::BadRequest("query must not be empty".to_string()));
    }

    let entity = query.entity.as_deref().unwrap_or("recording");
    let suggestions = state
        .musicbrainz
        .search(&query.query, entity)
        .await
        .map_err(|e| match e {
            MBError::RateLimitExceeded => {
                ApiError::RateLimited("MusicBrainz rate limit exceeded".to_string())
            }
            other => ApiError::Internal(other.to_string()),
        })?;

    Ok(Json(SuggestionsResponse { suggestions }))
}

/// Build search routes
pub fn search_routes() -> Router<AppState> {
    Router::new()
        .route("/search/text", post(text_search))
        .route("/search/humming", post(humming_search))
        .route("/search/musicbrainz", get(musicbrainz_search))
}
