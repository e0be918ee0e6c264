//! stemforge-server library interface
//!
//! Exposes the application state, router construction, and all modules for
//! integration testing.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod providers;
pub mod reaper;
pub mod services;
pub mod storage;

pub use crate::error::{ApiError, ApiResult};

use crate::pipeline::JobOrchestrator;
use crate::services::{AcrCloudClient, LlmClient, MusicBrainzClient};
use crate::storage::Storage;
use axum::http::HeaderValue;
use axum::Router;
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    /// Object storage layout
    pub storage: Storage,
    /// Pipeline state machine; handlers only ever call `dispatch`
    pub orchestrator: Arc<JobOrchestrator>,
    /// MusicBrainz search client (always available, no credentials)
    pub musicbrainz: Arc<MusicBrainzClient>,
    /// LLM gateway for text search, when configured
    pub llm: Option<Arc<LlmClient>>,
    /// ACRCloud humming recognition, when configured
    pub acrcloud: Option<Arc<AcrCloudClient>>,
    /// Allowed CORS origin; None = permissive
    pub cors_origin: Option<String>,
}

/// Build application router
///
/// All routes live under `/api`:
/// - GET  /api/health
/// - POST /api/jobs, GET /api/jobs, GET /api/jobs/{id}
/// - POST /api/jobs/upload
/// - GET  /api/jobs/{id}/stems/{stem_type}, GET /api/jobs/{id}/download
/// - POST /api/search/text, POST /api/search/humming,
///   GET  /api/search/musicbrainz
pub fn build_router(state: AppState) -> Router {
    let cors = match state
        .cors_origin
        .as_deref()
        .and_then(|origin| origin.parse::<HeaderValue>().ok())
    {
        Some(origin) => CorsLayer::new()
            .allow_origin(AllowOrigin::exact(origin))
            .allow_methods(tower_http::cors::Any)
            .allow_headers(tower_http::cors::Any),
        None => CorsLayer::permissive(),
    };

    let api = Router::new()
        .merge(api::health_routes())
        .merge(api::job_routes())
        .merge(api::upload_routes())
        .merge(api::search_routes());

    Router::new()
        .nest("/api", api)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
