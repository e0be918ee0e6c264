//! stemforge-server - Stem & MIDI extraction backend
//!
//! Turns an audio reference (streaming URL, ISRC, platform track ID, or an
//! uploaded file) into canonical metadata, a lossless master, separated
//! instrument stems, and MIDI transcriptions of the tonal stems. Clients
//! poll jobs over HTTP and download the produced assets until the retention
//! window elapses.

use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use stemforge_server::config::{Cli, ServerConfig};
use stemforge_server::pipeline::JobOrchestrator;
use stemforge_server::providers::ProviderRegistry;
use stemforge_server::reaper::Reaper;
use stemforge_server::services::{AcrCloudClient, LlmClient, MusicBrainzClient};
use stemforge_server::storage::Storage;
use stemforge_server::{build_router, AppState};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = ServerConfig::load(&cli);

    info!("Starting stemforge-server");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!("Storage: {}", config.storage_dir.display());
    info!("Database: {}", config.database_path.display());

    // Storage roots and database
    let storage = Storage::new(&config.storage_dir);
    storage.bootstrap()?;

    let db = stemforge_common::db::init_database(&config.database_path).await?;
    info!("Database connection established");

    // Provider registry and orchestrator
    let registry = Arc::new(ProviderRegistry::from_config(db.clone(), &config).await);
    let orchestrator = Arc::new(JobOrchestrator::new(
        db.clone(),
        storage.clone(),
        registry,
        config.retention(),
    ));

    // Jobs that were mid-flight when the previous process exited
    let resumed = orchestrator.resume_incomplete().await?;
    if resumed > 0 {
        info!(resumed, "Re-dispatched incomplete jobs from previous run");
    }

    // Background reaper for expired jobs
    let reaper = Reaper::new(
        db.clone(),
        storage.clone(),
        std::time::Duration::from_secs(config.reaper_interval_secs),
    );
    reaper.spawn();
    info!(
        interval_secs = config.reaper_interval_secs,
        retention_hours = config.retention_hours,
        "Reaper scheduled"
    );

    // Search clients
    let musicbrainz = Arc::new(
        MusicBrainzClient::new().map_err(|e| anyhow::anyhow!("MusicBrainz client: {}", e))?,
    );
    let llm = match &config.llm_base_url {
        Some(base_url) => Some(Arc::new(
            LlmClient::new(
                base_url.clone(),
                config.llm_api_key.clone(),
                config.llm_model.clone(),
            )
            .map_err(|e| anyhow::anyhow!("LLM client: {}", e))?,
        )),
        None => {
            info!("No LLM gateway configured - text search disabled");
            None
        }
    };
    let acrcloud = match (
        &config.acrcloud_host,
        &config.acrcloud_access_key,
        &config.acrcloud_access_secret,
    ) {
        (Some(host), Some(key), Some(secret)) => Some(Arc::new(
            AcrCloudClient::new(host.clone(), key.clone(), secret.clone())
                .map_err(|e| anyhow::anyhow!("ACRCloud client: {}", e))?,
        )),
        _ => {
            info!("No ACRCloud credentials configured - humming search disabled");
            None
        }
    };

    let state = AppState {
        db,
        storage,
        orchestrator,
        musicbrainz,
        llm,
        acrcloud,
        cors_origin: config.cors_origin.clone(),
    };

    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port)).await?;
    info!("Listening on http://0.0.0.0:{}", config.port);
    info!("Health check: http://127.0.0.1:{}/api/health", config.port);

    axum::serve(listener, app).await?;

    Ok(())
}
