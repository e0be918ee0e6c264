//! Provider abstraction layer
//!
//! Four capability interfaces, each with multiple interchangeable
//! implementations behind a uniform trait:
//!
//! - [`TrackIdentifier`]: source reference to canonical track metadata
//! - [`StreamingProvider`]: ISRC or track ID to lossless master download
//! - [`StemProvider`]: master to separated instrument stems
//! - [`MidiProvider`]: tonal stem to MIDI transcription
//!
//! All methods are idempotent and retry-safe; a provider that errors is a
//! miss for that job, never a global disable.

pub mod apple_music;
pub mod basic_pitch;
pub mod deezer;
pub mod fadr;
pub mod lalal;
pub mod qobuz;
pub mod registry;
pub mod songlink;
pub mod spotify;
pub mod tidal;

pub use registry::ProviderRegistry;

use crate::models::{PlatformIds, SourceType, StemType};
use std::path::Path;
use thiserror::Error;

/// Errors surfaced by provider implementations
///
/// The selection algorithms treat most of these as misses; only the registry
/// decides when a failure becomes terminal for the job.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Rate limit exceeded")]
    RateLimited,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Process error: {0}")]
    Process(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProviderError {
    pub(crate) fn network(e: reqwest::Error) -> Self {
        ProviderError::Network(e.to_string())
    }
}

/// Credential pair handed to `configure`; sourced from environment variables
/// or the persisted `provider_configs` row.
#[derive(Debug, Clone, Default)]
pub struct ProviderCredentials {
    pub api_key: Option<String>,
    pub api_secret: Option<String>,
}

impl ProviderCredentials {
    pub fn new(api_key: impl Into<String>, api_secret: impl Into<String>) -> Self {
        Self {
            api_key: Some(api_key.into()),
            api_secret: Some(api_secret.into()),
        }
    }

    pub fn key_only(api_key: impl Into<String>) -> Self {
        Self {
            api_key: Some(api_key.into()),
            api_secret: None,
        }
    }
}

/// Canonical metadata produced by an identifier
#[derive(Debug, Clone, Default)]
pub struct IdentifiedTrack {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub album_art: Option<String>,
    pub duration_seconds: Option<f64>,
    pub isrc: Option<String>,
    pub spotify_id: Option<String>,
    /// Cross-platform IDs discovered along the way
    pub platform_ids: PlatformIds,
}

/// Track metadata from a streaming catalog
#[derive(Debug, Clone)]
pub struct TrackInfo {
    pub id: String,
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub duration_seconds: Option<f64>,
    pub isrc: Option<String>,
}

/// Result of a successful master download
#[derive(Debug, Clone)]
pub struct DownloadedTrack {
    pub path: std::path::PathBuf,
    /// Container format, uppercased (`FLAC`, `WAV`, ...)
    pub format: String,
    /// Provider-reported quality label, e.g. `LOSSLESS`
    pub quality: Option<String>,
}

/// One stem returned by a separation provider
#[derive(Debug, Clone)]
pub struct SeparatedStem {
    pub stem_type: StemType,
    pub file_path: std::path::PathBuf,
    pub file_size: i64,
}

/// One MIDI transcription returned by a MIDI provider
#[derive(Debug, Clone)]
pub struct GeneratedMidi {
    pub midi_path: std::path::PathBuf,
    pub file_size: i64,
}

/// Resolves a source reference to canonical track metadata
///
/// The registry tries only the implementation whose capability matches the
/// input's source type.
#[async_trait::async_trait]
pub trait TrackIdentifier: Send + Sync {
    /// Service name for logging and provenance
    fn name(&self) -> &'static str;

    /// Whether this identifier understands the given source type
    fn handles(&self, source_type: SourceType) -> bool;

    /// Install credentials; called once while the registry is being built
    fn configure(&mut self, credentials: ProviderCredentials);

    /// Resolve the reference; `Ok(None)` means cleanly not found
    async fn identify(
        &self,
        source_type: SourceType,
        source_value: &str,
    ) -> Result<Option<IdentifiedTrack>, ProviderError>;
}

/// Acquires lossless masters from a streaming catalog
#[async_trait::async_trait]
pub trait StreamingProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Static fallback order; lower is tried first
    fn priority(&self) -> u8;

    /// Credential presence gate; unconfigured providers cannot download
    fn is_configured(&self) -> bool;

    /// Whether `search_by_isrc` works without credentials (ID resolution
    /// only, never a download path)
    fn supports_public_search(&self) -> bool {
        false
    }

    fn configure(&mut self, credentials: ProviderCredentials);

    /// Resolve an ISRC to this catalog's native track ID
    async fn search_by_isrc(&self, isrc: &str) -> Result<Option<String>, ProviderError>;

    /// Fetch catalog metadata for a native track ID
    async fn get_track_info(&self, track_id: &str) -> Result<TrackInfo, ProviderError>;

    /// Download the track to `output_path` in the best available quality
    async fn download_track(
        &self,
        track_id: &str,
        output_path: &Path,
    ) -> Result<DownloadedTrack, ProviderError>;
}

/// Splits a mixed recording into instrument stems
///
/// Each implementation owns its vendor's upload/poll/download protocol,
/// encapsulated behind the single method.
#[async_trait::async_trait]
pub trait StemProvider: Send + Sync {
    fn name(&self) -> &'static str;

    fn is_configured(&self) -> bool;

    fn configure(&mut self, credentials: ProviderCredentials);

    async fn separate(
        &self,
        audio_path: &Path,
        output_dir: &Path,
    ) -> Result<Vec<SeparatedStem>, ProviderError>;
}

/// Transcribes a tonal stem to MIDI
#[async_trait::async_trait]
pub trait MidiProvider: Send + Sync {
    fn name(&self) -> &'static str;

    fn is_configured(&self) -> bool;

    fn configure(&mut self, credentials: ProviderCredentials);

    async fn generate(
        &self,
        audio_path: &Path,
        output_dir: &Path,
        stem_type: StemType,
    ) -> Result<GeneratedMidi, ProviderError>;
}

/// Fixed inter-poll delay for vendor job polling (upload → poll → download)
pub(crate) const POLL_INTERVAL: std::time::Duration = std::time::Duration::from_secs(2);

/// Attempt cap for vendor job polling; 150 × 2 s = 5 minutes
pub(crate) const MAX_POLL_ATTEMPTS: u32 = 150;

/// Stream an HTTP response body to a file, creating parent directories
pub(crate) async fn download_to_file(
    response: reqwest::Response,
    output_path: &Path,
) -> Result<u64, ProviderError> {
    use futures::StreamExt;
    use tokio::io::AsyncWriteExt;

    if let Some(parent) = output_path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let mut file = tokio::fs::File::create(output_path).await?;
    let mut stream = response.bytes_stream();
    let mut written: u64 = 0;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(ProviderError::network)?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;

    Ok(written)
}
