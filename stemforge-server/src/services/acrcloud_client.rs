//! ACRCloud humming recognition
//!
//! Uploads a hummed/sung audio sample to an ACRCloud project endpoint.
//! Requests are authenticated with an HMAC-SHA1 signature over the canonical
//! request string, as the ACRCloud identify protocol requires.

use crate::models::{SongSuggestion, SuggestionSource};
use base64::Engine;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha1::Sha1;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;

type HmacSha1 = Hmac<Sha1>;

const ENDPOINT_PATH: &str = "/v1/identify";
const DATA_TYPE: &str = "audio";
const SIGNATURE_VERSION: &str = "1";

/// ACRCloud client errors
#[derive(Debug, Error)]
pub enum AcrCloudError {
    #[error("Not configured")]
    NotConfigured,

    #[error("Network error: {0}")]
    Network(String),

    #[error("API error {0}: {1}")]
    Api(u16, String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Deserialize)]
struct IdentifyResponse {
    metadata: Option<IdentifyMetadata>,
}

#[derive(Debug, Deserialize)]
struct IdentifyMetadata {
    #[serde(default)]
    music: Vec<MusicResult>,
    #[serde(default)]
    humming: Vec<MusicResult>,
}

#[derive(Debug, Deserialize)]
struct MusicResult {
    title: String,
    score: Option<f64>,
    #[serde(default)]
    artists: Vec<ArtistResult>,
    album: Option<AlbumResult>,
    external_ids: Option<ExternalIds>,
    external_metadata: Option<ExternalMetadata>,
}

#[derive(Debug, Deserialize)]
struct ArtistResult {
    name: String,
}

#[derive(Debug, Deserialize)]
struct AlbumResult {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ExternalIds {
    isrc: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ExternalMetadata {
    spotify: Option<SpotifyMetadata>,
}

#[derive(Debug, Deserialize)]
struct SpotifyMetadata {
    track: Option<SpotifyTrackRef>,
}

#[derive(Debug, Deserialize)]
struct SpotifyTrackRef {
    id: Option<String>,
}

/// ACRCloud identify client
pub struct AcrCloudClient {
    http_client: reqwest::Client,
    host: String,
    access_key: String,
    access_secret: String,
}

impl AcrCloudClient {
    pub fn new(
        host: impl Into<String>,
        access_key: impl Into<String>,
        access_secret: impl Into<String>,
    ) -> Result<Self, AcrCloudError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| AcrCloudError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            host: host.into(),
            access_key: access_key.into(),
            access_secret: access_secret.into(),
        })
    }

    /// Identify a hummed sample from raw audio bytes
    pub async fn identify(&self, sample: Vec<u8>) -> Result<Vec<SongSuggestion>, AcrCloudError> {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| AcrCloudError::Network(e.to_string()))?
            .as_secs()
            .to_string();

        let signature = self.sign(&timestamp);
        let sample_bytes = sample.len().to_string();

        let form = reqwest::multipart::Form::new()
            .text("access_key", self.access_key.clone())
            .text("data_type", DATA_TYPE)
            .text("signature_version", SIGNATURE_VERSION)
            .text("signature", signature)
            .text("timestamp", timestamp)
            .text("sample_bytes", sample_bytes)
            .part(
                "sample",
                reqwest::multipart::Part::bytes(sample).file_name("sample.wav"),
            );

        let url = format!("https://{}{}", self.host, ENDPOINT_PATH);
        tracing::debug!(host = %self.host, "Identifying hummed sample via ACRCloud");

        let response = self
            .http_client
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| AcrCloudError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(AcrCloudError::Api(status.as_u16(), message));
        }

        let identified: IdentifyResponse = response
            .json()
            .await
            .map_err(|e| AcrCloudError::Parse(e.to_string()))?;

        let Some(metadata) = identified.metadata else {
            return Ok(Vec::new());
        };

        // Humming projects answer under `humming`, fingerprint projects under
        // `music`; accept either.
        let results = if metadata.humming.is_empty() {
            metadata.music
        } else {
            metadata.humming
        };

        Ok(results.into_iter().map(to_suggestion).collect())
    }

    /// Identify a hummed sample stored on disk
    pub async fn identify_file(&self, path: &std::path::Path) -> Result<Vec<SongSuggestion>, AcrCloudError> {
        let sample = tokio::fs::read(path).await?;
        self.identify(sample).await
    }

    /// HMAC-SHA1 over the canonical string, base64 encoded
    fn sign(&self, timestamp: &str) -> String {
        let string_to_sign = format!(
            "POST\n{}\n{}\n{}\n{}\n{}",
            ENDPOINT_PATH, self.access_key, DATA_TYPE, SIGNATURE_VERSION, timestamp
        );

        let mut mac = HmacSha1::new_from_slice(self.access_secret.as_bytes())
            .expect("HMAC accepts any key length");
        mac.update(string_to_sign.as_bytes());

        base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes())
    }
}

fn to_suggestion(result: MusicResult) -> SongSuggestion {
    let spotify_id = result
        .external_metadata
        .and_then(|m| m.spotify)
        .and_then(|s| s.track)
        .and_then(|t| t.id);

    SongSuggestion {
        id: uuid::Uuid::new_v4().to_string(),
        title: result.title,
        artist: result
            .artists
            .into_iter()
            .next()
            .map(|a| a.name)
            .unwrap_or_else(|| "Unknown".to_string()),
        album: result.album.and_then(|a| a.name),
        album_art: None,
        isrc: result.external_ids.and_then(|ids| ids.isrc),
        confidence: result.score.unwrap_or(0.0) / 100.0,
        source: SuggestionSource::Acrcloud,
        spotify_id,
        apple_music_id: None,
    }
    .with_clamped_confidence()
}
