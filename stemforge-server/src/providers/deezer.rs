//! Deezer acquisition provider
//!
//! Search runs against the public API with no credentials, so Deezer serves
//! as the no-auth ID-resolution fallback even when downloads are not
//! configured. Downloads require an ARL token.

use super::{
    download_to_file, DownloadedTrack, ProviderCredentials, ProviderError, StreamingProvider,
    TrackInfo,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

const DEEZER_API_BASE_URL: &str = "https://api.deezer.com";
const DEEZER_MEDIA_URL: &str = "https://media.deezer.com/v1/get_url";

#[derive(Debug, Deserialize)]
struct DeezerTrack {
    id: u64,
    title: Option<String>,
    isrc: Option<String>,
    duration: Option<f64>,
    track_token: Option<String>,
    artist: Option<DeezerArtist>,
    album: Option<DeezerAlbum>,
}

#[derive(Debug, Deserialize)]
struct DeezerArtist {
    name: String,
}

#[derive(Debug, Deserialize)]
struct DeezerAlbum {
    title: Option<String>,
}

#[derive(Debug, Serialize)]
struct MediaRequest<'a> {
    license_token: &'a str,
    track_tokens: Vec<&'a str>,
    media: Vec<MediaFormat>,
}

#[derive(Debug, Serialize)]
struct MediaFormat {
    #[serde(rename = "type")]
    media_type: &'static str,
    formats: Vec<FormatSpec>,
}

#[derive(Debug, Serialize)]
struct FormatSpec {
    cipher: &'static str,
    format: &'static str,
}

#[derive(Debug, Deserialize)]
struct MediaResponse {
    data: Vec<MediaEntry>,
}

#[derive(Debug, Deserialize)]
struct MediaEntry {
    media: Vec<MediaSource>,
}

#[derive(Debug, Deserialize)]
struct MediaSource {
    format: Option<String>,
    sources: Vec<SourceUrl>,
}

#[derive(Debug, Deserialize)]
struct SourceUrl {
    url: String,
}

/// Deezer catalog + download client; second in the acquisition fallback order
pub struct DeezerProvider {
    http_client: reqwest::Client,
    arl_token: Option<String>,
}

impl DeezerProvider {
    pub fn new() -> Result<Self, ProviderError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(ProviderError::network)?;

        Ok(Self {
            http_client,
            arl_token: None,
        })
    }

    async fn fetch_track(&self, path: &str) -> Result<Option<DeezerTrack>, ProviderError> {
        let url = format!("{}/track/{}", DEEZER_API_BASE_URL, path);
        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(ProviderError::network)?;

        if !response.status().is_success() {
            let status = response.status();
            let message = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body = response.text().await.map_err(ProviderError::network)?;

        // Misses come back as 200 with an error object
        if body.contains("\"error\"") {
            return Ok(None);
        }

        serde_json::from_str(&body)
            .map(Some)
            .map_err(|e| ProviderError::Parse(e.to_string()))
    }
}

#[async_trait::async_trait]
impl StreamingProvider for DeezerProvider {
    fn name(&self) -> &'static str {
        "deezer"
    }

    fn priority(&self) -> u8 {
        2
    }

    fn is_configured(&self) -> bool {
        self.arl_token.is_some()
    }

    fn supports_public_search(&self) -> bool {
        true
    }

    fn configure(&mut self, credentials: ProviderCredentials) {
        self.arl_token = credentials.api_key;
    }

    async fn search_by_isrc(&self, isrc: &str) -> Result<Option<String>, ProviderError> {
        let track = self.fetch_track(&format!("isrc:{}", isrc)).await?;
        Ok(track.map(|t| t.id.to_string()))
    }

    async fn get_track_info(&self, track_id: &str) -> Result<TrackInfo, ProviderError> {
        let track = self
            .fetch_track(track_id)
            .await?
            .ok_or_else(|| ProviderError::NotFound(format!("deezer track {}", track_id)))?;

        Ok(TrackInfo {
            id: track.id.to_string(),
            title: track.title,
            artist: track.artist.map(|a| a.name),
            album: track.album.and_then(|a| a.title),
            duration_seconds: track.duration,
            isrc: track.isrc,
        })
    }

    async fn download_track(
        &self,
        track_id: &str,
        output_path: &Path,
    ) -> Result<DownloadedTrack, ProviderError> {
        let Some(arl_token) = &self.arl_token else {
            return Err(ProviderError::NotConfigured("deezer".to_string()));
        };

        let track = self
            .fetch_track(track_id)
            .await?
            .ok_or_else(|| ProviderError::NotFound(format!("deezer track {}", track_id)))?;
        let track_token = track
            .track_token
            .ok_or_else(|| ProviderError::Parse("track carries no media token".to_string()))?;

        let request = MediaRequest {
            license_token: arl_token,
            track_tokens: vec![track_token.as_str()],
            media: vec![MediaFormat {
                media_type: "FULL",
                formats: vec![FormatSpec {
                    cipher: "NONE",
                    format: "FLAC",
                }],
            }],
        };

        let response = self
            .http_client
            .post(DEEZER_MEDIA_URL)
            .json(&request)
            .send()
            .await
            .map_err(ProviderError::network)?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let media: MediaResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;

        let source = media
            .data
            .first()
            .and_then(|entry| entry.media.first())
            .ok_or_else(|| ProviderError::Parse("no media sources returned".to_string()))?;
        let url = source
            .sources
            .first()
            .map(|s| s.url.clone())
            .ok_or_else(|| ProviderError::Parse("empty media source list".to_string()))?;
        let format = source
            .format
            .clone()
            .unwrap_or_else(|| "FLAC".to_string());

        tracing::info!(track_id = %track_id, "Downloading master from Deezer");

        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(ProviderError::network)?;
        if !response.status().is_success() {
            return Err(ProviderError::Api {
                status: response.status().as_u16(),
                message: "media download failed".to_string(),
            });
        }

        download_to_file(response, output_path).await?;

        Ok(DownloadedTrack {
            path: output_path.to_path_buf(),
            format,
            quality: Some("LOSSLESS".to_string()),
        })
    }
}
