//! Qobuz acquisition provider
//!
//! App-ID plus user-token auth. FLAC downloads request format 27 (24-bit up
//! to 192 kHz); Qobuz serves whatever the subscription allows.

use super::{
    download_to_file, DownloadedTrack, ProviderCredentials, ProviderError, StreamingProvider,
    TrackInfo,
};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

const QOBUZ_API_BASE_URL: &str = "https://www.qobuz.com/api.json/0.2";
const FLAC_FORMAT_ID: u32 = 27;

#[derive(Debug, Deserialize)]
struct SearchResponse {
    tracks: Option<TrackList>,
}

#[derive(Debug, Deserialize)]
struct TrackList {
    items: Vec<QobuzTrack>,
}

#[derive(Debug, Deserialize)]
struct QobuzTrack {
    id: u64,
    title: Option<String>,
    isrc: Option<String>,
    duration: Option<f64>,
    performer: Option<QobuzPerformer>,
    album: Option<QobuzAlbum>,
}

#[derive(Debug, Deserialize)]
struct QobuzPerformer {
    name: String,
}

#[derive(Debug, Deserialize)]
struct QobuzAlbum {
    title: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FileUrlResponse {
    url: Option<String>,
    mime_type: Option<String>,
}

/// Qobuz catalog + download client; third in the acquisition fallback order
pub struct QobuzProvider {
    http_client: reqwest::Client,
    app_id: Option<String>,
    user_token: Option<String>,
}

impl QobuzProvider {
    pub fn new() -> Result<Self, ProviderError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(ProviderError::network)?;

        Ok(Self {
            http_client,
            app_id: None,
            user_token: None,
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
    ) -> Result<T, ProviderError> {
        let (Some(app_id), Some(user_token)) = (&self.app_id, &self.user_token) else {
            return Err(ProviderError::NotConfigured("qobuz".to_string()));
        };

        let response = self
            .http_client
            .get(url)
            .header("X-App-Id", app_id)
            .header("X-User-Auth-Token", user_token)
            .send()
            .await
            .map_err(ProviderError::network)?;

        let status = response.status();
        if status == 429 {
            return Err(ProviderError::RateLimited);
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))
    }
}

#[async_trait::async_trait]
impl StreamingProvider for QobuzProvider {
    fn name(&self) -> &'static str {
        "qobuz"
    }

    fn priority(&self) -> u8 {
        3
    }

    fn is_configured(&self) -> bool {
        self.app_id.is_some() && self.user_token.is_some()
    }

    fn configure(&mut self, credentials: ProviderCredentials) {
        self.app_id = credentials.api_key;
        self.user_token = credentials.api_secret;
    }

    async fn search_by_isrc(&self, isrc: &str) -> Result<Option<String>, ProviderError> {
        let url = format!(
            "{}/track/search?query={}&limit=5",
            QOBUZ_API_BASE_URL, isrc
        );

        let results: SearchResponse = self.get_json(&url).await?;
        let items = results.tracks.map(|t| t.items).unwrap_or_default();

        // The search index matches loosely; require the exact ISRC
        Ok(items
            .into_iter()
            .find(|t| t.isrc.as_deref() == Some(isrc))
            .map(|t| t.id.to_string()))
    }

    async fn get_track_info(&self, track_id: &str) -> Result<TrackInfo, ProviderError> {
        let url = format!("{}/track/get?track_id={}", QOBUZ_API_BASE_URL, track_id);
        let track: QobuzTrack = self.get_json(&url).await?;

        Ok(TrackInfo {
            id: track.id.to_string(),
            title: track.title,
            artist: track.performer.map(|p| p.name),
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
        let url = format!(
            "{}/track/getFileUrl?track_id={}&format_id={}",
            QOBUZ_API_BASE_URL, track_id, FLAC_FORMAT_ID
        );

        let file_url: FileUrlResponse = self.get_json(&url).await?;
        let media_url = file_url
            .url
            .ok_or_else(|| ProviderError::NotFound(format!("qobuz stream for {}", track_id)))?;

        tracing::info!(track_id = %track_id, "Downloading master from Qobuz");

        let response = self
            .http_client
            .get(&media_url)
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

        let format = match file_url.mime_type.as_deref() {
            Some("audio/flac") | None => "FLAC".to_string(),
            Some(other) => other
                .rsplit('/')
                .next()
                .unwrap_or("FLAC")
                .to_uppercase(),
        };

        Ok(DownloadedTrack {
            path: output_path.to_path_buf(),
            format,
            quality: Some("LOSSLESS".to_string()),
        })
    }
}
