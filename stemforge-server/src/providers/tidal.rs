//! Tidal acquisition provider
//!
//! OAuth client-credentials auth against the Tidal open API. Playback
//! manifests arrive base64-encoded; the first manifest URL is streamed to the
//! output path.

use super::{
    download_to_file, DownloadedTrack, ProviderCredentials, ProviderError, StreamingProvider,
    TrackInfo,
};
use base64::Engine;
use serde::Deserialize;
use std::path::Path;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

const TIDAL_AUTH_URL: &str = "https://auth.tidal.com/v1/oauth2/token";
const TIDAL_API_BASE_URL: &str = "https://openapi.tidal.com/v2";
const COUNTRY_CODE: &str = "US";

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
struct TracksResponse {
    data: Vec<TrackResource>,
}

#[derive(Debug, Deserialize)]
struct TrackResource {
    id: String,
    attributes: Option<TrackAttributes>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TrackAttributes {
    title: Option<String>,
    isrc: Option<String>,
    duration: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaybackInfo {
    audio_quality: Option<String>,
    manifest: String,
}

#[derive(Debug, Deserialize)]
struct Manifest {
    urls: Vec<String>,
}

struct CachedToken {
    access_token: String,
    fetched_at: Instant,
    expires_in: Duration,
}

/// Tidal catalog + download client; first in the acquisition fallback order
pub struct TidalProvider {
    http_client: reqwest::Client,
    client_id: Option<String>,
    client_secret: Option<String>,
    token: Mutex<Option<CachedToken>>,
}

impl TidalProvider {
    pub fn new() -> Result<Self, ProviderError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(ProviderError::network)?;

        Ok(Self {
            http_client,
            client_id: None,
            client_secret: None,
            token: Mutex::new(None),
        })
    }

    async fn access_token(&self) -> Result<String, ProviderError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.fetched_at.elapsed() + Duration::from_secs(60) < token.expires_in {
                return Ok(token.access_token.clone());
            }
        }

        let (Some(client_id), Some(client_secret)) = (&self.client_id, &self.client_secret) else {
            return Err(ProviderError::NotConfigured("tidal".to_string()));
        };

        let response = self
            .http_client
            .post(TIDAL_AUTH_URL)
            .basic_auth(client_id, Some(client_secret))
            .form(&[("grant_type", "client_credentials")])
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

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;

        let access_token = token.access_token.clone();
        *cached = Some(CachedToken {
            access_token: token.access_token,
            fetched_at: Instant::now(),
            expires_in: Duration::from_secs(token.expires_in),
        });

        Ok(access_token)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
    ) -> Result<Option<T>, ProviderError> {
        let token = self.access_token().await?;
        let response = self
            .http_client
            .get(url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(ProviderError::network)?;

        let status = response.status();
        if status == 404 {
            return Ok(None);
        }
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
            .map(Some)
            .map_err(|e| ProviderError::Parse(e.to_string()))
    }
}

#[async_trait::async_trait]
impl StreamingProvider for TidalProvider {
    fn name(&self) -> &'static str {
        "tidal"
    }

    fn priority(&self) -> u8 {
        1
    }

    fn is_configured(&self) -> bool {
        self.client_id.is_some() && self.client_secret.is_some()
    }

    fn configure(&mut self, credentials: ProviderCredentials) {
        self.client_id = credentials.api_key;
        self.client_secret = credentials.api_secret;
    }

    async fn search_by_isrc(&self, isrc: &str) -> Result<Option<String>, ProviderError> {
        let url = format!(
            "{}/tracks?filter%5Bisrc%5D={}&countryCode={}",
            TIDAL_API_BASE_URL, isrc, COUNTRY_CODE
        );

        let tracks: Option<TracksResponse> = self.get_json(&url).await?;
        Ok(tracks.and_then(|t| t.data.into_iter().next().map(|r| r.id)))
    }

    async fn get_track_info(&self, track_id: &str) -> Result<TrackInfo, ProviderError> {
        let url = format!(
            "{}/tracks/{}?countryCode={}",
            TIDAL_API_BASE_URL, track_id, COUNTRY_CODE
        );

        let resource: Option<TrackResource> = self.get_json(&url).await?;
        let resource =
            resource.ok_or_else(|| ProviderError::NotFound(format!("tidal track {}", track_id)))?;

        let attributes = resource.attributes.unwrap_or(TrackAttributes {
            title: None,
            isrc: None,
            duration: None,
        });

        Ok(TrackInfo {
            id: resource.id,
            title: attributes.title,
            artist: None,
            album: None,
            duration_seconds: attributes.duration,
            isrc: attributes.isrc,
        })
    }

    async fn download_track(
        &self,
        track_id: &str,
        output_path: &Path,
    ) -> Result<DownloadedTrack, ProviderError> {
        let url = format!(
            "{}/tracks/{}/playbackinfo?audioquality=LOSSLESS&countryCode={}",
            TIDAL_API_BASE_URL, track_id, COUNTRY_CODE
        );

        let playback: Option<PlaybackInfo> = self.get_json(&url).await?;
        let playback = playback
            .ok_or_else(|| ProviderError::NotFound(format!("tidal playback for {}", track_id)))?;

        let manifest_bytes = base64::engine::general_purpose::STANDARD
            .decode(&playback.manifest)
            .map_err(|e| ProviderError::Parse(format!("manifest decode: {}", e)))?;
        let manifest: Manifest = serde_json::from_slice(&manifest_bytes)
            .map_err(|e| ProviderError::Parse(format!("manifest parse: {}", e)))?;

        let media_url = manifest
            .urls
            .first()
            .ok_or_else(|| ProviderError::Parse("manifest carries no URLs".to_string()))?;

        tracing::info!(track_id = %track_id, "Downloading master from Tidal");

        let response = self
            .http_client
            .get(media_url)
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
            format: "FLAC".to_string(),
            quality: playback.audio_quality,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_is_first() {
        let provider = TidalProvider::new().unwrap();
        assert_eq!(provider.priority(), 1);
        assert!(!provider.is_configured());
        assert!(!provider.supports_public_search());
    }

    #[test]
    fn test_manifest_decoding() {
        let manifest_json = r#"{"urls": ["https://sp-ad-cf.audio.tidal.com/x.flac"]}"#;
        let encoded = base64::engine::general_purpose::STANDARD.encode(manifest_json);
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .unwrap();
        let manifest: Manifest = serde_json::from_slice(&decoded).unwrap();
        assert_eq!(manifest.urls.len(), 1);
    }
}
