//! Spotify track lookup (client-credentials flow)

use super::{IdentifiedTrack, ProviderCredentials, ProviderError, TrackIdentifier};
use crate::models::{PlatformIds, SourceType};
use base64::Engine;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

const SPOTIFY_TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
const SPOTIFY_API_BASE_URL: &str = "https://api.spotify.com/v1";

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
struct SpotifyTrack {
    id: String,
    name: String,
    duration_ms: Option<u64>,
    artists: Vec<SpotifyArtist>,
    album: Option<SpotifyAlbum>,
    external_ids: Option<SpotifyExternalIds>,
}

#[derive(Debug, Deserialize)]
struct SpotifyArtist {
    name: String,
}

#[derive(Debug, Deserialize)]
struct SpotifyAlbum {
    name: Option<String>,
    images: Vec<SpotifyImage>,
}

#[derive(Debug, Deserialize)]
struct SpotifyImage {
    url: String,
}

#[derive(Debug, Deserialize)]
struct SpotifyExternalIds {
    isrc: Option<String>,
}

struct CachedToken {
    access_token: String,
    fetched_at: Instant,
    expires_in: Duration,
}

impl CachedToken {
    fn is_fresh(&self) -> bool {
        // Refresh a minute early to avoid using a token at its expiry edge
        self.fetched_at.elapsed() + Duration::from_secs(60) < self.expires_in
    }
}

/// Spotify catalog lookup for `spotify_id` sources
pub struct SpotifyLookup {
    http_client: reqwest::Client,
    client_id: Option<String>,
    client_secret: Option<String>,
    token: Mutex<Option<CachedToken>>,
}

impl SpotifyLookup {
    pub fn new() -> Result<Self, ProviderError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(ProviderError::network)?;

        Ok(Self {
            http_client,
            client_id: None,
            client_secret: None,
            token: Mutex::new(None),
        })
    }

    fn is_configured(&self) -> bool {
        self.client_id.is_some() && self.client_secret.is_some()
    }

    async fn access_token(&self) -> Result<String, ProviderError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.is_fresh() {
                return Ok(token.access_token.clone());
            }
        }

        let (Some(client_id), Some(client_secret)) = (&self.client_id, &self.client_secret) else {
            return Err(ProviderError::NotConfigured("spotify".to_string()));
        };

        let basic = base64::engine::general_purpose::STANDARD
            .encode(format!("{}:{}", client_id, client_secret));

        let response = self
            .http_client
            .post(SPOTIFY_TOKEN_URL)
            .header("Authorization", format!("Basic {}", basic))
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
}

#[async_trait::async_trait]
impl TrackIdentifier for SpotifyLookup {
    fn name(&self) -> &'static str {
        "spotify"
    }

    fn handles(&self, source_type: SourceType) -> bool {
        source_type == SourceType::SpotifyId
    }

    fn configure(&mut self, credentials: ProviderCredentials) {
        self.client_id = credentials.api_key;
        self.client_secret = credentials.api_secret;
    }

    async fn identify(
        &self,
        _source_type: SourceType,
        source_value: &str,
    ) -> Result<Option<IdentifiedTrack>, ProviderError> {
        if !self.is_configured() {
            return Err(ProviderError::NotConfigured("spotify".to_string()));
        }

        let token = self.access_token().await?;
        let url = format!("{}/tracks/{}", SPOTIFY_API_BASE_URL, source_value);

        tracing::debug!(spotify_id = %source_value, "Looking up Spotify track");

        let response = self
            .http_client
            .get(&url)
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

        let track: SpotifyTrack = response
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;

        let isrc = track.external_ids.and_then(|ids| ids.isrc);
        Ok(Some(IdentifiedTrack {
            title: Some(track.name),
            artist: track.artists.into_iter().next().map(|a| a.name),
            album: track.album.as_ref().and_then(|a| a.name.clone()),
            album_art: track
                .album
                .and_then(|a| a.images.into_iter().next())
                .map(|i| i.url),
            duration_seconds: track.duration_ms.map(|ms| ms as f64 / 1000.0),
            isrc: isrc.clone(),
            spotify_id: Some(track.id.clone()),
            platform_ids: PlatformIds {
                spotify_id: Some(track.id),
                isrc,
                ..Default::default()
            },
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unconfigured_until_both_credentials_present() {
        let mut lookup = SpotifyLookup::new().unwrap();
        assert!(!lookup.is_configured());

        lookup.configure(ProviderCredentials::key_only("client-id"));
        assert!(!lookup.is_configured());

        lookup.configure(ProviderCredentials::new("client-id", "client-secret"));
        assert!(lookup.is_configured());
    }

    #[test]
    fn test_track_response_mapping() {
        let body = r#"{
            "id": "6y0igZArWVi6Iz0rj35c1Y",
            "name": "Teardrop",
            "duration_ms": 330000,
            "artists": [{"name": "Massive Attack"}],
            "album": {"name": "Mezzanine", "images": [{"url": "https://i.scdn.co/image/x"}]},
            "external_ids": {"isrc": "GBAAA9800322"}
        }"#;
        let track: SpotifyTrack = serde_json::from_str(body).unwrap();
        assert_eq!(track.name, "Teardrop");
        assert_eq!(track.duration_ms, Some(330_000));
        assert_eq!(
            track.external_ids.unwrap().isrc.as_deref(),
            Some("GBAAA9800322")
        );
    }
}
