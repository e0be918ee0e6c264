//! Apple Music catalog lookup (developer-token auth)

use super::{IdentifiedTrack, ProviderCredentials, ProviderError, TrackIdentifier};
use crate::models::{PlatformIds, SourceType};
use serde::Deserialize;
use std::time::Duration;

const APPLE_MUSIC_API_BASE_URL: &str = "https://api.music.apple.com/v1";
const STOREFRONT: &str = "us";

#[derive(Debug, Deserialize)]
struct SongsResponse {
    data: Vec<Song>,
}

#[derive(Debug, Deserialize)]
struct Song {
    id: String,
    attributes: SongAttributes,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SongAttributes {
    name: String,
    artist_name: Option<String>,
    album_name: Option<String>,
    duration_in_millis: Option<u64>,
    isrc: Option<String>,
    artwork: Option<Artwork>,
}

#[derive(Debug, Deserialize)]
struct Artwork {
    url: String,
}

/// Apple Music lookup for `apple_music_id` sources
pub struct AppleMusicLookup {
    http_client: reqwest::Client,
    developer_token: Option<String>,
}

impl AppleMusicLookup {
    pub fn new() -> Result<Self, ProviderError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(ProviderError::network)?;

        Ok(Self {
            http_client,
            developer_token: None,
        })
    }
}

#[async_trait::async_trait]
impl TrackIdentifier for AppleMusicLookup {
    fn name(&self) -> &'static str {
        "apple_music"
    }

    fn handles(&self, source_type: SourceType) -> bool {
        source_type == SourceType::AppleMusicId
    }

    fn configure(&mut self, credentials: ProviderCredentials) {
        self.developer_token = credentials.api_key;
    }

    async fn identify(
        &self,
        _source_type: SourceType,
        source_value: &str,
    ) -> Result<Option<IdentifiedTrack>, ProviderError> {
        let Some(token) = &self.developer_token else {
            return Err(ProviderError::NotConfigured("apple_music".to_string()));
        };

        let url = format!(
            "{}/catalog/{}/songs/{}",
            APPLE_MUSIC_API_BASE_URL, STOREFRONT, source_value
        );

        tracing::debug!(apple_music_id = %source_value, "Looking up Apple Music song");

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

        let songs: SongsResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;

        let Some(song) = songs.data.into_iter().next() else {
            return Ok(None);
        };

        let isrc = song.attributes.isrc;
        Ok(Some(IdentifiedTrack {
            title: Some(song.attributes.name),
            artist: song.attributes.artist_name,
            album: song.attributes.album_name,
            album_art: song.attributes.artwork.map(|a| artwork_url(&a.url)),
            duration_seconds: song
                .attributes
                .duration_in_millis
                .map(|ms| ms as f64 / 1000.0),
            isrc: isrc.clone(),
            spotify_id: None,
            platform_ids: PlatformIds {
                apple_music_id: Some(song.id),
                isrc,
                ..Default::default()
            },
        }))
    }
}

/// Artwork URL templates carry `{w}x{h}` placeholders
fn artwork_url(template: &str) -> String {
    template.replace("{w}", "640").replace("{h}", "640")
}
