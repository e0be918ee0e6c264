//! Song.link (Odesli) cross-platform resolver
//!
//! Handles `spotify_url`, `audio_url`, and `isrc` sources. URLs go straight
//! to the resolver; ISRCs are first anchored to a Deezer track via Deezer's
//! public ISRC lookup (no credentials required), then resolved cross-platform
//! from that track's URL.

use super::{IdentifiedTrack, ProviderCredentials, ProviderError, TrackIdentifier};
use crate::models::{PlatformIds, SourceType};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

const SONGLINK_BASE_URL: &str = "https://api.song.link/v1-alpha.1";
const DEEZER_API_BASE_URL: &str = "https://api.deezer.com";
const USER_AGENT: &str = concat!("stemforge/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SonglinkResponse {
    entity_unique_id: String,
    page_url: Option<String>,
    entities_by_unique_id: HashMap<String, SonglinkEntity>,
    links_by_platform: HashMap<String, SonglinkLink>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SonglinkEntity {
    id: String,
    title: Option<String>,
    artist_name: Option<String>,
    thumbnail_url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SonglinkLink {
    entity_unique_id: String,
}

#[derive(Debug, Deserialize)]
struct DeezerIsrcTrack {
    id: u64,
    title: Option<String>,
    isrc: Option<String>,
    duration: Option<f64>,
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
    cover_xl: Option<String>,
}

/// Cross-platform track resolver backed by the song.link API
pub struct SonglinkResolver {
    http_client: reqwest::Client,
    api_key: Option<String>,
}

impl SonglinkResolver {
    pub fn new() -> Result<Self, ProviderError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(ProviderError::network)?;

        Ok(Self {
            http_client,
            api_key: None,
        })
    }

    async fn resolve_url(&self, url: &str) -> Result<Option<IdentifiedTrack>, ProviderError> {
        let mut request_url = format!("{}/links?url={}", SONGLINK_BASE_URL, urlencode(url));
        if let Some(key) = &self.api_key {
            request_url.push_str(&format!("&key={}", key));
        }

        tracing::debug!(url = %url, "Resolving track via song.link");

        let response = self
            .http_client
            .get(&request_url)
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

        let resolved: SonglinkResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;

        Ok(Some(to_identified_track(resolved)))
    }

    async fn resolve_isrc(&self, isrc: &str) -> Result<Option<IdentifiedTrack>, ProviderError> {
        let url = format!("{}/track/isrc:{}", DEEZER_API_BASE_URL, isrc);
        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(ProviderError::network)?;

        if !response.status().is_success() {
            return Ok(None);
        }

        let body = response
            .text()
            .await
            .map_err(ProviderError::network)?;

        // Deezer reports misses as 200 with an error object
        if body.contains("\"error\"") {
            return Ok(None);
        }

        let track: DeezerIsrcTrack = serde_json::from_str(&body)
            .map_err(|e| ProviderError::Parse(e.to_string()))?;

        let deezer_url = format!("https://www.deezer.com/track/{}", track.id);
        let mut identified = match self.resolve_url(&deezer_url).await? {
            Some(identified) => identified,
            None => IdentifiedTrack::default(),
        };

        // The Deezer anchor is authoritative for the fields it carries
        if identified.title.is_none() {
            identified.title = track.title;
        }
        if identified.artist.is_none() {
            identified.artist = track.artist.map(|a| a.name);
        }
        if let Some(album) = track.album {
            identified.album = identified.album.or(album.title);
            identified.album_art = identified.album_art.or(album.cover_xl);
        }
        identified.duration_seconds = identified.duration_seconds.or(track.duration);
        identified.isrc = Some(track.isrc.unwrap_or_else(|| isrc.to_string()));
        identified.platform_ids.isrc = identified.isrc.clone();
        if identified.platform_ids.deezer_id.is_none() {
            identified.platform_ids.deezer_id = Some(track.id.to_string());
        }

        Ok(Some(identified))
    }
}

#[async_trait::async_trait]
impl TrackIdentifier for SonglinkResolver {
    fn name(&self) -> &'static str {
        "songlink"
    }

    fn handles(&self, source_type: SourceType) -> bool {
        matches!(
            source_type,
            SourceType::SpotifyUrl | SourceType::AudioUrl | SourceType::Isrc
        )
    }

    fn configure(&mut self, credentials: ProviderCredentials) {
        self.api_key = credentials.api_key;
    }

    async fn identify(
        &self,
        source_type: SourceType,
        source_value: &str,
    ) -> Result<Option<IdentifiedTrack>, ProviderError> {
        match source_type {
            SourceType::SpotifyUrl | SourceType::AudioUrl => self.resolve_url(source_value).await,
            SourceType::Isrc => self.resolve_isrc(source_value).await,
            _ => Ok(None),
        }
    }
}

fn to_identified_track(resolved: SonglinkResponse) -> IdentifiedTrack {
    let mut platform_ids = PlatformIds {
        page_url: resolved.page_url.clone(),
        ..Default::default()
    };

    // Link entity IDs look like `TIDAL_SONG::77646168`; the native ID is the
    // suffix after the separator.
    for (platform, link) in &resolved.links_by_platform {
        let native_id = link
            .entity_unique_id
            .rsplit("::")
            .next()
            .map(str::to_string);
        match platform.as_str() {
            "spotify" => platform_ids.spotify_id = native_id,
            "appleMusic" => platform_ids.apple_music_id = native_id,
            "tidal" => platform_ids.tidal_id = native_id,
            "deezer" => platform_ids.deezer_id = native_id,
            "qobuz" => platform_ids.qobuz_id = native_id,
            _ => {}
        }
    }

    let entity = resolved.entities_by_unique_id.get(&resolved.entity_unique_id);
    let spotify_entity = resolved
        .links_by_platform
        .get("spotify")
        .and_then(|link| resolved.entities_by_unique_id.get(&link.entity_unique_id));

    IdentifiedTrack {
        title: entity.and_then(|e| e.title.clone()),
        artist: entity.and_then(|e| e.artist_name.clone()),
        album: None,
        album_art: entity.and_then(|e| e.thumbnail_url.clone()),
        duration_seconds: None,
        isrc: None,
        spotify_id: spotify_entity
            .map(|e| e.id.clone())
            .or_else(|| platform_ids.spotify_id.clone()),
        platform_ids,
    }
}

fn urlencode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}
