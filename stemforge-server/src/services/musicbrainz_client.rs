//! MusicBrainz search client
//!
//! Recording search for the suggestion endpoint, rate limited to the 1
//! request/second MusicBrainz asks of anonymous clients.

use crate::models::{SongSuggestion, SuggestionSource};
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Mutex;

const MUSICBRAINZ_BASE_URL: &str = "https://musicbrainz.org/ws/2";
const USER_AGENT: &str = concat!(
    "stemforge/",
    env!("CARGO_PKG_VERSION"),
    " (https://stemforge.dev)"
);
const RATE_LIMIT_MS: u64 = 1000; // 1 request per second

/// MusicBrainz client errors
#[derive(Debug, Error)]
pub enum MBError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("API error {0}: {1}")]
    ApiError(u16, String),

    #[error("Parse error: {0}")]
    ParseError(String),
}

#[derive(Debug, Deserialize)]
struct RecordingSearchResponse {
    recordings: Vec<MBRecording>,
}

#[derive(Debug, Deserialize)]
struct MBRecording {
    id: String,
    title: String,
    /// Lucene relevance score, 0-100
    score: Option<u32>,
    #[serde(rename = "artist-credit")]
    artist_credit: Option<Vec<MBArtistCredit>>,
    releases: Option<Vec<MBRelease>>,
    isrcs: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct MBArtistCredit {
    name: String,
}

#[derive(Debug, Deserialize)]
struct MBRelease {
    title: String,
}

#[derive(Debug, Deserialize)]
struct ArtistSearchResponse {
    artists: Vec<MBArtist>,
}

#[derive(Debug, Deserialize)]
struct MBArtist {
    id: String,
    name: String,
    score: Option<u32>,
}

/// Rate limiter enforcing 1 request/second
struct RateLimiter {
    last_request: Mutex<Option<Instant>>,
    min_interval: Duration,
}

impl RateLimiter {
    fn new(min_interval_ms: u64) -> Self {
        Self {
            last_request: Mutex::new(None),
            min_interval: Duration::from_millis(min_interval_ms),
        }
    }

    /// Wait if necessary to comply with rate limit
    async fn wait(&self) {
        let mut last = self.last_request.lock().await;

        if let Some(last_time) = *last {
            let elapsed = last_time.elapsed();
            if elapsed < self.min_interval {
                let wait_time = self.min_interval - elapsed;
                tracing::debug!("Rate limiting: waiting {:?}", wait_time);
                tokio::time::sleep(wait_time).await;
            }
        }

        *last = Some(Instant::now());
    }
}

/// MusicBrainz API client
pub struct MusicBrainzClient {
    http_client: reqwest::Client,
    rate_limiter: Arc<RateLimiter>,
}

impl MusicBrainzClient {
    pub fn new() -> Result<Self, MBError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| MBError::NetworkError(e.to_string()))?;

        Ok(Self {
            http_client,
            rate_limiter: Arc::new(RateLimiter::new(RATE_LIMIT_MS)),
        })
    }

    /// Search recordings or artists, mapped to song suggestions
    pub async fn search(
        &self,
        query: &str,
        entity: &str,
    ) -> Result<Vec<SongSuggestion>, MBError> {
        match entity {
            "artist" => self.search_artists(query).await,
            _ => self.search_recordings(query).await,
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, MBError> {
        self.rate_limiter.wait().await;

        tracing::debug!(url = %url, "Querying MusicBrainz API");

        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(|e| MBError::NetworkError(e.to_string()))?;

        let status = response.status();
        if status == 503 {
            return Err(MBError::RateLimitExceeded);
        }
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(MBError::ApiError(status.as_u16(), error_text));
        }

        response
            .json()
            .await
            .map_err(|e| MBError::ParseError(e.to_string()))
    }

    async fn search_recordings(&self, query: &str) -> Result<Vec<SongSuggestion>, MBError> {
        let url = format!(
            "{}/recording?query={}&limit=10&fmt=json",
            MUSICBRAINZ_BASE_URL,
            urlencoding(query)
        );

        let results: RecordingSearchResponse = self.get_json(&url).await?;

        Ok(results
            .recordings
            .into_iter()
            .map(|recording| {
                SongSuggestion {
                    id: recording.id,
                    title: recording.title,
                    artist: recording
                        .artist_credit
                        .and_then(|credits| credits.into_iter().next())
                        .map(|credit| credit.name)
                        .unwrap_or_else(|| "Unknown".to_string()),
                    album: recording
                        .releases
                        .and_then(|releases| releases.into_iter().next())
                        .map(|release| release.title),
                    album_art: None,
                    isrc: recording.isrcs.and_then(|isrcs| isrcs.into_iter().next()),
                    confidence: recording.score.unwrap_or(0) as f64 / 100.0,
                    source: SuggestionSource::Musicbrainz,
                    spotify_id: None,
                    apple_music_id: None,
                }
                .with_clamped_confidence()
            })
            .collect())
    }

    async fn search_artists(&self, query: &str) -> Result<Vec<SongSuggestion>, MBError> {
        let url = format!(
            "{}/artist?query={}&limit=10&fmt=json",
            MUSICBRAINZ_BASE_URL,
            urlencoding(query)
        );

        let results: ArtistSearchResponse = self.get_json(&url).await?;

        Ok(results
            .artists
            .into_iter()
            .map(|artist| {
                SongSuggestion {
                    id: artist.id,
                    title: artist.name.clone(),
                    artist: artist.name,
                    album: None,
                    album_art: None,
                    isrc: None,
                    confidence: artist.score.unwrap_or(0) as f64 / 100.0,
                    source: SuggestionSource::Musicbrainz,
                    spotify_id: None,
                    apple_music_id: None,
                }
                .with_clamped_confidence()
            })
            .collect())
    }
}

fn urlencoding(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            b' ' => out.push_str("%20"),
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limiter_creation() {
        let limiter = RateLimiter::new(1000);
        assert_eq!(limiter.min_interval, Duration::from_millis(1000));
    }

    #[tokio::test]
    async fn test_rate_limiter_timing() {
        let limiter = RateLimiter::new(200); // short interval for a fast test

        let start = Instant::now();
        limiter.wait().await;
        let first_elapsed = start.elapsed();

        limiter.wait().await;
        let second_elapsed = start.elapsed();

        assert!(first_elapsed < Duration::from_millis(100));
        assert!(second_elapsed >= Duration::from_millis(180));
    }

    #[test]
    fn test_recording_search_mapping() {
        let body = r#"{
            "recordings": [{
                "id": "b1a9c0e9",
                "title": "Teardrop",
                "score": 97,
                "artist-credit": [{"name": "Massive Attack"}],
                "releases": [{"title": "Mezzanine"}],
                "isrcs": ["GBAAA9800322"]
            }]
        }"#;
        let results: RecordingSearchResponse = serde_json::from_str(body).unwrap();
        assert_eq!(results.recordings[0].score, Some(97));
        assert_eq!(
            results.recordings[0].isrcs.as_ref().unwrap()[0],
            "GBAAA9800322"
        );
    }

    #[test]
    fn test_query_encoding() {
        assert_eq!(urlencoding("massive attack"), "massive%20attack");
    }
}
