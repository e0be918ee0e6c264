//! Song suggestions returned by the search adapters

use serde::{Deserialize, Serialize};

/// Which backend produced a suggestion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionSource {
    Llm,
    Acrcloud,
    Musicbrainz,
}

/// A candidate track the client can turn into a job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SongSuggestion {
    pub id: String,
    pub title: String,
    pub artist: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub album: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub album_art: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub isrc: Option<String>,
    /// Match confidence in [0, 1]
    pub confidence: f64,
    pub source: SuggestionSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spotify_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub apple_music_id: Option<String>,
}

impl SongSuggestion {
    /// Clamp confidence into [0, 1]; search backends report on odd scales
    pub fn with_clamped_confidence(mut self) -> Self {
        self.confidence = self.confidence.clamp(0.0, 1.0);
        self
    }
}
