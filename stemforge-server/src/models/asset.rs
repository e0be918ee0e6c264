//! Pipeline-produced assets
//!
//! Every asset is owned by exactly one job and cascades with it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Asset kind; only stems exist today but the column is open for masters or
/// previews later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetType {
    Stem,
}

impl AssetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetType::Stem => "stem",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "stem" => Some(AssetType::Stem),
            _ => None,
        }
    }
}

/// Isolated instrument/voice track kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StemType {
    Vocals,
    Drums,
    Bass,
    Melody,
    Instrumental,
    Other,
}

impl StemType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StemType::Vocals => "vocals",
            StemType::Drums => "drums",
            StemType::Bass => "bass",
            StemType::Melody => "melody",
            StemType::Instrumental => "instrumental",
            StemType::Other => "other",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "vocals" => Some(StemType::Vocals),
            "drums" => Some(StemType::Drums),
            "bass" => Some(StemType::Bass),
            "melody" => Some(StemType::Melody),
            "instrumental" => Some(StemType::Instrumental),
            "other" => Some(StemType::Other),
            _ => None,
        }
    }

    /// MIDI transcription only makes sense for pitched material
    pub fn is_tonal(&self) -> bool {
        matches!(self, StemType::Vocals | StemType::Melody | StemType::Bass)
    }

    /// The full set a separation run is expected to produce
    pub const ALL_STEMS: [StemType; 5] = [
        StemType::Vocals,
        StemType::Drums,
        StemType::Bass,
        StemType::Melody,
        StemType::Instrumental,
    ];
}

/// A file produced by the pipeline, owned by exactly one job
#[derive(Debug, Clone)]
pub struct Asset {
    pub id: Uuid,
    pub job_id: Uuid,
    pub asset_type: AssetType,
    pub stem_type: StemType,
    pub file_path: String,
    pub file_size: i64,
    pub mime_type: String,
    pub has_midi: bool,
    pub midi_path: Option<String>,
    pub provider: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Asset {
    /// Create a stem asset as returned by a separation provider
    pub fn new_stem(
        job_id: Uuid,
        stem_type: StemType,
        file_path: String,
        file_size: i64,
        provider: &str,
        expires_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            job_id,
            asset_type: AssetType::Stem,
            stem_type,
            file_path,
            file_size,
            mime_type: "audio/wav".to_string(),
            has_midi: false,
            midi_path: None,
            provider: Some(provider.to_string()),
            expires_at,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tonal_set() {
        assert!(StemType::Vocals.is_tonal());
        assert!(StemType::Melody.is_tonal());
        assert!(StemType::Bass.is_tonal());
        assert!(!StemType::Drums.is_tonal());
        assert!(!StemType::Instrumental.is_tonal());
        assert!(!StemType::Other.is_tonal());
    }

    #[test]
    fn test_stem_type_round_trip() {
        for stem in StemType::ALL_STEMS {
            assert_eq!(StemType::parse(stem.as_str()), Some(stem));
        }
    }

    #[test]
    fn test_new_stem_has_no_midi() {
        let asset = Asset::new_stem(
            Uuid::new_v4(),
            StemType::Vocals,
            "/data/stems/x/vocals.wav".to_string(),
            1024,
            "lalal",
            None,
        );
        assert!(!asset.has_midi);
        assert!(asset.midi_path.is_none());
        assert_eq!(asset.mime_type, "audio/wav");
    }
}
