//! Job lifecycle state machine
//!
//! A job progresses through a fixed pipeline:
//! pending → identifying → acquiring → separating → generating_midi → completed
//!
//! Any state may transition to `failed`; terminal states never transition
//! again.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Job pipeline status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Created, not yet picked up by the orchestrator
    Pending,
    /// Resolving canonical track metadata
    Identifying,
    /// Downloading the lossless master
    Acquiring,
    /// Splitting the master into instrument stems
    Separating,
    /// Transcribing tonal stems to MIDI
    GeneratingMidi,
    /// Pipeline finished successfully
    Completed,
    /// Pipeline aborted with an error
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Identifying => "identifying",
            JobStatus::Acquiring => "acquiring",
            JobStatus::Separating => "separating",
            JobStatus::GeneratingMidi => "generating_midi",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(JobStatus::Pending),
            "identifying" => Some(JobStatus::Identifying),
            "acquiring" => Some(JobStatus::Acquiring),
            "separating" => Some(JobStatus::Separating),
            "generating_midi" => Some(JobStatus::GeneratingMidi),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// How the source reference should be interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    SpotifyUrl,
    AudioUrl,
    FileUpload,
    Isrc,
    SpotifyId,
    AppleMusicId,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::SpotifyUrl => "spotify_url",
            SourceType::AudioUrl => "audio_url",
            SourceType::FileUpload => "file_upload",
            SourceType::Isrc => "isrc",
            SourceType::SpotifyId => "spotify_id",
            SourceType::AppleMusicId => "apple_music_id",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "spotify_url" => Some(SourceType::SpotifyUrl),
            "audio_url" => Some(SourceType::AudioUrl),
            "file_upload" => Some(SourceType::FileUpload),
            "isrc" => Some(SourceType::Isrc),
            "spotify_id" => Some(SourceType::SpotifyId),
            "apple_music_id" => Some(SourceType::AppleMusicId),
            _ => None,
        }
    }
}

/// Canonical track metadata, nullable until identification completes
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrackMetadata {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub album_art: Option<String>,
    pub duration_seconds: Option<f64>,
    pub isrc: Option<String>,
    pub spotify_id: Option<String>,
}

/// Cross-platform track identifiers discovered during identification
///
/// Cached on the job row so acquisition can read platform-native IDs without
/// re-resolving, and re-identification is a no-op.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlatformIds {
    pub spotify_id: Option<String>,
    pub apple_music_id: Option<String>,
    pub tidal_id: Option<String>,
    pub deezer_id: Option<String>,
    pub qobuz_id: Option<String>,
    pub isrc: Option<String>,
    /// Resolver landing page, kept for diagnostics
    pub page_url: Option<String>,
}

/// One unit of requested work, from creation to terminal status
#[derive(Debug, Clone)]
pub struct Job {
    pub id: Uuid,
    pub status: JobStatus,
    pub source_type: SourceType,
    pub source_value: String,
    pub metadata: TrackMetadata,
    pub songlink_data: Option<PlatformIds>,
    pub master_audio_path: Option<String>,
    pub master_audio_format: Option<String>,
    pub master_audio_service: Option<String>,
    pub progress: u8,
    pub progress_message: String,
    pub error_message: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Create a new pending job
    pub fn new(source_type: SourceType, source_value: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            status: JobStatus::Pending,
            source_type,
            source_value,
            metadata: TrackMetadata::default(),
            songlink_data: None,
            master_audio_path: None,
            master_audio_format: None,
            master_audio_service: None,
            progress: 0,
            progress_message: String::from("Queued"),
            error_message: None,
            expires_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Bump the audit timestamp; call before every persist
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// True when identification already produced everything downstream needs
    pub fn is_identified(&self) -> bool {
        self.metadata.title.is_some()
            && self.metadata.artist.is_some()
            && self.metadata.isrc.is_some()
            && self.songlink_data.is_some()
    }
}

/// Partial update produced by one pipeline step
///
/// Explicit nullable fields rather than a free-form map: each step fills in
/// only what it learned, the orchestrator merges it into the job snapshot and
/// persists once per step boundary.
#[derive(Debug, Clone, Default)]
pub struct JobUpdate {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub album_art: Option<String>,
    pub duration_seconds: Option<f64>,
    pub isrc: Option<String>,
    pub spotify_id: Option<String>,
    pub songlink_data: Option<PlatformIds>,
    pub master_audio_path: Option<String>,
    pub master_audio_format: Option<String>,
    pub master_audio_service: Option<String>,
}

impl JobUpdate {
    /// Merge this update into a job snapshot; `None` fields leave the job
    /// untouched so a no-op step never erases earlier results.
    pub fn apply_to(&self, job: &mut Job) {
        if let Some(v) = &self.title {
            job.metadata.title = Some(v.clone());
        }
        if let Some(v) = &self.artist {
            job.metadata.artist = Some(v.clone());
        }
        if let Some(v) = &self.album {
            job.metadata.album = Some(v.clone());
        }
        if let Some(v) = &self.album_art {
            job.metadata.album_art = Some(v.clone());
        }
        if let Some(v) = self.duration_seconds {
            job.metadata.duration_seconds = Some(v);
        }
        if let Some(v) = &self.isrc {
            job.metadata.isrc = Some(v.clone());
        }
        if let Some(v) = &self.spotify_id {
            job.metadata.spotify_id = Some(v.clone());
        }
        if let Some(v) = &self.songlink_data {
            job.songlink_data = Some(v.clone());
        }
        if let Some(v) = &self.master_audio_path {
            job.master_audio_path = Some(v.clone());
        }
        if let Some(v) = &self.master_audio_format {
            job.master_audio_format = Some(v.clone());
        }
        if let Some(v) = &self.master_audio_service {
            job.master_audio_service = Some(v.clone());
        }
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.artist.is_none()
            && self.album.is_none()
            && self.album_art.is_none()
            && self.duration_seconds.is_none()
            && self.isrc.is_none()
            && self.spotify_id.is_none()
            && self.songlink_data.is_none()
            && self.master_audio_path.is_none()
            && self.master_audio_format.is_none()
            && self.master_audio_service.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for status in [
            JobStatus::Pending,
            JobStatus::Identifying,
            JobStatus::Acquiring,
            JobStatus::Separating,
            JobStatus::GeneratingMidi,
            JobStatus::Completed,
            JobStatus::Failed,
        ] {
            assert_eq!(JobStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(JobStatus::parse("bogus"), None);
    }

    #[test]
    fn test_terminal_states() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(!JobStatus::Separating.is_terminal());
    }

    #[test]
    fn test_update_merge_preserves_existing_fields() {
        let mut job = Job::new(SourceType::Isrc, "GBUM71029604".to_string());
        JobUpdate {
            title: Some("Bohemian Rhapsody".to_string()),
            artist: Some("Queen".to_string()),
            ..Default::default()
        }
        .apply_to(&mut job);

        // An empty later update must not erase earlier results
        JobUpdate::default().apply_to(&mut job);

        assert_eq!(job.metadata.title.as_deref(), Some("Bohemian Rhapsody"));
        assert_eq!(job.metadata.artist.as_deref(), Some("Queen"));
    }

    #[test]
    fn test_is_identified_requires_songlink_data() {
        let mut job = Job::new(SourceType::Isrc, "GBUM71029604".to_string());
        job.metadata.title = Some("t".to_string());
        job.metadata.artist = Some("a".to_string());
        job.metadata.isrc = Some("GBUM71029604".to_string());
        assert!(!job.is_identified());

        job.songlink_data = Some(PlatformIds::default());
        assert!(job.is_identified());
    }
}
