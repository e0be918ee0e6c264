#![allow(dead_code)] // each test binary uses a different subset of fixtures

//! Shared fixtures for integration tests
//!
//! Fake providers script the external world: identification answers from a
//! canned track, downloads write real bytes to disk, separation produces the
//! full five-stem set, MIDI generation writes a tiny SMF header. Call
//! counters let tests assert the idempotence short-circuits.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use stemforge_server::models::{PlatformIds, SourceType, StemType};
use stemforge_server::pipeline::JobOrchestrator;
use stemforge_server::providers::{
    DownloadedTrack, GeneratedMidi, IdentifiedTrack, MidiProvider, ProviderCredentials,
    ProviderError, ProviderRegistry, SeparatedStem, StemProvider, StreamingProvider,
    TrackIdentifier, TrackInfo,
};
use stemforge_server::services::MusicBrainzClient;
use stemforge_server::storage::Storage;
use stemforge_server::AppState;

pub struct FakeIdentifier {
    pub calls: AtomicUsize,
}

impl FakeIdentifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait::async_trait]
impl TrackIdentifier for FakeIdentifier {
    fn name(&self) -> &'static str {
        "fake_identifier"
    }

    fn handles(&self, source_type: SourceType) -> bool {
        matches!(
            source_type,
            SourceType::SpotifyUrl | SourceType::AudioUrl | SourceType::Isrc
        )
    }

    fn configure(&mut self, _credentials: ProviderCredentials) {}

    async fn identify(
        &self,
        _source_type: SourceType,
        _source_value: &str,
    ) -> Result<Option<IdentifiedTrack>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Some(IdentifiedTrack {
            title: Some("Teardrop".to_string()),
            artist: Some("Massive Attack".to_string()),
            album: Some("Mezzanine".to_string()),
            album_art: Some("https://img.example/mezzanine.jpg".to_string()),
            duration_seconds: Some(330.0),
            isrc: Some("GBAAA9800322".to_string()),
            spotify_id: Some("6y0igZArWVi6Iz0rj35c1Y".to_string()),
            platform_ids: PlatformIds {
                spotify_id: Some("6y0igZArWVi6Iz0rj35c1Y".to_string()),
                tidal_id: Some("77646168".to_string()),
                isrc: Some("GBAAA9800322".to_string()),
                ..Default::default()
            },
        }))
    }
}

pub struct FakeStreaming {
    pub downloads: AtomicUsize,
}

impl FakeStreaming {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            downloads: AtomicUsize::new(0),
        })
    }
}

#[async_trait::async_trait]
impl StreamingProvider for FakeStreaming {
    fn name(&self) -> &'static str {
        "tidal"
    }

    fn priority(&self) -> u8 {
        1
    }

    fn is_configured(&self) -> bool {
        true
    }

    fn configure(&mut self, _credentials: ProviderCredentials) {}

    async fn search_by_isrc(&self, _isrc: &str) -> Result<Option<String>, ProviderError> {
        Ok(Some("77646168".to_string()))
    }

    async fn get_track_info(&self, track_id: &str) -> Result<TrackInfo, ProviderError> {
        Ok(TrackInfo {
            id: track_id.to_string(),
            title: Some("Teardrop".to_string()),
            artist: Some("Massive Attack".to_string()),
            album: None,
            duration_seconds: Some(330.0),
            isrc: Some("GBAAA9800322".to_string()),
        })
    }

    async fn download_track(
        &self,
        _track_id: &str,
        output_path: &Path,
    ) -> Result<DownloadedTrack, ProviderError> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        if let Some(parent) = output_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(output_path, b"fLaC-fake-master-bytes")?;
        Ok(DownloadedTrack {
            path: output_path.to_path_buf(),
            format: "FLAC".to_string(),
            quality: Some("LOSSLESS".to_string()),
        })
    }
}

pub struct FakeStemSplitter {
    pub calls: AtomicUsize,
}

impl FakeStemSplitter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait::async_trait]
impl StemProvider for FakeStemSplitter {
    fn name(&self) -> &'static str {
        "lalal"
    }

    fn is_configured(&self) -> bool {
        true
    }

    fn configure(&mut self, _credentials: ProviderCredentials) {}

    async fn separate(
        &self,
        _audio_path: &Path,
        output_dir: &Path,
    ) -> Result<Vec<SeparatedStem>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        std::fs::create_dir_all(output_dir)?;

        let mut stems = Vec::new();
        for stem_type in StemType::ALL_STEMS {
            let file_path = output_dir.join(format!("{}.wav", stem_type.as_str()));
            std::fs::write(&file_path, b"RIFF-fake-stem")?;
            stems.push(SeparatedStem {
                stem_type,
                file_path,
                file_size: 14,
            });
        }
        Ok(stems)
    }
}

pub struct FakeMidiWriter {
    pub calls: AtomicUsize,
    pub fail: bool,
}

impl FakeMidiWriter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            fail: false,
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            fail: true,
        })
    }
}

#[async_trait::async_trait]
impl MidiProvider for FakeMidiWriter {
    fn name(&self) -> &'static str {
        "basic_pitch"
    }

    fn is_configured(&self) -> bool {
        true
    }

    fn configure(&mut self, _credentials: ProviderCredentials) {}

    async fn generate(
        &self,
        _audio_path: &Path,
        output_dir: &Path,
        stem_type: StemType,
    ) -> Result<GeneratedMidi, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(ProviderError::Process("simulated transcriber crash".into()));
        }

        std::fs::create_dir_all(output_dir)?;
        let midi_path = output_dir.join(format!("{}.mid", stem_type.as_str()));
        std::fs::write(&midi_path, b"MThd-fake-midi")?;
        Ok(GeneratedMidi {
            midi_path,
            file_size: 14,
        })
    }
}

/// Test harness: in-memory database, temp-dir storage, empty registry
pub struct TestHarness {
    pub db: sqlx::SqlitePool,
    pub storage: Storage,
    pub registry: Arc<ProviderRegistry>,
    pub orchestrator: Arc<JobOrchestrator>,
    // Held so the storage root outlives the harness
    pub tmp: tempfile::TempDir,
}

impl TestHarness {
    pub async fn new(registry_setup: impl FnOnce(&mut ProviderRegistry)) -> Self {
        let db = stemforge_common::db::init_memory_database().await.unwrap();
        let tmp = tempfile::tempdir().unwrap();
        let storage = Storage::new(tmp.path());
        storage.bootstrap().unwrap();

        let mut registry = ProviderRegistry::new(db.clone());
        registry_setup(&mut registry);
        let registry = Arc::new(registry);

        let orchestrator = Arc::new(JobOrchestrator::new(
            db.clone(),
            storage.clone(),
            registry.clone(),
            chrono::Duration::hours(24),
        ));

        Self {
            db,
            storage,
            registry,
            orchestrator,
            tmp,
        }
    }

    pub fn app_state(&self) -> AppState {
        AppState {
            db: self.db.clone(),
            storage: self.storage.clone(),
            orchestrator: self.orchestrator.clone(),
            musicbrainz: Arc::new(MusicBrainzClient::new().unwrap()),
            llm: None,
            acrcloud: None,
            cors_origin: None,
        }
    }
}
