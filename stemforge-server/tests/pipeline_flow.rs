//! End-to-end pipeline tests
//!
//! Drive the orchestrator against scripted providers and assert the
//! lifecycle invariants: terminal status, progress semantics, retention
//! stamps, asset shape, and step idempotence.

mod helpers;

use std::sync::atomic::Ordering;

use chrono::Utc;
use helpers::{FakeIdentifier, FakeMidiWriter, FakeStemSplitter, FakeStreaming, TestHarness};
use stemforge_server::db;
use stemforge_server::models::{Job, JobStatus, SourceType, StemType};

#[tokio::test]
async fn test_happy_url_path_completes_with_stems_and_midi() {
    let identifier = FakeIdentifier::new();
    let streaming = FakeStreaming::new();
    let splitter = FakeStemSplitter::new();
    let midi = FakeMidiWriter::new();

    let harness = {
        let (identifier, streaming, splitter, midi) = (
            identifier.clone(),
            streaming.clone(),
            splitter.clone(),
            midi.clone(),
        );
        TestHarness::new(move |registry| {
            registry.register_identifier(identifier);
            registry.register_streaming(streaming);
            registry.register_stem(splitter);
            registry.register_midi(midi);
        })
        .await
    };

    let job = Job::new(
        SourceType::SpotifyUrl,
        "https://open.spotify.com/track/6y0igZArWVi6Iz0rj35c1Y".to_string(),
    );
    db::jobs::insert_job(&harness.db, &job).await.unwrap();

    harness.orchestrator.run(job.id).await.unwrap();

    let finished = db::jobs::load_job(&harness.db, job.id).await.unwrap().unwrap();
    assert_eq!(finished.status, JobStatus::Completed);
    assert_eq!(finished.progress, 100);
    assert!(finished.error_message.is_none());
    assert!(
        finished.expires_at.unwrap() > Utc::now(),
        "retention window starts at completion"
    );

    // Identification results persisted
    assert_eq!(finished.metadata.isrc.as_deref(), Some("GBAAA9800322"));
    assert_eq!(finished.metadata.title.as_deref(), Some("Teardrop"));
    assert!(finished.songlink_data.is_some());

    // Acquisition via the native Tidal ID
    assert_eq!(finished.master_audio_service.as_deref(), Some("tidal"));
    assert_eq!(finished.master_audio_format.as_deref(), Some("FLAC"));
    assert!(std::path::Path::new(finished.master_audio_path.as_deref().unwrap()).exists());

    // Full five-stem set, tonal stems transcribed
    let assets = db::assets::load_assets_for_job(&harness.db, job.id).await.unwrap();
    assert_eq!(assets.len(), 5);
    for asset in &assets {
        assert!(std::path::Path::new(&asset.file_path).exists());
        assert_eq!(asset.has_midi, asset.midi_path.is_some());
        if asset.stem_type.is_tonal() {
            assert!(asset.has_midi, "{} should carry MIDI", asset.stem_type.as_str());
        } else {
            assert!(!asset.has_midi, "{} must not carry MIDI", asset.stem_type.as_str());
        }
    }
    assert_eq!(midi.calls.load(Ordering::SeqCst), 3, "vocals, melody, bass");
}

#[tokio::test]
async fn test_isrc_without_providers_fails_with_operator_hint() {
    let identifier = FakeIdentifier::new();
    let harness = {
        let identifier = identifier.clone();
        TestHarness::new(move |registry| {
            registry.register_identifier(identifier);
            // No streaming providers at all
        })
        .await
    };

    let job = Job::new(SourceType::Isrc, "GBUM71029604".to_string());
    db::jobs::insert_job(&harness.db, &job).await.unwrap();

    harness.orchestrator.run(job.id).await.unwrap();

    let failed = db::jobs::load_job(&harness.db, job.id).await.unwrap().unwrap();
    assert_eq!(failed.status, JobStatus::Failed);
    assert_eq!(failed.progress, 0, "progress resets on failure");
    let message = failed.error_message.unwrap();
    assert!(
        message.contains("Tidal, Deezer, or Qobuz"),
        "operator must learn which credentials to configure: {}",
        message
    );
    assert!(
        failed.expires_at.is_some(),
        "failed jobs get a retention window so the reaper collects them"
    );
}

#[tokio::test]
async fn test_uploaded_file_becomes_master_without_identification() {
    let identifier = FakeIdentifier::new();
    let splitter = FakeStemSplitter::new();
    let midi = FakeMidiWriter::new();

    let harness = {
        let (identifier, splitter, midi) = (identifier.clone(), splitter.clone(), midi.clone());
        TestHarness::new(move |registry| {
            registry.register_identifier(identifier);
            registry.register_stem(splitter);
            registry.register_midi(midi);
        })
        .await
    };

    // Simulate an ingress upload on disk
    let upload_path = harness.storage.upload_path(uuid::Uuid::new_v4(), "wav");
    std::fs::create_dir_all(harness.storage.uploads_dir()).unwrap();
    std::fs::write(&upload_path, b"RIFF-fake-upload").unwrap();

    let job = Job::new(
        SourceType::FileUpload,
        upload_path.to_string_lossy().to_string(),
    );
    db::jobs::insert_job(&harness.db, &job).await.unwrap();

    harness.orchestrator.run(job.id).await.unwrap();

    let finished = db::jobs::load_job(&harness.db, job.id).await.unwrap().unwrap();
    assert_eq!(finished.status, JobStatus::Completed);
    assert_eq!(
        finished.master_audio_path.as_deref(),
        Some(upload_path.to_string_lossy().as_ref()),
        "the uploaded file itself becomes the master"
    );
    assert_eq!(finished.master_audio_service.as_deref(), Some("upload"));
    assert_eq!(finished.master_audio_format.as_deref(), Some("WAV"));
    assert_eq!(
        identifier.calls.load(Ordering::SeqCst),
        0,
        "uploads skip identification"
    );

    let assets = db::assets::load_assets_for_job(&harness.db, job.id).await.unwrap();
    assert_eq!(assets.len(), 5);
}

#[tokio::test]
async fn test_rerun_is_idempotent() {
    let identifier = FakeIdentifier::new();
    let streaming = FakeStreaming::new();
    let splitter = FakeStemSplitter::new();
    let midi = FakeMidiWriter::new();

    let harness = {
        let (identifier, streaming, splitter, midi) = (
            identifier.clone(),
            streaming.clone(),
            splitter.clone(),
            midi.clone(),
        );
        TestHarness::new(move |registry| {
            registry.register_identifier(identifier);
            registry.register_streaming(streaming);
            registry.register_stem(splitter);
            registry.register_midi(midi);
        })
        .await
    };

    let job = Job::new(
        SourceType::SpotifyUrl,
        "https://open.spotify.com/track/X".to_string(),
    );
    db::jobs::insert_job(&harness.db, &job).await.unwrap();

    harness.orchestrator.run(job.id).await.unwrap();

    // A terminal job is left alone entirely
    harness.orchestrator.run(job.id).await.unwrap();
    assert_eq!(identifier.calls.load(Ordering::SeqCst), 1);
    assert_eq!(streaming.downloads.load(Ordering::SeqCst), 1);
    assert_eq!(splitter.calls.load(Ordering::SeqCst), 1);
    assert_eq!(midi.calls.load(Ordering::SeqCst), 3);

    // Force the job back to a mid-pipeline status, as after a crash: the
    // short-circuits must skip every completed stage.
    let mut reopened = db::jobs::load_job(&harness.db, job.id).await.unwrap().unwrap();
    reopened.status = stemforge_server::models::JobStatus::Identifying;
    reopened.touch();
    db::jobs::save_job(&harness.db, &reopened).await.unwrap();

    harness.orchestrator.run(job.id).await.unwrap();

    assert_eq!(identifier.calls.load(Ordering::SeqCst), 1, "identify short-circuits");
    assert_eq!(streaming.downloads.load(Ordering::SeqCst), 1, "acquire short-circuits");
    assert_eq!(splitter.calls.load(Ordering::SeqCst), 1, "separate short-circuits");
    assert_eq!(midi.calls.load(Ordering::SeqCst), 3, "midi skips transcribed stems");

    let assets = db::assets::load_assets_for_job(&harness.db, job.id).await.unwrap();
    assert_eq!(assets.len(), 5, "no duplicate assets after re-run");

    let finished = db::jobs::load_job(&harness.db, job.id).await.unwrap().unwrap();
    assert_eq!(finished.status, JobStatus::Completed);
}

#[tokio::test]
async fn test_partial_midi_failure_still_completes() {
    let identifier = FakeIdentifier::new();
    let streaming = FakeStreaming::new();
    let splitter = FakeStemSplitter::new();
    let midi = FakeMidiWriter::failing();

    let harness = {
        let (identifier, streaming, splitter, midi) = (
            identifier.clone(),
            streaming.clone(),
            splitter.clone(),
            midi.clone(),
        );
        TestHarness::new(move |registry| {
            registry.register_identifier(identifier);
            registry.register_streaming(streaming);
            registry.register_stem(splitter);
            registry.register_midi(midi);
        })
        .await
    };

    let job = Job::new(SourceType::Isrc, "GBAAA9800322".to_string());
    db::jobs::insert_job(&harness.db, &job).await.unwrap();

    harness.orchestrator.run(job.id).await.unwrap();

    let finished = db::jobs::load_job(&harness.db, job.id).await.unwrap().unwrap();
    assert_eq!(
        finished.status,
        JobStatus::Completed,
        "MIDI trouble is not terminal"
    );

    let assets = db::assets::load_assets_for_job(&harness.db, job.id).await.unwrap();
    assert!(assets.iter().all(|a| !a.has_midi && a.midi_path.is_none()));
}

#[tokio::test]
async fn test_resume_incomplete_redispatches_stuck_jobs() {
    let identifier = FakeIdentifier::new();
    let streaming = FakeStreaming::new();
    let splitter = FakeStemSplitter::new();
    let midi = FakeMidiWriter::new();

    let harness = {
        let (identifier, streaming, splitter, midi) = (
            identifier.clone(),
            streaming.clone(),
            splitter.clone(),
            midi.clone(),
        );
        TestHarness::new(move |registry| {
            registry.register_identifier(identifier);
            registry.register_streaming(streaming);
            registry.register_stem(splitter);
            registry.register_midi(midi);
        })
        .await
    };

    // A job stranded mid-pipeline by a dead process
    let mut stuck = Job::new(SourceType::Isrc, "GBAAA9800322".to_string());
    stuck.status = JobStatus::Acquiring;
    stuck.progress = 30;
    db::jobs::insert_job(&harness.db, &stuck).await.unwrap();

    // And one that already finished, which must not be re-dispatched
    let mut done = Job::new(SourceType::Isrc, "USAA10000001".to_string());
    done.status = JobStatus::Completed;
    db::jobs::insert_job(&harness.db, &done).await.unwrap();

    let resumed = harness.orchestrator.resume_incomplete().await.unwrap();
    assert_eq!(resumed, 1);

    // The dispatch is fire-and-forget; poll until the pipeline settles
    for _ in 0..100 {
        let job = db::jobs::load_job(&harness.db, stuck.id).await.unwrap().unwrap();
        if job.is_terminal() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }

    let finished = db::jobs::load_job(&harness.db, stuck.id).await.unwrap().unwrap();
    assert_eq!(finished.status, JobStatus::Completed);

    let assets = db::assets::load_assets_for_job(&harness.db, stuck.id).await.unwrap();
    assert_eq!(assets.len(), StemType::ALL_STEMS.len());
}
