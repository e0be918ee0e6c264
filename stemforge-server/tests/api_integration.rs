//! HTTP surface tests
//!
//! Exercise the router with in-process requests via tower's `oneshot`.

mod helpers;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use helpers::TestHarness;
use stemforge_server::build_router;
use stemforge_server::db;
use stemforge_server::models::{Asset, Job, JobStatus, SourceType, StemType};

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_health_reports_version() {
    let harness = TestHarness::new(|_| {}).await;
    let app = build_router(harness.app_state());

    let response = app
        .oneshot(Request::get("/api/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert!(body["version"].is_string());
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn test_create_job_returns_201_and_is_pollable() {
    let harness = TestHarness::new(|_| {}).await;
    let app = build_router(harness.app_state());

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/jobs",
            json!({
                "source_type": "spotify_url",
                "source_value": "https://open.spotify.com/track/6y0igZArWVi6Iz0rj35c1Y"
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let created = body_json(response).await;
    let id = created["id"].as_str().unwrap().to_string();
    assert_eq!(created["status"], "pending");

    let response = app
        .clone()
        .oneshot(
            Request::get(format!("/api/jobs/{}", id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let detail = body_json(response).await;
    assert_eq!(detail["id"].as_str().unwrap(), id);
    assert!(detail["stems"].as_array().unwrap().is_empty());

    let response = app
        .oneshot(Request::get("/api/jobs?limit=5").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let list = body_json(response).await;
    assert!(list["jobs"]
        .as_array()
        .unwrap()
        .iter()
        .any(|job| job["id"].as_str().unwrap() == id));
}

#[tokio::test]
async fn test_create_job_validation() {
    let harness = TestHarness::new(|_| {}).await;
    let app = build_router(harness.app_state());

    // Empty source_value
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/jobs",
            json!({"source_type": "isrc", "source_value": "  "}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "BAD_REQUEST");

    // source_type outside the ingress whitelist
    let response = app
        .oneshot(json_request(
            "POST",
            "/api/jobs",
            json!({"source_type": "file_upload", "source_value": "/tmp/x.wav"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unknown_job_is_404() {
    let harness = TestHarness::new(|_| {}).await;
    let app = build_router(harness.app_state());

    let response = app
        .oneshot(
            Request::get(format!("/api/jobs/{}", uuid::Uuid::new_v4()))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

fn multipart_upload(filename: &str, payload: &[u8]) -> Request<Body> {
    let boundary = "test-boundary-7f4a";
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"audio\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(payload);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri("/api/jobs/upload")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={boundary}"),
        )
        .body(Body::from(body))
        .unwrap()
}

#[tokio::test]
async fn test_upload_accepts_wav_and_creates_job() {
    let harness = TestHarness::new(|_| {}).await;
    let app = build_router(harness.app_state());

    let mut wav = b"RIFF\x24\x00\x00\x00WAVEfmt ".to_vec();
    wav.extend_from_slice(&[0u8; 128]);

    let response = app
        .oneshot(multipart_upload("take1.wav", &wav))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let created = body_json(response).await;
    let id: uuid::Uuid = created["id"].as_str().unwrap().parse().unwrap();

    let job = db::jobs::load_job(&harness.db, id).await.unwrap().unwrap();
    assert_eq!(job.source_type, SourceType::FileUpload);
    assert!(
        std::path::Path::new(&job.source_value).exists(),
        "uploaded bytes must be on disk at {}",
        job.source_value
    );
}

#[tokio::test]
async fn test_upload_rejects_disallowed_extension() {
    let harness = TestHarness::new(|_| {}).await;
    let app = build_router(harness.app_state());

    let response = app
        .oneshot(multipart_upload("notes.txt", b"not audio at all"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "BAD_REQUEST");

    // No job row may exist after a rejected upload
    let jobs = db::jobs::list_recent_jobs(&harness.db, 10).await.unwrap();
    assert!(jobs.is_empty());
}

/// Insert a completed job with one vocals stem on disk
async fn completed_job_with_stem(harness: &TestHarness) -> (Job, Asset) {
    let mut job = Job::new(SourceType::Isrc, "GBAAA9800322".to_string());
    job.status = JobStatus::Completed;
    job.progress = 100;
    job.metadata.title = Some("Teardrop".to_string());
    db::jobs::insert_job(&harness.db, &job).await.unwrap();

    let stems_dir = harness.storage.stems_dir(job.id);
    std::fs::create_dir_all(&stems_dir).unwrap();
    let stem_path = stems_dir.join("vocals.wav");
    std::fs::write(&stem_path, b"RIFF-vocals").unwrap();

    let mut asset = Asset::new_stem(
        job.id,
        StemType::Vocals,
        stem_path.to_string_lossy().to_string(),
        11,
        "lalal",
        None,
    );
    db::assets::insert_asset(&harness.db, &asset).await.unwrap();

    let midi_dir = harness.storage.midi_dir(job.id);
    std::fs::create_dir_all(&midi_dir).unwrap();
    let midi_path = midi_dir.join("vocals.mid");
    std::fs::write(&midi_path, b"MThd").unwrap();
    db::assets::set_midi(&harness.db, asset.id, &midi_path.to_string_lossy())
        .await
        .unwrap();
    asset.has_midi = true;
    asset.midi_path = Some(midi_path.to_string_lossy().to_string());

    (job, asset)
}

#[tokio::test]
async fn test_stem_download_streams_attachment() {
    let harness = TestHarness::new(|_| {}).await;
    let (job, _) = completed_job_with_stem(&harness).await;
    let app = build_router(harness.app_state());

    let response = app
        .clone()
        .oneshot(
            Request::get(format!("/api/jobs/{}/stems/vocals?format=audio", job.id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE].to_str().unwrap(),
        "audio/wav"
    );
    let disposition = response.headers()[header::CONTENT_DISPOSITION]
        .to_str()
        .unwrap()
        .to_string();
    assert!(disposition.contains("Teardrop_vocals.wav"), "{}", disposition);

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&bytes[..], b"RIFF-vocals");

    // The MIDI variant
    let response = app
        .oneshot(
            Request::get(format!("/api/jobs/{}/stems/vocals?format=midi", job.id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE].to_str().unwrap(),
        "audio/midi"
    );
}

#[tokio::test]
async fn test_stem_download_guards() {
    let harness = TestHarness::new(|_| {}).await;
    let (job, _) = completed_job_with_stem(&harness).await;

    // A job that is still separating cannot serve stems
    let mut pending = Job::new(SourceType::Isrc, "USAA10000001".to_string());
    pending.status = JobStatus::Separating;
    db::jobs::insert_job(&harness.db, &pending).await.unwrap();

    let app = build_router(harness.app_state());

    let response = app
        .clone()
        .oneshot(
            Request::get(format!("/api/jobs/{}/stems/vocals", pending.id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Unknown stem type
    let response = app
        .clone()
        .oneshot(
            Request::get(format!("/api/jobs/{}/stems/theremin", job.id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Stem that was never separated
    let response = app
        .oneshot(
            Request::get(format!("/api/jobs/{}/stems/drums", job.id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_download_manifest_lists_files() {
    let harness = TestHarness::new(|_| {}).await;
    let (job, asset) = completed_job_with_stem(&harness).await;
    let app = build_router(harness.app_state());

    let response = app
        .oneshot(
            Request::get(format!("/api/jobs/{}/download", job.id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["title"], "Teardrop");
    let files = body["files"].as_array().unwrap();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0]["type"], "vocals");
    assert_eq!(files[0]["audio_path"], asset.file_path);
    assert_eq!(
        files[0]["midi_path"].as_str().unwrap(),
        asset.midi_path.as_deref().unwrap()
    );
}

#[tokio::test]
async fn test_search_endpoints_without_backends_are_503_or_400() {
    let harness = TestHarness::new(|_| {}).await;
    let app = build_router(harness.app_state());

    // No LLM gateway configured
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/search/text",
            json!({"query": "that song about teardrops", "type": "description"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    // No ACRCloud credentials configured
    let response = app
        .clone()
        .oneshot(json_request("POST", "/api/search/humming", json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    // MusicBrainz requires a query
    let response = app
        .oneshot(
            Request::get("/api/search/musicbrainz?query=")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
