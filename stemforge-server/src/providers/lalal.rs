//! LALAL.AI stem separation
//!
//! Protocol: upload the master, request a multi-stem split, poll the task
//! until it settles, then download each stem track. The poll loop sleeps a
//! fixed two seconds between checks and holds no locks while sleeping.

use super::{
    download_to_file, ProviderCredentials, ProviderError, SeparatedStem, StemProvider,
    MAX_POLL_ATTEMPTS, POLL_INTERVAL,
};
use crate::models::StemType;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

const LALAL_API_BASE_URL: &str = "https://www.lalal.ai/api";
const REQUESTED_STEMS: [&str; 5] = ["vocals", "drums", "bass", "melody", "instrumental"];

#[derive(Debug, Deserialize)]
struct UploadResponse {
    status: String,
    id: Option<String>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CheckResponse {
    status: String,
    task: Option<TaskState>,
    split: Option<SplitResult>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TaskState {
    state: String,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SplitResult {
    stem_tracks: Vec<StemTrack>,
}

#[derive(Debug, Deserialize)]
struct StemTrack {
    stem: String,
    url: String,
}

/// LALAL.AI separation client
pub struct LalalProvider {
    http_client: reqwest::Client,
    license_key: Option<String>,
}

impl LalalProvider {
    pub fn new() -> Result<Self, ProviderError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(300))
            .build()
            .map_err(ProviderError::network)?;

        Ok(Self {
            http_client,
            license_key: None,
        })
    }

    fn license(&self) -> Result<&str, ProviderError> {
        self.license_key
            .as_deref()
            .ok_or_else(|| ProviderError::NotConfigured("lalal".to_string()))
    }

    async fn upload(&self, audio_path: &Path) -> Result<String, ProviderError> {
        let license = self.license()?;
        let file_name = audio_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "master.flac".to_string());
        let bytes = tokio::fs::read(audio_path).await?;

        let response = self
            .http_client
            .post(format!("{}/upload/", LALAL_API_BASE_URL))
            .header("Authorization", format!("license {}", license))
            .header(
                "Content-Disposition",
                format!("attachment; filename={}", file_name),
            )
            .body(bytes)
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

        let upload: UploadResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;

        if upload.status != "success" {
            return Err(ProviderError::Api {
                status: 200,
                message: upload.error.unwrap_or_else(|| "upload rejected".to_string()),
            });
        }

        upload
            .id
            .ok_or_else(|| ProviderError::Parse("upload response carries no id".to_string()))
    }

    async fn request_split(&self, file_id: &str) -> Result<(), ProviderError> {
        let license = self.license()?;
        let params = serde_json::json!([{
            "id": file_id,
            "stems": REQUESTED_STEMS,
        }]);

        let response = self
            .http_client
            .post(format!("{}/split/", LALAL_API_BASE_URL))
            .header("Authorization", format!("license {}", license))
            .form(&[("params", params.to_string())])
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

        Ok(())
    }

    async fn poll_until_done(&self, file_id: &str) -> Result<SplitResult, ProviderError> {
        let license = self.license()?;

        for _ in 0..MAX_POLL_ATTEMPTS {
            let response = self
                .http_client
                .post(format!("{}/check/", LALAL_API_BASE_URL))
                .header("Authorization", format!("license {}", license))
                .form(&[("id", file_id)])
                .send()
                .await
                .map_err(ProviderError::network)?;

            let check: CheckResponse = response
                .json()
                .await
                .map_err(|e| ProviderError::Parse(e.to_string()))?;

            if check.status != "success" {
                return Err(ProviderError::Api {
                    status: 200,
                    message: check.error.unwrap_or_else(|| "check failed".to_string()),
                });
            }

            match check.task.as_ref().map(|t| t.state.as_str()) {
                Some("success") => {
                    return check.split.ok_or_else(|| {
                        ProviderError::Parse("finished task carries no split result".to_string())
                    });
                }
                Some("error") | Some("cancelled") => {
                    let message = check
                        .task
                        .and_then(|t| t.error)
                        .unwrap_or_else(|| "split task failed".to_string());
                    return Err(ProviderError::Api {
                        status: 200,
                        message,
                    });
                }
                // "progress" or not started yet
                _ => tokio::time::sleep(POLL_INTERVAL).await,
            }
        }

        Err(ProviderError::Network(
            "split task did not finish within the poll budget".to_string(),
        ))
    }
}

#[async_trait::async_trait]
impl StemProvider for LalalProvider {
    fn name(&self) -> &'static str {
        "lalal"
    }

    fn is_configured(&self) -> bool {
        self.license_key.is_some()
    }

    fn configure(&mut self, credentials: ProviderCredentials) {
        self.license_key = credentials.api_key;
    }

    async fn separate(
        &self,
        audio_path: &Path,
        output_dir: &Path,
    ) -> Result<Vec<SeparatedStem>, ProviderError> {
        tracing::info!(audio = %audio_path.display(), "Separating stems via LALAL.AI");

        let file_id = self.upload(audio_path).await?;
        self.request_split(&file_id).await?;
        let split = self.poll_until_done(&file_id).await?;

        tokio::fs::create_dir_all(output_dir).await?;

        let mut stems = Vec::with_capacity(split.stem_tracks.len());
        for track in split.stem_tracks {
            let stem_type = vendor_stem_type(&track.stem);
            let file_path = output_dir.join(format!("{}.wav", stem_type.as_str()));

            let response = self
                .http_client
                .get(&track.url)
                .send()
                .await
                .map_err(ProviderError::network)?;
            if !response.status().is_success() {
                return Err(ProviderError::Api {
                    status: response.status().as_u16(),
                    message: format!("stem download failed for {}", track.stem),
                });
            }
            let file_size = download_to_file(response, &file_path).await? as i64;

            stems.push(SeparatedStem {
                stem_type,
                file_path,
                file_size,
            });
        }

        Ok(stems)
    }
}

fn vendor_stem_type(vendor_name: &str) -> StemType {
    match vendor_name {
        "vocals" | "voice" => StemType::Vocals,
        "drum" | "drums" => StemType::Drums,
        "bass" => StemType::Bass,
        "melody" | "piano" | "synthesizer" => StemType::Melody,
        "instrumental" | "back" => StemType::Instrumental,
        _ => StemType::Other,
    }
}
