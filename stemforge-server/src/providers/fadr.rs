//! Fadr stem separation and MIDI transcription
//!
//! One client implements both capabilities: an uploaded asset is analyzed for
//! stems, and an uploaded stem can be analyzed for MIDI. Both follow the same
//! presigned-upload → analyze → poll → download shape.

use super::{
    download_to_file, GeneratedMidi, MidiProvider, ProviderCredentials, ProviderError,
    SeparatedStem, StemProvider, MAX_POLL_ATTEMPTS, POLL_INTERVAL,
};
use crate::models::StemType;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

const FADR_API_BASE_URL: &str = "https://api.fadr.com";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadSlot {
    url: String,
    s3_path: String,
}

#[derive(Debug, Deserialize)]
struct AssetResponse {
    asset: FadrAsset,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FadrAsset {
    #[serde(rename = "_id")]
    id: String,
    stems: Option<Vec<FadrStem>>,
    midi_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FadrStem {
    stem_type: String,
    url: String,
}

/// Fadr client for separation and MIDI
pub struct FadrProvider {
    http_client: reqwest::Client,
    api_key: Option<String>,
}

impl FadrProvider {
    pub fn new() -> Result<Self, ProviderError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(300))
            .build()
            .map_err(ProviderError::network)?;

        Ok(Self {
            http_client,
            api_key: None,
        })
    }

    fn api_key(&self) -> Result<&str, ProviderError> {
        self.api_key
            .as_deref()
            .ok_or_else(|| ProviderError::NotConfigured("fadr".to_string()))
    }

    async fn post_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<T, ProviderError> {
        let api_key = self.api_key()?;
        let response = self
            .http_client
            .post(format!("{}{}", FADR_API_BASE_URL, path))
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(ProviderError::network)?;

        let status = response.status();
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

        response
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))
    }

    /// Upload a local file and register it as a Fadr asset
    async fn upload_asset(&self, audio_path: &Path) -> Result<String, ProviderError> {
        let extension = audio_path
            .extension()
            .map(|e| e.to_string_lossy().to_string())
            .unwrap_or_else(|| "wav".to_string());

        let slot: UploadSlot = self
            .post_json("/assets/upload2", serde_json::json!({ "extension": extension }))
            .await?;

        let bytes = tokio::fs::read(audio_path).await?;
        let response = self
            .http_client
            .put(&slot.url)
            .body(bytes)
            .send()
            .await
            .map_err(ProviderError::network)?;
        if !response.status().is_success() {
            return Err(ProviderError::Api {
                status: response.status().as_u16(),
                message: "presigned upload failed".to_string(),
            });
        }

        let name = audio_path
            .file_stem()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "audio".to_string());
        let asset: AssetResponse = self
            .post_json(
                "/assets",
                serde_json::json!({ "name": name, "extension": extension, "s3Path": slot.s3_path }),
            )
            .await?;

        Ok(asset.asset.id)
    }

    async fn poll_asset<F, T>(&self, asset_id: &str, mut extract: F) -> Result<T, ProviderError>
    where
        F: FnMut(&FadrAsset) -> Option<T>,
    {
        let api_key = self.api_key()?;

        for _ in 0..MAX_POLL_ATTEMPTS {
            let response = self
                .http_client
                .get(format!("{}/assets/{}", FADR_API_BASE_URL, asset_id))
                .bearer_auth(api_key)
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

            let asset: AssetResponse = response
                .json()
                .await
                .map_err(|e| ProviderError::Parse(e.to_string()))?;

            if let Some(result) = extract(&asset.asset) {
                return Ok(result);
            }

            tokio::time::sleep(POLL_INTERVAL).await;
        }

        Err(ProviderError::Network(
            "analysis did not finish within the poll budget".to_string(),
        ))
    }
}

#[async_trait::async_trait]
impl StemProvider for FadrProvider {
    fn name(&self) -> &'static str {
        "fadr"
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    fn configure(&mut self, credentials: ProviderCredentials) {
        self.api_key = credentials.api_key;
    }

    async fn separate(
        &self,
        audio_path: &Path,
        output_dir: &Path,
    ) -> Result<Vec<SeparatedStem>, ProviderError> {
        tracing::info!(audio = %audio_path.display(), "Separating stems via Fadr");

        let asset_id = self.upload_asset(audio_path).await?;
        let _: serde_json::Value = self
            .post_json(
                &format!("/assets/analyze/{}", asset_id),
                serde_json::json!({}),
            )
            .await?;

        let vendor_stems = self
            .poll_asset(&asset_id, |asset| {
                asset.stems.clone().filter(|stems| !stems.is_empty())
            })
            .await?;

        tokio::fs::create_dir_all(output_dir).await?;

        let mut stems = Vec::with_capacity(vendor_stems.len());
        for stem in vendor_stems {
            let stem_type = vendor_stem_type(&stem.stem_type);
            let file_path = output_dir.join(format!("{}.wav", stem_type.as_str()));

            let response = self
                .http_client
                .get(&stem.url)
                .send()
                .await
                .map_err(ProviderError::network)?;
            if !response.status().is_success() {
                return Err(ProviderError::Api {
                    status: response.status().as_u16(),
                    message: format!("stem download failed for {}", stem.stem_type),
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

#[async_trait::async_trait]
impl MidiProvider for FadrProvider {
    fn name(&self) -> &'static str {
        "fadr"
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    fn configure(&mut self, credentials: ProviderCredentials) {
        self.api_key = credentials.api_key;
    }

    async fn generate(
        &self,
        audio_path: &Path,
        output_dir: &Path,
        stem_type: StemType,
    ) -> Result<GeneratedMidi, ProviderError> {
        tracing::info!(
            audio = %audio_path.display(),
            stem = stem_type.as_str(),
            "Transcribing stem to MIDI via Fadr"
        );

        let asset_id = self.upload_asset(audio_path).await?;
        let _: serde_json::Value = self
            .post_json(
                &format!("/assets/analyze-midi/{}", asset_id),
                serde_json::json!({}),
            )
            .await?;

        let midi_url = self
            .poll_asset(&asset_id, |asset| asset.midi_url.clone())
            .await?;

        tokio::fs::create_dir_all(output_dir).await?;
        let midi_path = output_dir.join(format!("{}.mid", stem_type.as_str()));

        let response = self
            .http_client
            .get(&midi_url)
            .send()
            .await
            .map_err(ProviderError::network)?;
        if !response.status().is_success() {
            return Err(ProviderError::Api {
                status: response.status().as_u16(),
                message: "MIDI download failed".to_string(),
            });
        }
        let file_size = download_to_file(response, &midi_path).await? as i64;

        Ok(GeneratedMidi {
            midi_path,
            file_size,
        })
    }
}

fn vendor_stem_type(vendor_name: &str) -> StemType {
    match vendor_name {
        "vocals" => StemType::Vocals,
        "drums" => StemType::Drums,
        "bass" => StemType::Bass,
        "melody" | "keys" => StemType::Melody,
        "instrumental" => StemType::Instrumental,
        _ => StemType::Other,
    }
}
