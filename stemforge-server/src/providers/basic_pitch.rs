//! Basic Pitch local MIDI transcription
//!
//! Runs Spotify's `basic-pitch` command-line tool against a stem file. No
//! credentials; availability is gated on the binary being in PATH.

use super::{GeneratedMidi, MidiProvider, ProviderCredentials, ProviderError};
use crate::models::StemType;
use std::path::Path;
use std::process::Command;

const BINARY_NAME: &str = "basic-pitch";

/// Local MIDI transcription via the basic-pitch CLI
pub struct BasicPitchProvider {
    binary_available: bool,
}

impl BasicPitchProvider {
    /// Create the provider, probing PATH for the binary
    pub fn new() -> Self {
        let binary_available = Command::new("which")
            .arg(BINARY_NAME)
            .output()
            .map(|output| output.status.success())
            .unwrap_or(false);

        if binary_available {
            tracing::info!("basic-pitch available for local MIDI transcription");
        } else {
            tracing::warn!(
                "basic-pitch not found in PATH - local MIDI transcription disabled"
            );
        }

        Self { binary_available }
    }
}

impl Default for BasicPitchProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl MidiProvider for BasicPitchProvider {
    fn name(&self) -> &'static str {
        "basic_pitch"
    }

    fn is_configured(&self) -> bool {
        self.binary_available
    }

    fn configure(&mut self, _credentials: ProviderCredentials) {
        // Local tool, nothing to configure
    }

    async fn generate(
        &self,
        audio_path: &Path,
        output_dir: &Path,
        stem_type: StemType,
    ) -> Result<GeneratedMidi, ProviderError> {
        if !self.binary_available {
            return Err(ProviderError::NotConfigured("basic_pitch".to_string()));
        }

        tokio::fs::create_dir_all(output_dir).await?;

        tracing::info!(
            audio = %audio_path.display(),
            stem = stem_type.as_str(),
            "Transcribing stem to MIDI via basic-pitch"
        );

        let output = tokio::process::Command::new(BINARY_NAME)
            .arg(output_dir)
            .arg(audio_path)
            .arg("--save-midi")
            .output()
            .await
            .map_err(|e| ProviderError::Process(format!("failed to launch basic-pitch: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ProviderError::Process(format!(
                "basic-pitch exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        // basic-pitch names its output `<input stem>_basic_pitch.mid`
        let input_stem = audio_path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "audio".to_string());
        let produced = output_dir.join(format!("{}_basic_pitch.mid", input_stem));
        let midi_path = output_dir.join(format!("{}.mid", stem_type.as_str()));

        if !produced.exists() {
            return Err(ProviderError::Process(format!(
                "basic-pitch produced no MIDI at {}",
                produced.display()
            )));
        }
        tokio::fs::rename(&produced, &midi_path).await?;

        let file_size = tokio::fs::metadata(&midi_path).await?.len() as i64;

        Ok(GeneratedMidi {
            midi_path,
            file_size,
        })
    }
}
