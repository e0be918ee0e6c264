//! Content-addressed filesystem layout
//!
//! ```text
//! {root}/uploads/<uuid>.<ext>        ingress-uploaded files
//! {root}/audio/<job_id>/master.flac  acquired master
//! {root}/stems/<job_id>/<stem>.wav   separated stems
//! {root}/midi/<job_id>/<stem>.mid    transcriptions
//! ```
//!
//! No directory is shared between jobs; the reaper removes the three per-job
//! directories as a unit.

use crate::models::StemType;
use std::path::{Path, PathBuf};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct Storage {
    root: PathBuf,
}

impl Storage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the four storage roots; called once at startup
    pub fn bootstrap(&self) -> std::io::Result<()> {
        for dir in ["uploads", "audio", "stems", "midi"] {
            std::fs::create_dir_all(self.root.join(dir))?;
        }
        Ok(())
    }

    pub fn uploads_dir(&self) -> PathBuf {
        self.root.join("uploads")
    }

    pub fn upload_path(&self, id: Uuid, extension: &str) -> PathBuf {
        self.uploads_dir().join(format!("{}.{}", id, extension))
    }

    pub fn audio_dir(&self, job_id: Uuid) -> PathBuf {
        self.root.join("audio").join(job_id.to_string())
    }

    /// Canonical destination for an acquired master
    pub fn master_path(&self, job_id: Uuid) -> PathBuf {
        self.audio_dir(job_id).join("master.flac")
    }

    pub fn stems_dir(&self, job_id: Uuid) -> PathBuf {
        self.root.join("stems").join(job_id.to_string())
    }

    pub fn stem_path(&self, job_id: Uuid, stem_type: StemType) -> PathBuf {
        self.stems_dir(job_id)
            .join(format!("{}.wav", stem_type.as_str()))
    }

    pub fn midi_dir(&self, job_id: Uuid) -> PathBuf {
        self.root.join("midi").join(job_id.to_string())
    }

    pub fn midi_path(&self, job_id: Uuid, stem_type: StemType) -> PathBuf {
        self.midi_dir(job_id)
            .join(format!("{}.mid", stem_type.as_str()))
    }

    /// Remove every on-disk trace of a job; missing directories are ignored
    pub async fn remove_job_dirs(&self, job_id: Uuid) -> std::io::Result<()> {
        for dir in [
            self.audio_dir(job_id),
            self.stems_dir(job_id),
            self.midi_dir(job_id),
        ] {
            match tokio::fs::remove_dir_all(&dir).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}
