//! Domain models

mod asset;
mod job;
mod provider_config;
mod suggestion;

pub use asset::{Asset, AssetType, StemType};
pub use job::{Job, JobStatus, JobUpdate, PlatformIds, SourceType, TrackMetadata};
pub use provider_config::ProviderConfig;
pub use suggestion::{SongSuggestion, SuggestionSource};
