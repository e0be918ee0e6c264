//! Search adapter clients
//!
//! Auxiliary services that turn text, lyrics, or hummed audio into
//! `SongSuggestion`s. None of these participate in the job pipeline.

pub mod acrcloud_client;
pub mod llm_client;
pub mod musicbrainz_client;

pub use acrcloud_client::AcrCloudClient;
pub use llm_client::LlmClient;
pub use musicbrainz_client::MusicBrainzClient;
