//! Provider registry and selection algorithms
//!
//! Holds a typed list per capability. Selection rules:
//!
//! - **Identification**: only the implementation whose capability matches the
//!   source type is tried.
//! - **Acquisition**: platform-native IDs first (tidal, deezer, qobuz order),
//!   then ISRC search over providers sorted by `(is_configured desc,
//!   priority asc)` with registration order breaking ties, then unconfigured
//!   providers with public search paths (ID resolution only, never a
//!   download).
//! - **Separation / MIDI**: the configured preferred provider first,
//!   otherwise registration order; first success wins.
//!
//! A provider that errors is a miss for that job, never a global disable.
//! Before every dispatch the declarative quota in `provider_configs` is
//! consulted; an exhausted or disabled service is skipped as a miss.

use super::{
    DownloadedTrack, GeneratedMidi, IdentifiedTrack, MidiProvider, ProviderCredentials,
    SeparatedStem, StemProvider, StreamingProvider, TrackIdentifier,
};
use crate::config::ServerConfig;
use crate::db::provider_configs;
use crate::models::{Job, SourceType, StemType};
use crate::pipeline::PipelineError;
use sqlx::SqlitePool;
use std::path::Path;
use std::sync::Arc;

pub struct ProviderRegistry {
    db: SqlitePool,
    identifiers: Vec<Arc<dyn TrackIdentifier>>,
    streaming: Vec<Arc<dyn StreamingProvider>>,
    stems: Vec<Arc<dyn StemProvider>>,
    midi: Vec<Arc<dyn MidiProvider>>,
    preferred_stem_provider: Option<String>,
    preferred_midi_provider: Option<String>,
}

impl ProviderRegistry {
    /// Empty registry; tests and `from_config` populate it
    pub fn new(db: SqlitePool) -> Self {
        Self {
            db,
            identifiers: Vec::new(),
            streaming: Vec::new(),
            stems: Vec::new(),
            midi: Vec::new(),
            preferred_stem_provider: None,
            preferred_midi_provider: None,
        }
    }

    /// Build the full production registry from resolved configuration
    ///
    /// Credentials resolve env-first, then the persisted `provider_configs`
    /// row for the service.
    pub async fn from_config(db: SqlitePool, config: &ServerConfig) -> Self {
        let mut registry = Self::new(db.clone());
        registry.preferred_stem_provider = config.preferred_stem_provider.clone();
        registry.preferred_midi_provider = config.preferred_midi_provider.clone();

        // Identifiers
        if let Ok(mut songlink) = super::songlink::SonglinkResolver::new() {
            if let Some(creds) = resolve_credentials(
                &db,
                "songlink",
                config.songlink_api_key.clone(),
                None,
            )
            .await
            {
                songlink.configure(creds);
            }
            registry.register_identifier(Arc::new(songlink));
        }
        if let Ok(mut spotify) = super::spotify::SpotifyLookup::new() {
            if let Some(creds) = resolve_credentials(
                &db,
                "spotify",
                config.spotify_client_id.clone(),
                config.spotify_client_secret.clone(),
            )
            .await
            {
                spotify.configure(creds);
            }
            registry.register_identifier(Arc::new(spotify));
        }
        if let Ok(mut apple) = super::apple_music::AppleMusicLookup::new() {
            if let Some(creds) =
                resolve_credentials(&db, "apple_music", config.apple_music_token.clone(), None)
                    .await
            {
                apple.configure(creds);
            }
            registry.register_identifier(Arc::new(apple));
        }

        // Streaming providers, in acquisition priority order
        if let Ok(mut tidal) = super::tidal::TidalProvider::new() {
            if let Some(creds) = resolve_credentials(
                &db,
                "tidal",
                config.tidal_client_id.clone(),
                config.tidal_client_secret.clone(),
            )
            .await
            {
                tidal.configure(creds);
            }
            registry.register_streaming(Arc::new(tidal));
        }
        if let Ok(mut deezer) = super::deezer::DeezerProvider::new() {
            if let Some(creds) =
                resolve_credentials(&db, "deezer", config.deezer_arl.clone(), None).await
            {
                deezer.configure(creds);
            }
            registry.register_streaming(Arc::new(deezer));
        }
        if let Ok(mut qobuz) = super::qobuz::QobuzProvider::new() {
            if let Some(creds) = resolve_credentials(
                &db,
                "qobuz",
                config.qobuz_app_id.clone(),
                config.qobuz_user_token.clone(),
            )
            .await
            {
                qobuz.configure(creds);
            }
            registry.register_streaming(Arc::new(qobuz));
        }

        // Stem separation
        if let Ok(mut lalal) = super::lalal::LalalProvider::new() {
            if let Some(creds) =
                resolve_credentials(&db, "lalal", config.lalal_license_key.clone(), None).await
            {
                lalal.configure(creds);
            }
            registry.register_stem(Arc::new(lalal));
        }
        if let Ok(mut fadr) = super::fadr::FadrProvider::new() {
            if let Some(creds) =
                resolve_credentials(&db, "fadr", config.fadr_api_key.clone(), None).await
            {
                StemProvider::configure(&mut fadr, creds);
            }
            let fadr = Arc::new(fadr);
            registry.register_stem(fadr.clone());
            registry.register_midi(fadr);
        }

        // MIDI: local basic-pitch is registered first so it wins in
        // registration order when available
        let basic_pitch = super::basic_pitch::BasicPitchProvider::new();
        registry.midi.insert(0, Arc::new(basic_pitch));

        registry
    }

    pub fn register_identifier(&mut self, provider: Arc<dyn TrackIdentifier>) {
        self.identifiers.push(provider);
    }

    pub fn register_streaming(&mut self, provider: Arc<dyn StreamingProvider>) {
        self.streaming.push(provider);
    }

    pub fn register_stem(&mut self, provider: Arc<dyn StemProvider>) {
        self.stems.push(provider);
    }

    pub fn register_midi(&mut self, provider: Arc<dyn MidiProvider>) {
        self.midi.push(provider);
    }

    pub fn set_preferred_stem_provider(&mut self, name: Option<String>) {
        self.preferred_stem_provider = name;
    }

    pub fn set_preferred_midi_provider(&mut self, name: Option<String>) {
        self.preferred_midi_provider = name;
    }

    /// Resolve a source reference through the matching identifier
    pub async fn identify(
        &self,
        source_type: SourceType,
        source_value: &str,
    ) -> Result<Option<IdentifiedTrack>, PipelineError> {
        let Some(identifier) = self
            .identifiers
            .iter()
            .find(|i| i.handles(source_type))
        else {
            tracing::warn!(
                source_type = source_type.as_str(),
                "No identifier registered for source type"
            );
            return Ok(None);
        };

        if !self.dispatch_allowed(identifier.name()).await {
            return Err(PipelineError::IdentificationFailed(format!(
                "identification service {} is rate limited",
                identifier.name()
            )));
        }
        self.record_dispatch(identifier.name()).await;

        Ok(identifier.identify(source_type, source_value).await?)
    }

    /// Acquisition selection; see module docs for the full algorithm
    ///
    /// Returns the winning service name alongside the download.
    pub async fn acquire(
        &self,
        job: &Job,
        output_path: &Path,
    ) -> Result<(String, DownloadedTrack), PipelineError> {
        // Step 1: platform-native IDs in declared order
        if let Some(ids) = &job.songlink_data {
            let native = [
                ("tidal", ids.tidal_id.as_deref()),
                ("deezer", ids.deezer_id.as_deref()),
                ("qobuz", ids.qobuz_id.as_deref()),
            ];
            for (name, track_id) in native {
                let Some(track_id) = track_id else { continue };
                let Some(provider) = self.streaming_by_name(name) else {
                    continue;
                };
                if !provider.is_configured() || !self.dispatch_allowed(name).await {
                    continue;
                }
                self.record_dispatch(name).await;

                match provider.download_track(track_id, output_path).await {
                    Ok(download) => return Ok((name.to_string(), download)),
                    Err(e) => {
                        tracing::warn!(
                            job_id = %job.id,
                            provider = name,
                            track_id = %track_id,
                            error = %e,
                            "Native-ID download failed, trying next provider"
                        );
                    }
                }
            }
        }

        // Step 2: ISRC search over (is_configured desc, priority asc);
        // the sort is stable so equal keys keep registration order
        let mut detail = String::new();
        if let Some(isrc) = job.metadata.isrc.as_deref() {
            let mut ordered: Vec<&Arc<dyn StreamingProvider>> = self.streaming.iter().collect();
            ordered.sort_by_key(|p| (!p.is_configured(), p.priority()));

            for provider in ordered.iter().filter(|p| p.is_configured()) {
                let name = provider.name();
                if !self.dispatch_allowed(name).await {
                    continue;
                }
                self.record_dispatch(name).await;

                let track_id = match provider.search_by_isrc(isrc).await {
                    Ok(Some(track_id)) => track_id,
                    Ok(None) => {
                        tracing::debug!(job_id = %job.id, provider = name, isrc, "ISRC not in catalog");
                        continue;
                    }
                    Err(e) => {
                        tracing::warn!(job_id = %job.id, provider = name, error = %e, "ISRC search failed");
                        continue;
                    }
                };

                match provider.download_track(&track_id, output_path).await {
                    Ok(download) => return Ok((name.to_string(), download)),
                    Err(e) => {
                        tracing::warn!(
                            job_id = %job.id,
                            provider = name,
                            track_id = %track_id,
                            error = %e,
                            "Download failed, trying next provider"
                        );
                    }
                }
            }

            // Step 3: unconfigured providers with public search paths resolve
            // the ID only, to enrich the operator-facing error
            for provider in ordered
                .iter()
                .filter(|p| !p.is_configured() && p.supports_public_search())
            {
                if let Ok(Some(track_id)) = provider.search_by_isrc(isrc).await {
                    detail = format!(
                        " (track is available on {} as id {}, but download credentials are missing)",
                        provider.name(),
                        track_id
                    );
                    break;
                }
            }
        }

        Err(PipelineError::AcquisitionUnavailable(detail))
    }

    /// Separation selection: preferred provider first, then registration order
    pub async fn separate(
        &self,
        audio_path: &Path,
        output_dir: &Path,
    ) -> Result<(String, Vec<SeparatedStem>), PipelineError> {
        let mut last_failure: Option<String> = None;
        let mut any_configured = false;

        let mut ordered: Vec<&Arc<dyn StemProvider>> = self.stems.iter().collect();
        if let Some(preferred) = self.preferred_stem_provider.as_deref() {
            if let Some(pos) = ordered.iter().position(|p| p.name() == preferred) {
                let preferred = ordered.remove(pos);
                ordered.insert(0, preferred);
            }
        }

        for provider in ordered {
            if !provider.is_configured() {
                continue;
            }
            any_configured = true;

            let name = provider.name();
            if !self.dispatch_allowed(name).await {
                last_failure = Some(format!("{} is rate limited", name));
                continue;
            }
            self.record_dispatch(name).await;

            match provider.separate(audio_path, output_dir).await {
                Ok(stems) if !stems.is_empty() => return Ok((name.to_string(), stems)),
                Ok(_) => {
                    last_failure = Some(format!("{} returned no stems", name));
                }
                Err(e) => {
                    tracing::warn!(provider = name, error = %e, "Stem separation failed");
                    last_failure = Some(format!("{}: {}", name, e));
                }
            }
        }

        let message = if any_configured {
            last_failure.unwrap_or_else(|| "all providers failed".to_string())
        } else {
            "no stem separation provider is configured".to_string()
        };
        Err(PipelineError::SeparationFailed(message))
    }

    /// MIDI selection: preferred provider first, then registration order
    pub async fn generate_midi(
        &self,
        audio_path: &Path,
        output_dir: &Path,
        stem_type: StemType,
    ) -> Result<(String, GeneratedMidi), PipelineError> {
        let mut last_failure: Option<String> = None;
        let mut any_configured = false;

        let mut ordered: Vec<&Arc<dyn MidiProvider>> = self.midi.iter().collect();
        if let Some(preferred) = self.preferred_midi_provider.as_deref() {
            if let Some(pos) = ordered.iter().position(|p| p.name() == preferred) {
                let preferred = ordered.remove(pos);
                ordered.insert(0, preferred);
            }
        }

        for provider in ordered {
            if !provider.is_configured() {
                continue;
            }
            any_configured = true;

            let name = provider.name();
            if !self.dispatch_allowed(name).await {
                last_failure = Some(format!("{} is rate limited", name));
                continue;
            }
            self.record_dispatch(name).await;

            match provider.generate(audio_path, output_dir, stem_type).await {
                Ok(midi) => return Ok((name.to_string(), midi)),
                Err(e) => {
                    tracing::warn!(provider = name, stem = stem_type.as_str(), error = %e, "MIDI generation failed");
                    last_failure = Some(format!("{}: {}", name, e));
                }
            }
        }

        let message = if any_configured {
            last_failure.unwrap_or_else(|| "all providers failed".to_string())
        } else {
            "no MIDI provider is configured".to_string()
        };
        Err(PipelineError::MidiFailed(message))
    }

    fn streaming_by_name(&self, name: &str) -> Option<&Arc<dyn StreamingProvider>> {
        self.streaming.iter().find(|p| p.name() == name)
    }

    /// Declarative quota gate; database trouble never blocks a dispatch
    async fn dispatch_allowed(&self, service_name: &str) -> bool {
        match provider_configs::dispatch_allowed(&self.db, service_name).await {
            Ok(allowed) => allowed,
            Err(e) => {
                tracing::warn!(service = service_name, error = %e, "Quota check failed, allowing dispatch");
                true
            }
        }
    }

    async fn record_dispatch(&self, service_name: &str) {
        if let Err(e) = provider_configs::record_dispatch(&self.db, service_name).await {
            tracing::warn!(service = service_name, error = %e, "Failed to record dispatch");
        }
    }
}

async fn resolve_credentials(
    db: &SqlitePool,
    service_name: &str,
    env_key: Option<String>,
    env_secret: Option<String>,
) -> Option<ProviderCredentials> {
    if env_key.is_some() {
        return Some(ProviderCredentials {
            api_key: env_key,
            api_secret: env_secret,
        });
    }

    match provider_configs::load_config(db, service_name).await {
        Ok(Some(config)) if config.api_key.is_some() => Some(ProviderCredentials {
            api_key: config.api_key,
            api_secret: config.api_secret,
        }),
        Ok(_) => None,
        Err(e) => {
            tracing::warn!(service = service_name, error = %e, "Failed to load provider config");
            None
        }
    }
}
