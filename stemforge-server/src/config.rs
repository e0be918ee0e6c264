//! Server configuration
//!
//! Tunables resolve CLI → ENV → TOML → default; provider credentials come
//! from environment variables (one pair per service), with the persisted
//! `provider_configs` rows as the registry's fallback.

use clap::Parser;
use std::path::PathBuf;
use stemforge_common::config::{self, TomlConfig};

const DEFAULT_PORT: u16 = 5740;
const DEFAULT_RETENTION_HOURS: i64 = 24;
const DEFAULT_REAPER_INTERVAL_SECS: u64 = 3600;

/// Command-line arguments
#[derive(Debug, Parser)]
#[command(name = "stemforge-server", about = "Stem & MIDI extraction backend")]
pub struct Cli {
    /// Filesystem root for uploads, masters, stems and MIDI
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// SQLite database file path
    #[arg(long)]
    pub database_path: Option<String>,

    /// HTTP listen port
    #[arg(long, env = "STEMFORGE_PORT")]
    pub port: Option<u16>,

    /// Allowed CORS origin
    #[arg(long, env = "STEMFORGE_CORS_ORIGIN")]
    pub cors_origin: Option<String>,

    /// Asset retention window in hours
    #[arg(long, env = "STEMFORGE_RETENTION_HOURS")]
    pub retention_hours: Option<i64>,
}

/// Fully resolved server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub storage_dir: PathBuf,
    pub database_path: PathBuf,
    pub cors_origin: Option<String>,
    pub retention_hours: i64,
    pub reaper_interval_secs: u64,
    pub preferred_stem_provider: Option<String>,
    pub preferred_midi_provider: Option<String>,

    // Provider credentials, one pair per external service
    pub songlink_api_key: Option<String>,
    pub spotify_client_id: Option<String>,
    pub spotify_client_secret: Option<String>,
    pub apple_music_token: Option<String>,
    pub tidal_client_id: Option<String>,
    pub tidal_client_secret: Option<String>,
    pub deezer_arl: Option<String>,
    pub qobuz_app_id: Option<String>,
    pub qobuz_user_token: Option<String>,
    pub lalal_license_key: Option<String>,
    pub fadr_api_key: Option<String>,
    pub acrcloud_host: Option<String>,
    pub acrcloud_access_key: Option<String>,
    pub acrcloud_access_secret: Option<String>,
    pub llm_base_url: Option<String>,
    pub llm_api_key: Option<String>,
    pub llm_model: Option<String>,
}

impl ServerConfig {
    /// Resolve configuration from CLI arguments, environment, and TOML
    pub fn load(cli: &Cli) -> Self {
        let toml_config: TomlConfig = config::load_toml_config();

        let storage_dir = config::resolve_storage_dir(cli.storage_dir.as_deref(), &toml_config);
        let database_path = config::resolve_database_path(
            cli.database_path.as_deref(),
            &toml_config,
            &storage_dir,
        );

        Self {
            port: cli.port.or(toml_config.port).unwrap_or(DEFAULT_PORT),
            storage_dir,
            database_path,
            cors_origin: cli.cors_origin.clone().or(toml_config.cors_origin),
            retention_hours: cli
                .retention_hours
                .or(toml_config.retention_hours)
                .unwrap_or(DEFAULT_RETENTION_HOURS),
            reaper_interval_secs: env_var("STEMFORGE_REAPER_INTERVAL_SECS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_REAPER_INTERVAL_SECS),
            preferred_stem_provider: env_var("STEMFORGE_PREFERRED_STEM_PROVIDER")
                .or(toml_config.preferred_stem_provider),
            preferred_midi_provider: env_var("STEMFORGE_PREFERRED_MIDI_PROVIDER")
                .or(toml_config.preferred_midi_provider),

            songlink_api_key: env_var("STEMFORGE_SONGLINK_API_KEY"),
            spotify_client_id: env_var("STEMFORGE_SPOTIFY_CLIENT_ID"),
            spotify_client_secret: env_var("STEMFORGE_SPOTIFY_CLIENT_SECRET"),
            apple_music_token: env_var("STEMFORGE_APPLE_MUSIC_TOKEN"),
            tidal_client_id: env_var("STEMFORGE_TIDAL_CLIENT_ID"),
            tidal_client_secret: env_var("STEMFORGE_TIDAL_CLIENT_SECRET"),
            deezer_arl: env_var("STEMFORGE_DEEZER_ARL"),
            qobuz_app_id: env_var("STEMFORGE_QOBUZ_APP_ID"),
            qobuz_user_token: env_var("STEMFORGE_QOBUZ_USER_TOKEN"),
            lalal_license_key: env_var("STEMFORGE_LALAL_LICENSE_KEY"),
            fadr_api_key: env_var("STEMFORGE_FADR_API_KEY"),
            acrcloud_host: env_var("STEMFORGE_ACRCLOUD_HOST"),
            acrcloud_access_key: env_var("STEMFORGE_ACRCLOUD_ACCESS_KEY"),
            acrcloud_access_secret: env_var("STEMFORGE_ACRCLOUD_ACCESS_SECRET"),
            llm_base_url: env_var("STEMFORGE_LLM_BASE_URL"),
            llm_api_key: env_var("STEMFORGE_LLM_API_KEY"),
            llm_model: env_var("STEMFORGE_LLM_MODEL"),
        }
    }

    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::hours(self.retention_hours)
    }
}

/// Non-empty environment variable lookup
fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_applied() {
        let cli = Cli {
            storage_dir: Some("/tmp/stemforge-test".to_string()),
            database_path: None,
            port: None,
            cors_origin: None,
            retention_hours: None,
        };
        let config = ServerConfig::load(&cli);
        assert_eq!(config.retention_hours, DEFAULT_RETENTION_HOURS);
        assert_eq!(
            config.retention(),
            chrono::Duration::hours(DEFAULT_RETENTION_HOURS)
        );
        assert_eq!(
            config.database_path,
            PathBuf::from("/tmp/stemforge-test/stemforge.db")
        );
    }

    #[test]
    fn test_cli_overrides_default_port() {
        let cli = Cli {
            storage_dir: Some("/tmp/stemforge-test".to_string()),
            database_path: None,
            port: Some(9000),
            cors_origin: None,
            retention_hours: Some(48),
        };
        let config = ServerConfig::load(&cli);
        assert_eq!(config.port, 9000);
        assert_eq!(config.retention_hours, 48);
    }
}
