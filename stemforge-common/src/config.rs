//! Configuration loading and storage root resolution
//!
//! Resolution priority for every tunable:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. Compiled default (fallback)

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Optional TOML configuration file contents
///
/// Lives at `~/.config/stemforge/config.toml` (or `/etc/stemforge/config.toml`
/// system-wide). Every field is optional; missing fields fall through to the
/// compiled defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Filesystem root for uploads, masters, stems and MIDI
    pub storage_dir: Option<String>,
    /// SQLite database file path
    pub database_path: Option<String>,
    /// HTTP listen port
    pub port: Option<u16>,
    /// Allowed CORS origin (None = permissive)
    pub cors_origin: Option<String>,
    /// Asset retention window in hours
    pub retention_hours: Option<i64>,
    /// Preferred stem separation service, tried before registration order
    pub preferred_stem_provider: Option<String>,
    /// Preferred MIDI transcription service
    pub preferred_midi_provider: Option<String>,
}

/// Load the TOML config file if one exists
pub fn load_toml_config() -> TomlConfig {
    let path = match config_file_path() {
        Ok(path) => path,
        Err(_) => return TomlConfig::default(),
    };

    match std::fs::read_to_string(&path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to parse config file, using defaults");
                TomlConfig::default()
            }
        },
        Err(_) => TomlConfig::default(),
    }
}

/// Resolve the storage root following the standard priority order
pub fn resolve_storage_dir(cli_arg: Option<&str>, toml_config: &TomlConfig) -> PathBuf {
    if let Some(path) = cli_arg {
        return PathBuf::from(path);
    }

    if let Ok(path) = std::env::var("STEMFORGE_STORAGE_DIR") {
        return PathBuf::from(path);
    }

    if let Some(path) = &toml_config.storage_dir {
        return PathBuf::from(path);
    }

    default_storage_dir()
}

/// Resolve the database file path following the standard priority order
///
/// Default: `{storage_dir}/stemforge.db` so a single directory carries all
/// durable state.
pub fn resolve_database_path(
    cli_arg: Option<&str>,
    toml_config: &TomlConfig,
    storage_dir: &std::path::Path,
) -> PathBuf {
    if let Some(path) = cli_arg {
        return PathBuf::from(path);
    }

    if let Ok(path) = std::env::var("STEMFORGE_DATABASE_PATH") {
        return PathBuf::from(path);
    }

    if let Some(path) = &toml_config.database_path {
        return PathBuf::from(path);
    }

    storage_dir.join("stemforge.db")
}

/// Get the configuration file path for the platform
fn config_file_path() -> Result<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join("stemforge").join("config.toml"));
    if let Some(path) = user_config {
        if path.exists() {
            return Ok(path);
        }
    }

    let system_config = PathBuf::from("/etc/stemforge/config.toml");
    if system_config.exists() {
        return Ok(system_config);
    }

    Err(Error::Config("No config file found".to_string()))
}

/// OS-dependent default storage root
fn default_storage_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("stemforge"))
        .unwrap_or_else(|| PathBuf::from("./stemforge_data"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_arg_wins() {
        let toml = TomlConfig {
            storage_dir: Some("/from/toml".to_string()),
            ..Default::default()
        };
        let resolved = resolve_storage_dir(Some("/from/cli"), &toml);
        assert_eq!(resolved, PathBuf::from("/from/cli"));
    }

    #[test]
    fn test_toml_used_when_no_cli_or_env() {
        // Env var must be absent for this assertion to hold; harmless if the
        // test environment sets it, so guard.
        if std::env::var("STEMFORGE_STORAGE_DIR").is_ok() {
            return;
        }
        let toml = TomlConfig {
            storage_dir: Some("/from/toml".to_string()),
            ..Default::default()
        };
        assert_eq!(resolve_storage_dir(None, &toml), PathBuf::from("/from/toml"));
    }

    #[test]
    fn test_database_path_defaults_under_storage() {
        if std::env::var("STEMFORGE_DATABASE_PATH").is_ok() {
            return;
        }
        let toml = TomlConfig::default();
        let resolved = resolve_database_path(None, &toml, std::path::Path::new("/data"));
        assert_eq!(resolved, PathBuf::from("/data/stemforge.db"));
    }
}
