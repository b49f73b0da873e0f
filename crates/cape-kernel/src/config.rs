//! Configuration loading from `~/.cape/config.toml` with defaults.

use cape_types::config::{cape_home, CapeConfig};
use std::path::{Path, PathBuf};
use tracing::info;

/// Default config file location.
pub fn default_config_path() -> PathBuf {
    cape_home().join("config.toml")
}

/// Load node configuration from a TOML file, with defaults.
///
/// A missing, unreadable or malformed file yields [`CapeConfig::default`].
pub fn load_config(path: Option<&Path>) -> CapeConfig {
    let config_path = path
        .map(|p| p.to_path_buf())
        .unwrap_or_else(default_config_path);

    if !config_path.exists() {
        info!(
            path = %config_path.display(),
            "Config file not found, using defaults"
        );
        return CapeConfig::default();
    }

    match std::fs::read_to_string(&config_path) {
        Ok(contents) => match toml::from_str::<CapeConfig>(&contents) {
            Ok(config) => {
                info!(path = %config_path.display(), "Loaded configuration");
                config
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    path = %config_path.display(),
                    "Failed to parse config, using defaults"
                );
                CapeConfig::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                error = %e,
                path = %config_path.display(),
                "Failed to read config file, using defaults"
            );
            CapeConfig::default()
        }
    }
}
