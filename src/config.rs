//! Configuration loading and persistence.
//!
//! Reads `config.json` from the pushnotif config directory and applies
//! environment variable overrides on top.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::constants;

/// Configuration shared by the delivery agent, the lifecycle and the CLI.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Base URL of the collaborator (`/vapid-public-key`, `/subscribe`, `/trigger`).
    pub api_base: String,
    /// Registration scope of the delivery agent; default icons resolve against it.
    pub scope: String,
    /// Icon asset path, relative to `scope`.
    pub icon_path: String,
    /// Window opened by a notification click when no tab is open.
    pub start_url: String,
    /// Timeout in seconds for each collaborator request.
    pub request_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base: constants::DEFAULT_API_BASE.to_string(),
            scope: constants::DEFAULT_SCOPE.to_string(),
            icon_path: constants::DEFAULT_ICON_PATH.to_string(),
            start_url: constants::DEFAULT_START_URL.to_string(),
            request_timeout_secs: constants::HTTP_REQUEST_TIMEOUT.as_secs(),
        }
    }
}

impl Config {
    /// Returns the configuration directory path.
    ///
    /// `PUSHNOTIF_CONFIG_DIR` wins; otherwise the platform config dir
    /// (`~/.config/pushnotif` on Linux).
    pub fn config_dir() -> Result<PathBuf> {
        if let Ok(dir) = std::env::var("PUSHNOTIF_CONFIG_DIR") {
            return Ok(PathBuf::from(dir));
        }
        Ok(dirs::config_dir()
            .context("Could not determine config directory")?
            .join("pushnotif"))
    }

    /// Loads configuration from the config directory, with environment
    /// variable overrides. A missing or unreadable file yields defaults.
    pub fn load() -> Result<Self> {
        let path = Self::config_dir()?.join("config.json");
        let mut config = Self::load_from_path(&path).unwrap_or_else(|e| {
            log::debug!("[Config] Using defaults ({e:#})");
            Self::default()
        });
        config.apply_env_overrides();
        Ok(config)
    }

    /// Reads one config file without applying overrides.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Config file not readable: {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Config file is not valid JSON: {}", path.display()))
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(api_base) = std::env::var("PUSHNOTIF_API_BASE") {
            self.api_base = api_base;
        }

        if let Ok(scope) = std::env::var("PUSHNOTIF_SCOPE") {
            self.scope = scope;
        }

        if let Ok(timeout) = std::env::var("PUSHNOTIF_TIMEOUT_SECS") {
            if let Ok(secs) = timeout.parse::<u64>() {
                self.request_timeout_secs = secs;
            }
        }
    }

    /// Persists the configuration to `path`, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Collaborator request timeout.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.api_base, "http://127.0.0.1:3000");
        assert_eq!(config.icon_path, "icon-default.png");
        assert_eq!(config.start_url, "/");
        assert_eq!(config.request_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"api_base": "https://push.example.com"}"#).unwrap();

        let config = Config::load_from_path(&path).unwrap();
        assert_eq!(config.api_base, "https://push.example.com");
        assert_eq!(config.scope, constants::DEFAULT_SCOPE);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let config = Config {
            scope: "https://app.example.com/sw/".to_string(),
            request_timeout_secs: 3,
            ..Config::default()
        };

        config.save_to(&path).unwrap();
        assert_eq!(Config::load_from_path(&path).unwrap(), config);
    }

    #[test]
    fn test_invalid_json_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "not json").unwrap();

        assert!(Config::load_from_path(&path).is_err());
    }
}
