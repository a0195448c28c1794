//! Application configuration management.
//!
//! Holds the backend location and credentials plus the tuning knobs for the
//! query cache and batch coalescer.
//!
//! Configuration is stored at `~/.config/clubhub/config.json`. The backend URL
//! and API key can be overridden with `CLUBHUB_BACKEND_URL` and
//! `CLUBHUB_API_KEY`.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Application name used for the config directory path
const APP_NAME: &str = "clubhub";

/// Config file name
const CONFIG_FILE: &str = "config.json";

const ENV_BACKEND_URL: &str = "CLUBHUB_BACKEND_URL";
const ENV_API_KEY: &str = "CLUBHUB_API_KEY";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub backend_url: Option<String>,
    pub api_key: Option<String>,
    pub cache_capacity: usize,
    pub default_ttl_secs: u64,
    pub batch_delay_ms: u64,
    pub request_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend_url: None,
            api_key: None,
            cache_capacity: 256,
            default_ttl_secs: 30,
            batch_delay_ms: 10,
            request_timeout_secs: 30,
        }
    }
}

impl Config {
    /// Load the config file (or defaults if there is none) and apply
    /// environment overrides.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            Self::from_json(&contents)?
        } else {
            Self::default()
        };
        config.apply_env();
        Ok(config)
    }

    pub fn from_json(contents: &str) -> Result<Self> {
        serde_json::from_str(contents).context("Failed to parse config file")
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn apply_env(&mut self) {
        self.apply_overrides(
            std::env::var(ENV_BACKEND_URL).ok(),
            std::env::var(ENV_API_KEY).ok(),
        );
    }

    fn apply_overrides(&mut self, backend_url: Option<String>, api_key: Option<String>) {
        if let Some(url) = backend_url.filter(|s| !s.is_empty()) {
            self.backend_url = Some(url);
        }
        if let Some(key) = api_key.filter(|s| !s.is_empty()) {
            self.api_key = Some(key);
        }
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }

    pub fn batch_delay(&self) -> Duration {
        Duration::from_millis(self.batch_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
