//! Configuration management for subcast
//!
//! Handles config file loading/saving and API key lookup.
//! Config is stored at ~/.config/subcast/config.toml

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::api::client::DEFAULT_API_BASE;
use crate::stream::poller::DEFAULT_POLL_INTERVAL;
use crate::stream::PlayerType;

/// Environment variable overriding the API key
pub const API_KEY_ENV: &str = "SUBCAST_API_KEY";
/// Environment variable overriding the server URL
pub const API_BASE_ENV: &str = "SUBCAST_API_BASE";

/// Application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Streaming API key
    pub api_key: Option<String>,
    /// Streaming server URL
    pub api_base: Option<String>,
    /// Delay between subtitle status requests, in milliseconds
    pub poll_interval_ms: Option<u64>,
    /// Local player for `play` (vlc or mpv)
    pub player: Option<String>,
}

impl Config {
    /// Get config file path (~/.config/subcast/config.toml)
    pub fn path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("subcast").join("config.toml"))
    }

    /// Load config from the default path, or return default if not found
    pub fn load() -> Self {
        Self::path().map(|p| Self::load_from(&p)).unwrap_or_default()
    }

    /// Load config from a specific file, or return default if unreadable
    pub fn load_from(path: &Path) -> Self {
        std::fs::read_to_string(path)
            .ok()
            .and_then(|s| match toml::from_str(&s) {
                Ok(config) => Some(config),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "ignoring invalid config");
                    None
                }
            })
            .unwrap_or_default()
    }

    /// Save config to the default path
    pub fn save(&self) -> Result<()> {
        let path = Self::path().ok_or_else(|| anyhow::anyhow!("Could not determine config path"))?;
        self.save_to(&path)
    }

    /// Save config to a specific file
    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Create parent directory if needed
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let toml = toml::to_string_pretty(self)?;
        std::fs::write(path, toml)
            .with_context(|| format!("Failed to write config to {}", path.display()))?;
        Ok(())
    }

    /// API key with fallback chain:
    /// 1. Environment variable SUBCAST_API_KEY
    /// 2. Key from config file
    pub fn api_key(&self) -> Option<String> {
        std::env::var(API_KEY_ENV)
            .ok()
            .or_else(|| self.api_key.clone())
            .filter(|k| !k.trim().is_empty())
    }

    /// Server URL: SUBCAST_API_BASE, then config, then the public server
    pub fn api_base(&self) -> String {
        std::env::var(API_BASE_ENV)
            .ok()
            .or_else(|| self.api_base.clone())
            .filter(|b| !b.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string())
    }

    /// Poll interval; zero or unset means the default
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval_ms
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_POLL_INTERVAL)
    }

    pub fn player_type(&self) -> PlayerType {
        self.player
            .as_deref()
            .and_then(PlayerType::from_name)
            .unwrap_or_default()
    }
}
