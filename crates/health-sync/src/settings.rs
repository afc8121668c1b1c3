//! Settings loading for the sync engine
//!
//! Supports loading settings from (in order of priority):
//! 1. JSON file in the Sparky config directory (`sync-settings.json`)
//! 2. Runtime environment variables (fallback)

use anyhow::{Context, Result, bail, ensure};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::models::MetricType;

/// Settings filename in the Sparky config directory
const SETTINGS_FILE: &str = "sync-settings.json";

const DEFAULT_CHUNK_SIZE_DAYS: u32 = 7;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
const DEFAULT_INCREMENTAL_COOLDOWN_SECS: u64 = 15 * 60;

/// Runtime settings for the sync engine and its upload client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Base URL of the self-hosted server
    pub server_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    /// Identifier of this device; scopes the one-running-job rule
    #[serde(default = "default_device_id")]
    pub device_id: String,
    #[serde(default = "default_chunk_size_days")]
    pub chunk_size_days: u32,
    /// Metrics to import; empty means all
    #[serde(default)]
    pub metric_types: Vec<MetricType>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Minimum gap between two incremental syncs
    #[serde(default = "default_incremental_cooldown_secs")]
    pub incremental_cooldown_secs: u64,
}

fn default_device_id() -> String {
    "default".to_string()
}

fn default_chunk_size_days() -> u32 {
    DEFAULT_CHUNK_SIZE_DAYS
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

fn default_incremental_cooldown_secs() -> u64 {
    DEFAULT_INCREMENTAL_COOLDOWN_SECS
}

impl SyncSettings {
    /// Settings with defaults for everything but the server and device
    pub fn new(server_url: impl Into<String>, device_id: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            api_key: None,
            device_id: device_id.into(),
            chunk_size_days: DEFAULT_CHUNK_SIZE_DAYS,
            metric_types: Vec::new(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            incremental_cooldown_secs: DEFAULT_INCREMENTAL_COOLDOWN_SECS,
        }
    }

    /// Load settings using the following priority:
    /// 1. JSON file (~/.config/sparky/sync-settings.json)
    /// 2. Runtime environment variables
    pub fn load() -> Result<Self> {
        let settings = if config::config_exists(SETTINGS_FILE) {
            config::load_json(SETTINGS_FILE)?
        } else {
            Self::from_env()?
        };
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from a specific JSON file
    pub fn from_file(path: &Path) -> Result<Self> {
        let settings: Self = config::load_json_file(path)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Parse settings from a JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        let settings: Self =
            serde_json::from_str(json).context("Failed to parse sync settings JSON")?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let server_url = lookup("SPARKY_SERVER_URL")
            .context("SPARKY_SERVER_URL environment variable not set")?;
        let device_id = lookup("SPARKY_DEVICE_ID").unwrap_or_else(default_device_id);

        let mut settings = Self::new(server_url, device_id);
        settings.api_key = lookup("SPARKY_API_KEY").filter(|k| !k.is_empty());
        if let Some(days) = lookup("SPARKY_CHUNK_SIZE_DAYS") {
            settings.chunk_size_days = days
                .parse()
                .with_context(|| format!("Invalid SPARKY_CHUNK_SIZE_DAYS: {}", days))?;
        }
        Ok(settings)
    }

    /// Save settings to the Sparky config directory
    pub fn save(&self) -> Result<()> {
        self.validate()?;
        config::save_json(SETTINGS_FILE, self)
    }

    /// Get the default settings file path (~/.config/sparky/sync-settings.json)
    pub fn default_settings_path() -> Option<PathBuf> {
        config::config_path(SETTINGS_FILE)
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        ensure!(self.chunk_size_days > 0, "chunk_size_days must be at least 1");
        ensure!(!self.device_id.trim().is_empty(), "device_id must not be empty");
        let url = url::Url::parse(&self.server_url)
            .with_context(|| format!("Invalid server_url: {}", self.server_url))?;
        if !matches!(url.scheme(), "http" | "https") {
            bail!("server_url must use http or https, got {}", url.scheme());
        }
        Ok(())
    }
}
