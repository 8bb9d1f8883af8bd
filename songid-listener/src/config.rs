//! Configuration for songid-listener
//!
//! TOML schema with built-in defaults for every field, plus API key
//! resolution (environment → TOML).

use crate::cache::CacheConfig;
use crate::features::ExtractorConfig;
use crate::services::gemini_client::{DEFAULT_BASE_URL, DEFAULT_MODEL};
use crate::services::{ListeningSettings, RetryPolicy};
use serde::{Deserialize, Serialize};
use songid_common::config::{load_toml_config, LoggingConfig};
use songid_common::{Error, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Environment variable holding the provider API key
pub const API_KEY_ENV: &str = "SONGID_API_KEY";

/// Module name used for the default config path and root folder lookup
pub const MODULE_NAME: &str = "songid-listener";

pub const DEFAULT_PORT: u16 = 5741;

// ============================================================================
// Schema
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenerConfig {
    pub root_folder: Option<PathBuf>,
    pub logging: LoggingConfig,
    pub identify: IdentifyConfig,
    pub remote: RemoteConfig,
    pub cache: CacheConfig,
    pub extractor: ExtractorConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentifyConfig {
    pub enabled: bool,
    pub language: String,
    pub region: String,
    pub capture_duration_ms: u64,
    /// Seconds between automatic identifications while serving
    pub listen_interval_secs: u64,
}

impl Default for IdentifyConfig {
    fn default() -> Self {
        let settings = ListeningSettings::default();
        Self {
            enabled: settings.enabled,
            language: settings.language,
            region: settings.region,
            capture_duration_ms: crate::services::capture::DEFAULT_CAPTURE_DURATION_MS,
            listen_interval_secs: 30,
        }
    }
}

impl IdentifyConfig {
    pub fn listening_settings(&self) -> ListeningSettings {
        ListeningSettings {
            enabled: self.enabled,
            language: self.language.clone(),
            region: self.region.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Provider API key; `SONGID_API_KEY` takes precedence
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    pub max_retries: u32,
    pub backoff_step_ms: u64,
    pub timeout_secs: u64,
    /// Client-side quota guard; 0 disables it
    pub requests_per_minute: u32,
    /// Answer delay of the offline simulator
    pub simulated_delay_ms: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            max_retries: 3,
            backoff_step_ms: 2000,
            timeout_secs: 30,
            requests_per_minute: 10,
            simulated_delay_ms: 1500,
        }
    }
}

impl RemoteConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, Duration::from_millis(self.backoff_step_ms))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
        }
    }
}

// ============================================================================
// Loading
// ============================================================================

impl ListenerConfig {
    /// Load from `path`; a missing file yields the defaults
    pub fn load(path: &Path) -> Result<Self> {
        let config = load_toml_config::<ListenerConfig>(path)?.unwrap_or_default();
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.extractor
            .validate()
            .map_err(|e| Error::Config(format!("[extractor] {}", e)))?;

        if self.cache.capacity == 0 {
            return Err(Error::Config("[cache] capacity must be positive".to_string()));
        }
        if !(0.0..=1.0).contains(&self.cache.similarity_threshold) {
            return Err(Error::Config(format!(
                "[cache] similarity_threshold must be within 0..=1 (got {})",
                self.cache.similarity_threshold
            )));
        }
        if self.identify.capture_duration_ms == 0 {
            return Err(Error::Config(
                "[identify] capture_duration_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// API Key Resolution
// ============================================================================

/// Resolve the provider API key
///
/// **Priority:** ENV → TOML. `None` means the offline simulator is used.
pub fn resolve_api_key(remote: &RemoteConfig) -> Option<String> {
    let env_key = std::env::var(API_KEY_ENV).ok().filter(|k| is_valid_key(k));
    let toml_key = remote.api_key.clone().filter(|k| is_valid_key(k));

    if env_key.is_some() && toml_key.is_some() {
        warn!(
            "API key found in both {} and TOML config. Using environment (highest priority).",
            API_KEY_ENV
        );
    }

    if let Some(key) = env_key {
        info!("API key loaded from environment variable");
        return Some(key);
    }
    if let Some(key) = toml_key {
        info!("API key loaded from TOML config");
        return Some(key);
    }

    warn!(
        "No API key configured ({} or [remote] api_key); using the simulated identifier",
        API_KEY_ENV
    );
    None
}

/// Non-empty, non-whitespace
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}
