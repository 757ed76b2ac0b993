//! Application Configuration
//!
//! Loads client settings from a TOML file and applies environment overrides.
//!
//! ```toml
//! [credentials]
//! secret_id = "AKID..."
//! secret_key = "..."
//! app_id = "1250000000"
//!
//! [streaming]
//! engine_type = "16k_zh"
//! chunk_size = 1280
//! send_interval_ms = 40
//!
//! [api]
//! timeout_secs = 30
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::credential::{CredentialProvider, Credentials};
use crate::asr::constants::{
    API_HOST, API_TIMEOUT, CONNECT_TIMEOUT, DEFAULT_CHUNK_SIZE, DEFAULT_SEND_INTERVAL,
    FINAL_RESULT_TIMEOUT, SEND_RETRY_BACKOFF, SEND_RETRY_LIMIT, SETTLE_WINDOW,
};
use crate::asr::{RecognitionOptions, SessionConfig};
use crate::audio::AudioPacer;
use crate::error::AsrError;

/// Proxy variables, in order of precedence
const PROXY_VARS: [&str; 4] = ["HTTPS_PROXY", "https_proxy", "HTTP_PROXY", "http_proxy"];

/// Application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub credentials: Credentials,
    #[serde(default)]
    pub streaming: StreamingConfig,
    #[serde(default)]
    pub api: ApiConfig,
}

impl AppConfig {
    /// Default config file location, next to the executable
    pub fn config_path() -> PathBuf {
        let exe_dir = std::env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
            .unwrap_or_else(|| PathBuf::from("."));
        exe_dir.join("config.toml")
    }

    /// Parse a config file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: AppConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    /// Load `path` if it exists, otherwise start from defaults
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            tracing::info!("No config file at {}, using defaults", path.display());
            Ok(AppConfig::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write config file {}", path.display()))?;
        Ok(())
    }

    /// Load `path` (or defaults), then apply process environment overrides
    pub fn resolve(path: &Path) -> crate::error::Result<Self> {
        let mut config = Self::load_or_default(path)
            .map_err(|e| AsrError::Configuration(format!("{:#}", e)))?;
        config.apply_env(|name| std::env::var(name).ok());
        Ok(config)
    }

    /// Apply `TENCENTCLOUD_*` and proxy overrides found by `lookup`
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        self.credentials.apply_overrides(&lookup);
        if self.api.proxy.is_none() {
            self.api.proxy = PROXY_VARS
                .iter()
                .filter_map(|name| lookup(name))
                .find(|v| !v.trim().is_empty());
        }
    }
}

impl CredentialProvider for AppConfig {
    fn credentials(&self) -> crate::error::Result<Credentials> {
        self.credentials.credentials()
    }
}

/// Streaming recognition defaults and timing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamingConfig {
    #[serde(flatten)]
    pub options: RecognitionOptions,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_send_interval_ms")]
    pub send_interval_ms: u64,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_send_retry_limit")]
    pub send_retry_limit: u32,
    #[serde(default = "default_send_retry_backoff_ms")]
    pub send_retry_backoff_ms: u64,
    #[serde(default = "default_settle_window_ms")]
    pub settle_window_ms: u64,
    #[serde(default = "default_final_timeout_ms")]
    pub final_timeout_ms: u64,
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_send_interval_ms() -> u64 {
    DEFAULT_SEND_INTERVAL.as_millis() as u64
}

fn default_connect_timeout_ms() -> u64 {
    CONNECT_TIMEOUT.as_millis() as u64
}

fn default_send_retry_limit() -> u32 {
    SEND_RETRY_LIMIT
}

fn default_send_retry_backoff_ms() -> u64 {
    SEND_RETRY_BACKOFF.as_millis() as u64
}

fn default_settle_window_ms() -> u64 {
    SETTLE_WINDOW.as_millis() as u64
}

fn default_final_timeout_ms() -> u64 {
    FINAL_RESULT_TIMEOUT.as_millis() as u64
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            options: RecognitionOptions::default(),
            chunk_size: default_chunk_size(),
            send_interval_ms: default_send_interval_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            send_retry_limit: default_send_retry_limit(),
            send_retry_backoff_ms: default_send_retry_backoff_ms(),
            settle_window_ms: default_settle_window_ms(),
            final_timeout_ms: default_final_timeout_ms(),
        }
    }
}

impl StreamingConfig {
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            send_retry_limit: self.send_retry_limit,
            send_retry_backoff: Duration::from_millis(self.send_retry_backoff_ms),
        }
    }

    pub fn pacer(&self) -> AudioPacer {
        AudioPacer::new(self.chunk_size, Duration::from_millis(self.send_interval_ms))
    }

    pub fn settle_window(&self) -> Duration {
        Duration::from_millis(self.settle_window_ms)
    }

    pub fn final_timeout(&self) -> Duration {
        Duration::from_millis(self.final_timeout_ms)
    }
}

/// REST API settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// HTTP(S) proxy URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<String>,
}

fn default_endpoint() -> String {
    format!("https://{}", API_HOST)
}

fn default_timeout_secs() -> u64 {
    API_TIMEOUT.as_secs()
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            timeout_secs: default_timeout_secs(),
            proxy: None,
        }
    }
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
