//! Credentials
//!
//! Cloud API credentials and the providers that supply them.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::asr::constants::DEFAULT_REGION;
use crate::error::{AsrError, Result};

/// Secret keys shorter than this are almost certainly truncated
const MIN_SECRET_KEY_LEN: usize = 32;

/// API credentials. Immutable once handed to a client.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub secret_id: String,
    #[serde(default)]
    pub secret_key: String,
    /// Only needed for streaming recognition
    #[serde(default)]
    pub app_id: String,
    #[serde(default = "default_region")]
    pub region: String,
}

fn default_region() -> String {
    DEFAULT_REGION.to_string()
}

impl Default for Credentials {
    fn default() -> Self {
        Self {
            secret_id: String::new(),
            secret_key: String::new(),
            app_id: String::new(),
            region: default_region(),
        }
    }
}

impl Credentials {
    pub fn new(secret_id: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            secret_id: secret_id.into(),
            secret_key: secret_key.into(),
            ..Default::default()
        }
    }

    pub fn with_app_id(mut self, app_id: impl Into<String>) -> Self {
        self.app_id = app_id.into();
        self
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    /// Fail fast when secret material is missing
    pub fn validate(&self) -> Result<()> {
        if self.secret_id.trim().is_empty() {
            return Err(AsrError::Configuration("secret_id is not set".to_string()));
        }
        if self.secret_key.trim().is_empty() {
            return Err(AsrError::Configuration("secret_key is not set".to_string()));
        }
        if self.secret_key.len() < MIN_SECRET_KEY_LEN {
            tracing::warn!(
                "secret_key is only {} characters long (expected {}), signatures will likely be rejected",
                self.secret_key.len(),
                MIN_SECRET_KEY_LEN
            );
        }
        Ok(())
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("secret_id", &self.secret_id)
            .field("secret_key", &"***")
            .field("app_id", &self.app_id)
            .field("region", &self.region)
            .finish()
    }
}

/// Source of credentials for a client
pub trait CredentialProvider: Send + Sync {
    /// Complete credentials, or a configuration error
    fn credentials(&self) -> Result<Credentials>;
}

impl CredentialProvider for Credentials {
    fn credentials(&self) -> Result<Credentials> {
        self.validate()?;
        Ok(self.clone())
    }
}

/// Reads `TENCENTCLOUD_*` environment variables
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvCredentials;

impl CredentialProvider for EnvCredentials {
    fn credentials(&self) -> Result<Credentials> {
        let mut credentials = Credentials::default();
        credentials.apply_overrides(|name| std::env::var(name).ok());
        credentials.validate()?;
        Ok(credentials)
    }
}

impl Credentials {
    /// Overwrite fields from `TENCENTCLOUD_*` variables found by `lookup`
    pub(crate) fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        if let Some(v) = lookup("TENCENTCLOUD_SECRET_ID") {
            self.secret_id = v;
        }
        if let Some(v) = lookup("TENCENTCLOUD_SECRET_KEY") {
            self.secret_key = v;
        }
        if let Some(v) = lookup("TENCENTCLOUD_APP_ID") {
            self.app_id = v;
        }
        if let Some(v) = lookup("TENCENTCLOUD_REGION") {
            self.region = v;
        }
    }
}
