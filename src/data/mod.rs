//! Configuration and credential management

mod config;
mod credential;

pub use config::{ApiConfig, AppConfig, StreamingConfig};
pub use credential::{CredentialProvider, Credentials, EnvCredentials};
