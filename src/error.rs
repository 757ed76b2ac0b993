//! Error types for the ASR client
//!
//! Every failure the client can surface is an [`AsrError`]. Streaming
//! recognition wraps it in [`StreamingError`] so that text recognised before
//! the failure is not lost.

use std::time::Duration;
use thiserror::Error;

use crate::asr::TranscriptResult;

/// Main error type for the ASR client
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AsrError {
    /// Missing or invalid credentials / settings. Raised at construction.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Signing could not be performed (payload serialization, bad timestamp).
    #[error("Signature error: {0}")]
    Signature(String),

    /// The session is not connected, was closed, or the handshake failed.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The session did not reach Open in time.
    #[error("Connection timed out after {0:?}")]
    ConnectionTimeout(Duration),

    /// A frame could not be dispatched after bounded retries.
    #[error("Send error: {0}")]
    Send(String),

    /// The streaming server answered with a nonzero in-band code.
    #[error("Protocol error [{code}]: {message}")]
    Protocol { code: i64, message: String },

    /// A REST call returned `Response.Error`. Code and message are verbatim.
    #[error("Upstream API error [{code}]: {message}")]
    UpstreamApi {
        code: String,
        message: String,
        request_id: Option<String>,
    },

    /// The REST request itself failed (network, TLS, timeout).
    #[error("HTTP error: {0}")]
    Http(String),

    /// The REST response body could not be decoded.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl AsrError {
    /// True for errors in the connection family (including timeouts)
    pub fn is_connection(&self) -> bool {
        matches!(self, AsrError::Connection(_) | AsrError::ConnectionTimeout(_))
    }
}

impl From<reqwest::Error> for AsrError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            AsrError::InvalidResponse(e.to_string())
        } else {
            AsrError::Http(e.to_string())
        }
    }
}

/// Failure of a streaming recognition.
///
/// `partial` is `Some` exactly when at least one non-empty candidate text had
/// been received before the failure.
#[derive(Error, Debug, Clone)]
#[error("{error}")]
pub struct StreamingError {
    #[source]
    pub error: AsrError,
    pub partial: Option<TranscriptResult>,
}

impl StreamingError {
    pub fn new(error: AsrError, partial: Option<TranscriptResult>) -> Self {
        Self { error, partial }
    }
}

impl From<AsrError> for StreamingError {
    fn from(error: AsrError) -> Self {
        Self {
            error,
            partial: None,
        }
    }
}

pub type Result<T> = std::result::Result<T, AsrError>;
