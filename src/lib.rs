//! Tencent Cloud ASR client
//!
//! - [`asr::AsrClient`] runs streaming, one-shot, batch and long-audio
//!   recognition.
//! - [`data::AppConfig`] loads settings and credentials.
//! - [`audio::AudioPacer`] feeds buffered PCM to a streaming session in real
//!   time.

pub mod asr;
pub mod audio;
pub mod data;
pub mod error;
pub mod logging;

pub use asr::{AsrClient, RecognitionOptions, TranscriptResult};
pub use data::{AppConfig, CredentialProvider, Credentials};
pub use error::{AsrError, Result, StreamingError};
