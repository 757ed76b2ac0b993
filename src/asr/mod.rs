//! ASR (Automatic Speech Recognition) module
//!
//! Cloud speech recognition over two channels: signed REST calls for
//! one-shot and long-audio recognition, and a WebSocket session for
//! real-time streaming.

mod aggregator;
mod api;
mod client;
pub mod constants;
mod long_audio;
mod options;
mod protocol;
mod sentence;
mod session;
mod signature;
pub mod transport;

pub use aggregator::{estimate_duration_seconds, ResultAggregator, TranscriptResult};
pub use api::ApiClient;
pub use client::{forward_events, AsrClient};
pub use long_audio::{LongAudioOptions, LongAudioTask, TaskStatus, TaskStatusReport};
pub use options::{RecognitionOptions, VoiceFormat, WordInfo};
pub use protocol::{
    build_frame_message, parse_server_message, AudioFrame, RecognitionEvent, SequenceMarker, Word,
};
pub use sentence::{BatchItem, SentenceResult};
pub use session::{ConnectionState, SessionConfig, SessionEvent, StreamingSession};
pub use signature::{redact_url, utc_date, RequestSigner, StreamSigner};
pub use transport::{Connector, TransportError, TransportMessage, WebSocketConnector};
