//! ASR Client
//!
//! Entry point for every recognition flow. Owns the signers, the REST caller
//! and the streaming transport; construct one per set of credentials.

use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

use super::aggregator::{ResultAggregator, TranscriptResult};
use super::api::ApiClient;
use super::constants::BATCH_DELAY;
use super::long_audio::{self, LongAudioOptions, LongAudioTask, TaskStatusReport};
use super::options::RecognitionOptions;
use super::protocol::RecognitionEvent;
use super::sentence::{self, BatchItem, SentenceResult};
use super::session::{ConnectionState, SessionEvent, StreamingSession};
use super::signature::{RequestSigner, StreamSigner};
use super::transport::{Connector, WebSocketConnector};
use crate::audio::PacerReport;
use crate::data::{AppConfig, CredentialProvider, Credentials, StreamingConfig};
use crate::error::{AsrError, Result, StreamingError};

/// Nonces on the streaming URL are drawn from `0..NONCE_RANGE`
const NONCE_RANGE: u32 = 1_000_000;

/// Cloud ASR client
pub struct AsrClient {
    stream_signer: StreamSigner,
    api: ApiClient,
    connector: Arc<dyn Connector>,
    streaming: StreamingConfig,
}

impl AsrClient {
    /// Create a client from resolved configuration.
    ///
    /// Fails with [`AsrError::Configuration`] when secret material is missing.
    pub fn new(config: &AppConfig) -> Result<Self> {
        Self::with_credentials(config.credentials()?, config)
    }

    /// Create a client with credentials from `provider` and settings from `config`
    pub fn from_provider(provider: &dyn CredentialProvider, config: &AppConfig) -> Result<Self> {
        Self::with_credentials(provider.credentials()?, config)
    }

    fn with_credentials(credentials: Credentials, config: &AppConfig) -> Result<Self> {
        let stream_signer = StreamSigner::new(&credentials)?;
        let api = ApiClient::new(RequestSigner::new(&credentials)?, &config.api)?;
        tracing::info!(
            "ASR client ready (region: {}, app_id set: {})",
            credentials.region,
            !credentials.app_id.is_empty()
        );
        Ok(Self {
            stream_signer,
            api,
            connector: Arc::new(WebSocketConnector),
            streaming: config.streaming.clone(),
        })
    }

    /// Replace the streaming transport
    pub fn with_connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = connector;
        self
    }

    /// Recognition defaults from configuration
    pub fn default_options(&self) -> &RecognitionOptions {
        &self.streaming.options
    }

    /// Start a streaming session. Frames can be sent as soon as it is returned;
    /// they are held until the connection opens.
    pub fn open_session(
        &self,
        options: &RecognitionOptions,
    ) -> Result<(StreamingSession, mpsc::Receiver<SessionEvent>)> {
        let timestamp = chrono::Utc::now().timestamp();
        let nonce = rand::thread_rng().gen_range(0..NONCE_RANGE);
        let url = self.stream_signer.build_url(options, timestamp, nonce)?;
        Ok(StreamingSession::connect(
            self.connector.clone(),
            url,
            options.voice_format,
            self.streaming.session_config(),
        ))
    }

    /// Recognise a complete buffer over a streaming session, paced as if it
    /// were live audio.
    ///
    /// On failure the error carries whatever text had been recognised.
    pub async fn recognize_stream(
        &self,
        audio: &[u8],
        options: &RecognitionOptions,
    ) -> std::result::Result<TranscriptResult, StreamingError> {
        let (session, mut events) = self.open_session(options)?;
        let mut aggregator = ResultAggregator::with_timing(
            options.bytes_per_second(),
            self.streaming.settle_window(),
            self.streaming.final_timeout(),
        );

        let outcome = self
            .drive(&session, &mut events, audio, &mut aggregator)
            .await;
        session.close().await;

        match outcome {
            Ok(bytes_sent) => {
                let result = aggregator.finish(bytes_sent);
                tracing::info!(
                    "Recognition finished: {} chars, ~{}s of audio",
                    result.text.chars().count(),
                    result.estimated_audio_duration_seconds
                );
                Ok(result)
            }
            Err(error) => {
                let sent = (session.frames_sent() as usize)
                    .saturating_mul(self.streaming.chunk_size)
                    .min(audio.len());
                tracing::error!("Recognition failed: {}", error);
                Err(StreamingError::new(error, aggregator.partial(sent)))
            }
        }
    }

    /// Run the pacer and fold events until the result settles.
    /// Returns the number of bytes sent.
    async fn drive(
        &self,
        session: &StreamingSession,
        events: &mut mpsc::Receiver<SessionEvent>,
        audio: &[u8],
        aggregator: &mut ResultAggregator,
    ) -> Result<usize> {
        let pacer = self.streaming.pacer();
        let send = pacer.run(session, audio);
        tokio::pin!(send);

        let mut report: Option<PacerReport> = None;
        let mut remote_closed = false;
        let mut pacer_error: Option<AsrError> = None;

        loop {
            let deadline = aggregator.deadline(report.map(|r| r.last_sent_at));
            let settle = tokio::time::sleep_until(
                deadline.unwrap_or_else(|| Instant::now() + Duration::from_secs(3600)),
            );

            tokio::select! {
                result = &mut send, if report.is_none() && pacer_error.is_none() => match result {
                    Ok(sent) => {
                        report = Some(sent);
                        if remote_closed {
                            break;
                        }
                    }
                    // The session reports the cause of an Error state as an event
                    Err(e) if session.state() == ConnectionState::Error => pacer_error = Some(e),
                    Err(e) => {
                        drain_results(events, aggregator);
                        return Err(e);
                    }
                },
                event = events.recv(), if !remote_closed => match event {
                    Some(SessionEvent::Result(event)) => aggregator.accept(event, Instant::now()),
                    Some(SessionEvent::Error(e)) => return Err(e),
                    Some(SessionEvent::Closed) | None => {
                        if let Some(e) = pacer_error.take() {
                            return Err(e);
                        }
                        remote_closed = true;
                        if report.is_some() {
                            break;
                        }
                    }
                },
                _ = settle, if deadline.is_some() => {
                    if !aggregator.has_final() {
                        tracing::warn!("No final result within timeout, using best candidate");
                    }
                    break;
                }
            }
        }

        Ok(report.map(|r| r.bytes_sent).unwrap_or(0))
    }

    /// One-shot recognition of a short clip
    pub async fn recognize_sentence(
        &self,
        audio: &[u8],
        options: &RecognitionOptions,
    ) -> Result<SentenceResult> {
        sentence::recognize_sentence(&self.api, audio, options).await
    }

    /// One-shot recognition of several clips, one after another
    pub async fn recognize_batch(
        &self,
        clips: &[Vec<u8>],
        options: &RecognitionOptions,
    ) -> Vec<BatchItem> {
        sentence::recognize_batch(&self.api, clips, options, BATCH_DELAY).await
    }

    /// Submit a remote audio file for asynchronous transcription
    pub async fn submit_long_audio(
        &self,
        audio_url: &str,
        options: &LongAudioOptions,
    ) -> Result<LongAudioTask> {
        long_audio::submit(&self.api, audio_url, options).await
    }

    /// Query a long-audio task once
    pub async fn poll_long_audio(&self, task_id: u64) -> Result<TaskStatusReport> {
        long_audio::poll(&self.api, task_id).await
    }
}

/// Fold already queued results into the aggregator
fn drain_results(events: &mut mpsc::Receiver<SessionEvent>, aggregator: &mut ResultAggregator) {
    while let Ok(event) = events.try_recv() {
        if let SessionEvent::Result(event) = event {
            aggregator.accept(event, Instant::now());
        }
    }
}

/// Deliver session events to callbacks until the session ends.
///
/// `on_error` is called at most once, for the terminal error.
pub async fn forward_events<R, E>(
    mut events: mpsc::Receiver<SessionEvent>,
    mut on_result: R,
    on_error: E,
) where
    R: FnMut(RecognitionEvent),
    E: FnOnce(AsrError),
{
    while let Some(event) = events.recv().await {
        match event {
            SessionEvent::Result(event) => on_result(event),
            SessionEvent::Error(e) => {
                on_error(e);
                return;
            }
            SessionEvent::Closed => return,
        }
    }
}
