//! Streaming Session
//!
//! Owns one transport connection and its state machine:
//!
//! ```text
//! Init -> Connecting -> Open -> Streaming -> Closing -> Closed
//!              \          \         \
//!               +----------+---------+--> Error
//! ```
//!
//! The connection is opened by a background task spawned on construction.
//! The same task then reads inbound messages and forwards them as
//! [`SessionEvent`]s. Readiness is observed through a `watch` channel; every
//! caller of [`StreamingSession::wait_for_connection`] shares one pending
//! completion, so waiting never triggers another connect.

use futures_util::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex as AsyncMutex};
use tokio::task::JoinHandle;

use super::constants::{CONNECT_TIMEOUT, SEND_RETRY_BACKOFF, SEND_RETRY_LIMIT};
use super::options::VoiceFormat;
use super::protocol::{
    build_frame_message, parse_server_message, AudioFrame, RecognitionEvent, SequenceMarker,
};
use super::signature::redact_url;
use super::transport::{Connector, TransportError, TransportMessage, TransportSink, TransportStream};
use crate::error::{AsrError, Result};

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Init,
    Connecting,
    Open,
    Streaming,
    Closing,
    Closed,
    Error,
}

impl ConnectionState {
    /// Frames may be sent
    pub fn is_open(self) -> bool {
        matches!(self, ConnectionState::Open | ConnectionState::Streaming)
    }

    /// No further progress is possible
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ConnectionState::Closing | ConnectionState::Closed | ConnectionState::Error
        )
    }

    fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        match (self, next) {
            (Init, Connecting) => true,
            (Connecting, Open) => true,
            (Open, Streaming) => true,
            (Connecting | Open | Streaming, Error) => true,
            (Closed | Closing, Closing) => false,
            (_, Closing) => true,
            (Closing, Closed) => true,
            _ => false,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Init => "init",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
            ConnectionState::Streaming => "streaming",
            ConnectionState::Closing => "closing",
            ConnectionState::Closed => "closed",
            ConnectionState::Error => "error",
        };
        f.write_str(name)
    }
}

/// Event delivered to the session owner
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Result(RecognitionEvent),
    /// Terminal error; sent at most once per session
    Error(AsrError),
    /// The server closed the connection
    Closed,
}

/// Session timing knobs
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub connect_timeout: Duration,
    pub send_retry_limit: u32,
    pub send_retry_backoff: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: CONNECT_TIMEOUT,
            send_retry_limit: SEND_RETRY_LIMIT,
            send_retry_backoff: SEND_RETRY_BACKOFF,
        }
    }
}

type ConnectWaiter = Shared<BoxFuture<'static, Result<()>>>;

/// State shared with the background connection task
struct SessionShared {
    state: watch::Sender<ConnectionState>,
    writer: AsyncMutex<Option<Box<dyn TransportSink>>>,
    events: mpsc::Sender<SessionEvent>,
    terminal_reported: AtomicBool,
}

impl SessionShared {
    fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    fn transition(&self, next: ConnectionState) -> bool {
        let mut from = None;
        let changed = self.state.send_if_modified(|state| {
            if state.can_transition_to(next) {
                from = Some(*state);
                *state = next;
                true
            } else {
                false
            }
        });
        if let Some(from) = from {
            tracing::debug!("Session state {} -> {}", from, next);
        }
        changed
    }

    async fn report_terminal(&self, error: AsrError) {
        if self.terminal_reported.swap(true, Ordering::SeqCst) {
            tracing::debug!("Suppressing secondary session error: {}", error);
            return;
        }
        let _ = self.events.send(SessionEvent::Error(error)).await;
    }

    /// Enter Error, drop the writer and report `error` once
    async fn fail(&self, error: AsrError) {
        self.transition(ConnectionState::Error);
        if let Some(mut sink) = self.writer.lock().await.take() {
            let _ = sink.close().await;
        }
        self.report_terminal(error).await;
    }
}

/// One real-time recognition connection
pub struct StreamingSession {
    voice_id: String,
    voice_format: VoiceFormat,
    config: SessionConfig,
    shared: Arc<SessionShared>,
    pending: Mutex<Option<ConnectWaiter>>,
    connect_task: Mutex<Option<JoinHandle<()>>>,
    frames_sent: AtomicU64,
    // Both only change under the writer lock
    first_sent: AtomicBool,
    final_sent: AtomicBool,
}

impl StreamingSession {
    /// Start connecting to `url` and return the session with its event stream.
    ///
    /// Must be called inside a tokio runtime.
    pub fn connect(
        connector: Arc<dyn Connector>,
        url: String,
        voice_format: VoiceFormat,
        config: SessionConfig,
    ) -> (Self, mpsc::Receiver<SessionEvent>) {
        let (state_tx, _) = watch::channel(ConnectionState::Init);
        let (events_tx, events_rx) = mpsc::channel(100);
        let shared = Arc::new(SessionShared {
            state: state_tx,
            writer: AsyncMutex::new(None),
            events: events_tx,
            terminal_reported: AtomicBool::new(false),
        });

        let voice_id = uuid::Uuid::new_v4().to_string();
        shared.transition(ConnectionState::Connecting);
        tracing::info!(
            "Connecting to ASR WebSocket (voice_id: {}): {}",
            voice_id,
            redact_url(&url)
        );

        let task = tokio::spawn(run_connection(connector, url, shared.clone()));

        let session = Self {
            voice_id,
            voice_format,
            config,
            shared,
            pending: Mutex::new(None),
            connect_task: Mutex::new(Some(task)),
            frames_sent: AtomicU64::new(0),
            first_sent: AtomicBool::new(false),
            final_sent: AtomicBool::new(false),
        };
        (session, events_rx)
    }

    pub fn session_id(&self) -> &str {
        &self.voice_id
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    pub fn frames_sent(&self) -> u64 {
        self.frames_sent.load(Ordering::SeqCst)
    }

    /// Watch state changes
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    /// Resolve once the session is open.
    ///
    /// Concurrent callers share one pending completion. A timed out wait
    /// clears it so the next call waits afresh; the connect attempt itself is
    /// never repeated.
    pub async fn wait_for_connection(&self) -> Result<()> {
        let waiter = {
            let state = self.state();
            if state.is_open() {
                return Ok(());
            }
            if state.is_terminal() {
                return Err(AsrError::Connection(format!("Session is {}", state)));
            }
            let mut pending = self.pending.lock();
            pending
                .get_or_insert_with(|| self.new_waiter())
                .clone()
        };

        let result = waiter.await;
        if let Err(ref e) = result {
            tracing::warn!("Waiting for connection failed: {}", e);
            self.pending.lock().take();
        }
        result
    }

    fn new_waiter(&self) -> ConnectWaiter {
        let mut state_rx = self.shared.state.subscribe();
        let timeout = self.config.connect_timeout;
        async move {
            let outcome = tokio::time::timeout(timeout, async move {
                state_rx
                    .wait_for(|s| !matches!(s, ConnectionState::Init | ConnectionState::Connecting))
                    .await
                    .map(|s| *s)
            })
            .await;
            match outcome {
                Err(_) => Err(AsrError::ConnectionTimeout(timeout)),
                Ok(Err(_)) => Err(AsrError::Connection("Session dropped".to_string())),
                Ok(Ok(state)) if state.is_open() => Ok(()),
                Ok(Ok(state)) => Err(AsrError::Connection(format!(
                    "Connection ended before opening (state: {})",
                    state
                ))),
            }
        }
        .boxed()
        .shared()
    }

    /// Send one frame, waiting for the connection first.
    ///
    /// The on-wire sequence marker is assigned here: `seq` 0 for the first
    /// frame this session actually transmits, 1 afterwards. Once a final
    /// frame has gone out every further send fails with [`AsrError::Send`].
    pub async fn send(&self, mut frame: AudioFrame) -> Result<()> {
        self.wait_for_connection()
            .await
            .map_err(|e| match e {
                AsrError::ConnectionTimeout(_) | AsrError::Connection(_) => e,
                other => AsrError::Connection(other.to_string()),
            })?;

        let state = self.state();
        if !state.is_open() {
            return Err(AsrError::Connection(format!(
                "Session not open (state: {})",
                state
            )));
        }
        if self.final_sent.load(Ordering::SeqCst) {
            return Err(final_already_sent());
        }

        let mut attempt = 0;
        loop {
            match self.transmit(&mut frame).await {
                Ok(()) => break,
                Err(SendFailure::Transient(reason)) if attempt < self.config.send_retry_limit => {
                    attempt += 1;
                    tracing::warn!(
                        "Frame send not ready ({}), retry {}/{}",
                        reason,
                        attempt,
                        self.config.send_retry_limit
                    );
                    tokio::time::sleep(self.config.send_retry_backoff).await;
                }
                Err(SendFailure::Transient(reason)) => {
                    return Err(AsrError::Send(format!(
                        "Frame not sent after {} retries: {}",
                        attempt, reason
                    )));
                }
                Err(SendFailure::Fatal(e)) => return Err(e),
            }
        }

        let sent = self.frames_sent.fetch_add(1, Ordering::SeqCst) + 1;
        self.shared.transition(ConnectionState::Streaming);
        if sent % 50 == 0 {
            tracing::info!("Sent {} audio frames", sent);
        }
        if frame.is_final {
            tracing::info!("Sent final frame, {} total frames", sent);
        }
        Ok(())
    }

    async fn transmit(&self, frame: &mut AudioFrame) -> std::result::Result<(), SendFailure> {
        let mut writer = self.shared.writer.lock().await;
        let state = self.state();
        if state.is_terminal() {
            return Err(SendFailure::Fatal(AsrError::Connection(format!(
                "Session is {}",
                state
            ))));
        }
        if self.final_sent.load(Ordering::SeqCst) {
            return Err(SendFailure::Fatal(final_already_sent()));
        }
        let Some(sink) = writer.as_mut() else {
            return Err(SendFailure::Transient("transport not attached".to_string()));
        };

        frame.marker = if self.first_sent.load(Ordering::SeqCst) {
            SequenceMarker::Rest
        } else {
            SequenceMarker::First
        };
        let message = build_frame_message(&self.voice_id, frame, self.voice_format)
            .map_err(SendFailure::Fatal)?;

        let result = sink.send_text(message).await;
        match result {
            Ok(()) => {
                self.first_sent.store(true, Ordering::SeqCst);
                if frame.is_final {
                    self.final_sent.store(true, Ordering::SeqCst);
                }
                Ok(())
            }
            Err(e) if e.is_transient() => Err(SendFailure::Transient(e.to_string())),
            Err(e) => {
                drop(writer);
                let error = AsrError::Send(e.to_string());
                self.shared.fail(error.clone()).await;
                Err(SendFailure::Fatal(error))
            }
        }
    }

    /// Shut the session down. Idempotent.
    ///
    /// Pending waiters are rejected and nothing reaches the transport after
    /// this returns.
    pub async fn close(&self) {
        if self.state() == ConnectionState::Closed {
            return;
        }
        self.shared.transition(ConnectionState::Closing);

        if let Some(task) = self.connect_task.lock().take() {
            task.abort();
        }
        let sink = self.shared.writer.lock().await.take();
        if let Some(mut sink) = sink {
            if let Err(e) = sink.close().await {
                tracing::debug!("Transport close failed: {}", e);
            }
        }

        self.shared.transition(ConnectionState::Closed);
        self.pending.lock().take();
        tracing::info!(
            "Session {} closed after {} frames",
            self.voice_id,
            self.frames_sent()
        );
    }
}

impl Drop for StreamingSession {
    fn drop(&mut self) {
        if let Some(task) = self.connect_task.get_mut().take() {
            task.abort();
        }
    }
}

impl fmt::Debug for StreamingSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamingSession")
            .field("voice_id", &self.voice_id)
            .field("state", &self.state())
            .field("frames_sent", &self.frames_sent())
            .finish()
    }
}

fn final_already_sent() -> AsrError {
    AsrError::Send("Final frame already sent".to_string())
}

enum SendFailure {
    Transient(String),
    Fatal(AsrError),
}

/// Open the transport, then pump inbound messages until the connection ends
async fn run_connection(connector: Arc<dyn Connector>, url: String, shared: Arc<SessionShared>) {
    let (sink, stream) = match connector.connect(&url).await {
        Ok(connection) => connection,
        Err(e) => {
            tracing::error!("WebSocket connection failed: {}", e);
            shared
                .fail(AsrError::Connection(format!("Handshake failed: {}", e)))
                .await;
            return;
        }
    };

    *shared.writer.lock().await = Some(sink);
    if !shared.transition(ConnectionState::Open) {
        // Closed while the handshake was in flight
        if let Some(mut sink) = shared.writer.lock().await.take() {
            let _ = sink.close().await;
        }
        return;
    }
    tracing::info!("WebSocket connected successfully");

    receive_loop(stream, &shared).await;
}

async fn receive_loop(mut stream: Box<dyn TransportStream>, shared: &SessionShared) {
    while let Some(message) = stream.next_message().await {
        match message {
            Ok(TransportMessage::Text(text)) => match parse_server_message(&text) {
                Ok(event) => {
                    tracing::debug!(
                        "Recognition result (final: {}): {}",
                        event.is_final,
                        event.text
                    );
                    if shared.events.send(SessionEvent::Result(event)).await.is_err() {
                        tracing::debug!("Event receiver dropped");
                    }
                }
                Err(e) => {
                    tracing::error!("ASR server error: {}", e);
                    shared.fail(e).await;
                    return;
                }
            },
            Ok(TransportMessage::Closed { code, reason }) => {
                tracing::info!("WebSocket closed by server: {:?} {}", code, reason);
                close_from_remote(shared).await;
                return;
            }
            Err(TransportError::Closed) => {
                close_from_remote(shared).await;
                return;
            }
            Err(e) => {
                tracing::error!("WebSocket error: {}", e);
                shared.fail(AsrError::Connection(e.to_string())).await;
                return;
            }
        }
    }
    close_from_remote(shared).await;
}

async fn close_from_remote(shared: &SessionShared) {
    shared.transition(ConnectionState::Closing);
    shared.writer.lock().await.take();
    shared.transition(ConnectionState::Closed);
    let _ = shared.events.send(SessionEvent::Closed).await;
}
