//! Streaming Transport
//!
//! The streaming session drives a message transport through these traits.
//! [`WebSocketConnector`] is the production implementation on top of
//! `tokio-tungstenite`.

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

/// Transport-level failure
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    /// The transport cannot take the message right now; retrying may succeed.
    #[error("Transport not ready: {0}")]
    NotReady(String),
    #[error("Transport closed")]
    Closed,
    #[error("Handshake failed: {0}")]
    Handshake(String),
    #[error("Transport I/O error: {0}")]
    Io(String),
}

impl TransportError {
    pub fn is_transient(&self) -> bool {
        matches!(self, TransportError::NotReady(_))
    }
}

/// Inbound transport message
#[derive(Debug, Clone, PartialEq)]
pub enum TransportMessage {
    Text(String),
    Closed { code: Option<u16>, reason: String },
}

/// Write half of a connection
#[async_trait]
pub trait TransportSink: Send {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError>;
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Read half of a connection
#[async_trait]
pub trait TransportStream: Send {
    /// Next message, or `None` once the connection is gone
    async fn next_message(&mut self) -> Option<Result<TransportMessage, TransportError>>;
}

pub type Connection = (Box<dyn TransportSink>, Box<dyn TransportStream>);

/// Opens connections
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, url: &str) -> Result<Connection, TransportError>;
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WebSocket connector
#[derive(Debug, Default, Clone)]
pub struct WebSocketConnector;

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self, url: &str) -> Result<Connection, TransportError> {
        let (ws_stream, response) = connect_async(url)
            .await
            .map_err(|e| TransportError::Handshake(e.to_string()))?;
        tracing::debug!("WebSocket handshake completed: {}", response.status());
        let (write, read) = ws_stream.split();
        Ok((
            Box::new(WebSocketSink { write }),
            Box::new(WebSocketReader { read }),
        ))
    }
}

struct WebSocketSink {
    write: SplitSink<WsStream, Message>,
}

#[async_trait]
impl TransportSink for WebSocketSink {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        self.write
            .send(Message::Text(text))
            .await
            .map_err(map_ws_error)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        match self.write.close().await {
            Ok(()) => Ok(()),
            Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => Ok(()),
            Err(e) => Err(map_ws_error(e)),
        }
    }
}

struct WebSocketReader {
    read: SplitStream<WsStream>,
}

#[async_trait]
impl TransportStream for WebSocketReader {
    async fn next_message(&mut self) -> Option<Result<TransportMessage, TransportError>> {
        loop {
            let message = match self.read.next().await? {
                Ok(message) => message,
                Err(tungstenite::Error::ConnectionClosed) => {
                    return Some(Ok(TransportMessage::Closed {
                        code: None,
                        reason: String::new(),
                    }))
                }
                Err(e) => return Some(Err(map_ws_error(e))),
            };

            match message {
                Message::Text(text) => return Some(Ok(TransportMessage::Text(text))),
                Message::Binary(data) => match String::from_utf8(data) {
                    Ok(text) => return Some(Ok(TransportMessage::Text(text))),
                    Err(_) => {
                        tracing::warn!("Ignoring non UTF-8 binary message");
                        continue;
                    }
                },
                Message::Close(frame) => {
                    let (code, reason) = frame
                        .map(|f| (Some(u16::from(f.code)), f.reason.into_owned()))
                        .unwrap_or((None, String::new()));
                    return Some(Ok(TransportMessage::Closed { code, reason }));
                }
                // Ping/Pong are answered by tungstenite itself
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => continue,
            }
        }
    }
}

fn map_ws_error(e: tungstenite::Error) -> TransportError {
    match e {
        tungstenite::Error::WriteBufferFull(_) => {
            TransportError::NotReady("write buffer full".to_string())
        }
        tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
            TransportError::Closed
        }
        other => TransportError::Io(other.to_string()),
    }
}
