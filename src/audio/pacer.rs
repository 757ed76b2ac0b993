//! Audio Pacer
//!
//! Slices a PCM buffer into fixed-size frames and feeds them to a streaming
//! session at a fixed cadence, approximating real-time capture.

use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};

use crate::asr::constants::{DEFAULT_CHUNK_SIZE, DEFAULT_SEND_INTERVAL};
use crate::asr::{AudioFrame, ConnectionState, SequenceMarker, StreamingSession};
use crate::error::{AsrError, Result};

/// What a completed pacing run sent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacerReport {
    pub frames_sent: usize,
    pub bytes_sent: usize,
    pub last_sent_at: Instant,
}

/// Fixed-size, fixed-interval frame sender
#[derive(Debug, Clone)]
pub struct AudioPacer {
    chunk_size: usize,
    interval: Duration,
}

impl Default for AudioPacer {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE, DEFAULT_SEND_INTERVAL)
    }
}

impl AudioPacer {
    pub fn new(chunk_size: usize, interval: Duration) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            interval,
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Split `audio` into frames. An empty buffer still yields one (empty)
    /// final frame so the server sees the end of the stream.
    pub fn frames(&self, audio: &[u8]) -> Vec<AudioFrame> {
        if audio.is_empty() {
            return vec![AudioFrame {
                payload: Vec::new(),
                marker: SequenceMarker::First,
                is_final: true,
            }];
        }

        let count = audio.len().div_ceil(self.chunk_size);
        audio
            .chunks(self.chunk_size)
            .enumerate()
            .map(|(i, chunk)| AudioFrame {
                payload: chunk.to_vec(),
                marker: if i == 0 {
                    SequenceMarker::First
                } else {
                    SequenceMarker::Rest
                },
                is_final: i + 1 == count,
            })
            .collect()
    }

    /// Send `audio` through `session`, one frame per interval.
    ///
    /// Waits for the session to open first. Stops as soon as the session
    /// closes or fails and returns that failure.
    pub async fn run(&self, session: &StreamingSession, audio: &[u8]) -> Result<PacerReport> {
        session.wait_for_connection().await?;

        let frames = self.frames(audio);
        let total = frames.len();
        tracing::info!(
            "Streaming {} bytes as {} frames every {:?}",
            audio.len(),
            total,
            self.interval
        );

        let mut state_rx = session.subscribe();
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut bytes_sent = 0;
        let mut last_sent_at = Instant::now();
        for (i, frame) in frames.into_iter().enumerate() {
            tokio::select! {
                _ = ticker.tick() => {}
                state = state_rx.wait_for(|s| s.is_terminal()) => {
                    let state = state.map(|s| *s).unwrap_or(ConnectionState::Closed);
                    tracing::warn!("Session {} after {}/{} frames, stopping", state, i, total);
                    return Err(AsrError::Connection(format!(
                        "Session {} while streaming",
                        state
                    )));
                }
            }

            let len = frame.payload.len();
            session.send(frame).await?;
            bytes_sent += len;
            last_sent_at = Instant::now();
        }

        Ok(PacerReport {
            frames_sent: total,
            bytes_sent,
            last_sent_at,
        })
    }
}
