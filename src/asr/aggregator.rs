//! Result Aggregator
//!
//! Folds the recognition events of one session into a single transcript.

use std::time::Duration;
use tokio::time::Instant;

use super::constants::{FINAL_RESULT_TIMEOUT, SETTLE_WINDOW};
use super::protocol::{RecognitionEvent, Word};

/// Settled outcome of a streaming recognition
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TranscriptResult {
    pub text: String,
    pub word_list: Vec<Word>,
    pub estimated_audio_duration_seconds: u64,
}

/// Last-event-wins aggregation with a settle window.
///
/// An event with empty text does not replace a non-empty candidate; the
/// server sends empty acknowledgements and utterance-start markers that
/// carry no transcript.
///
/// Only a final event received after the last audio frame was sent starts
/// the settle window. A final event for an earlier utterance never closes
/// the result; it only updates the candidate.
#[derive(Debug)]
pub struct ResultAggregator {
    candidate: String,
    word_list: Vec<Word>,
    events_seen: usize,
    final_times: Vec<Instant>,
    settle_window: Duration,
    final_timeout: Duration,
    bytes_per_second: u32,
}

impl ResultAggregator {
    pub fn new(bytes_per_second: u32) -> Self {
        Self::with_timing(bytes_per_second, SETTLE_WINDOW, FINAL_RESULT_TIMEOUT)
    }

    pub fn with_timing(bytes_per_second: u32, settle_window: Duration, final_timeout: Duration) -> Self {
        Self {
            candidate: String::new(),
            word_list: Vec::new(),
            events_seen: 0,
            final_times: Vec::new(),
            settle_window,
            final_timeout,
            bytes_per_second: bytes_per_second.max(1),
        }
    }

    /// Record an event received at `now`
    pub fn accept(&mut self, event: RecognitionEvent, now: Instant) {
        self.events_seen += 1;
        if !event.text.is_empty() {
            self.candidate = event.text;
        }
        if !event.word_list.is_empty() {
            self.word_list = event.word_list;
        }
        if event.is_final {
            self.final_times.push(now);
        }
    }

    pub fn candidate(&self) -> &str {
        &self.candidate
    }

    pub fn has_final(&self) -> bool {
        !self.final_times.is_empty()
    }

    pub fn events_seen(&self) -> usize {
        self.events_seen
    }

    /// When the result may be locked, given when the last frame was sent.
    ///
    /// `None` while audio is still being sent. The settle window starts at
    /// the first final event received after the last frame; finals of
    /// earlier utterances do not start it. Without such an event the hard
    /// timeout applies.
    pub fn deadline(&self, last_frame_sent_at: Option<Instant>) -> Option<Instant> {
        let last_sent = last_frame_sent_at?;
        match self.final_times.iter().find(|at| **at >= last_sent) {
            Some(final_at) => Some(*final_at + self.settle_window),
            None => Some(last_sent + self.final_timeout),
        }
    }

    /// Best-effort partial result, if any text was recognised
    pub fn partial(&self, total_bytes_sent: usize) -> Option<TranscriptResult> {
        if self.candidate.is_empty() {
            None
        } else {
            Some(self.snapshot(total_bytes_sent))
        }
    }

    /// Lock the result
    pub fn finish(self, total_bytes_sent: usize) -> TranscriptResult {
        self.snapshot(total_bytes_sent)
    }

    fn snapshot(&self, total_bytes_sent: usize) -> TranscriptResult {
        TranscriptResult {
            text: self.candidate.clone(),
            word_list: self.word_list.clone(),
            estimated_audio_duration_seconds: estimate_duration_seconds(
                total_bytes_sent,
                self.bytes_per_second,
            ),
        }
    }
}

/// ceil(bytes / bytes_per_second)
pub fn estimate_duration_seconds(total_bytes: usize, bytes_per_second: u32) -> u64 {
    let rate = u64::from(bytes_per_second.max(1));
    (total_bytes as u64).div_ceil(rate)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(text: &str, is_final: bool) -> RecognitionEvent {
        RecognitionEvent {
            text: text.to_string(),
            is_final,
            ..Default::default()
        }
    }

    #[test]
    fn test_last_event_wins() {
        let now = Instant::now();
        let mut aggregator = ResultAggregator::new(3200);
        aggregator.accept(event("hel", false), now);
        aggregator.accept(event("hello", false), now);
        assert_eq!(aggregator.candidate(), "hello");
        assert!(!aggregator.has_final());
        aggregator.accept(event("hello world", true), now);
        assert!(aggregator.has_final());

        let result = aggregator.finish(16_000);
        assert_eq!(result.text, "hello world");
        assert_eq!(result.estimated_audio_duration_seconds, 5);
    }

    #[test]
    fn test_correction_after_final_supersedes() {
        let now = Instant::now();
        let mut aggregator = ResultAggregator::new(3200);
        aggregator.accept(event("hello word", true), now);
        aggregator.accept(event("hello world", false), now);
        assert_eq!(aggregator.finish(0).text, "hello world");
    }

    #[test]
    fn test_empty_events_keep_candidate() {
        let now = Instant::now();
        let mut aggregator = ResultAggregator::new(3200);
        aggregator.accept(event("", false), now);
        assert!(aggregator.partial(100).is_none());
        aggregator.accept(event("good", false), now);
        aggregator.accept(event("", true), now);
        assert_eq!(aggregator.partial(100).unwrap().text, "good");
        assert_eq!(aggregator.events_seen(), 3);
    }

    #[test]
    fn test_word_list_from_latest_carrier() {
        let now = Instant::now();
        let mut aggregator = ResultAggregator::new(3200);
        let mut with_words = event("a b", false);
        with_words.word_list = vec![Word {
            word: "a".to_string(),
            ..Default::default()
        }];
        aggregator.accept(with_words, now);
        aggregator.accept(event("a b c", true), now);
        let result = aggregator.finish(0);
        assert_eq!(result.text, "a b c");
        assert_eq!(result.word_list.len(), 1);
    }

    #[test]
    fn test_deadlines() {
        let start = Instant::now();
        let mut aggregator = ResultAggregator::new(3200);
        assert_eq!(aggregator.deadline(None), None);

        // A final for an earlier utterance, before the last frame went out
        aggregator.accept(event("first sentence", true), start);
        let last_sent = start + Duration::from_millis(400);
        assert_eq!(
            aggregator.deadline(Some(last_sent)),
            Some(last_sent + FINAL_RESULT_TIMEOUT)
        );

        let final_at = last_sent + Duration::from_millis(300);
        aggregator.accept(event("done", true), final_at);
        // Later finals do not extend the window
        aggregator.accept(event("done.", true), final_at + Duration::from_millis(100));
        assert_eq!(aggregator.deadline(None), None);
        assert_eq!(aggregator.deadline(Some(last_sent)), Some(final_at + SETTLE_WINDOW));
    }

    #[test]
    fn test_duration_estimate_rounds_up() {
        assert_eq!(estimate_duration_seconds(0, 3200), 0);
        assert_eq!(estimate_duration_seconds(1, 3200), 1);
        assert_eq!(estimate_duration_seconds(3200, 3200), 1);
        assert_eq!(estimate_duration_seconds(3201, 3200), 2);
        assert_eq!(estimate_duration_seconds(16_000, 1600), 10);
    }
}
