//! One-Shot Recognition
//!
//! Short clips (up to one minute) recognised with a single
//! `SentenceRecognition` call, plus a sequential batch helper.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::api::ApiClient;
use super::constants::ACTION_SENTENCE;
use super::options::{flag, RecognitionOptions};
use super::protocol::Word;
use crate::error::{AsrError, Result};

/// Outcome of a one-shot recognition
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SentenceResult {
    pub text: String,
    /// Audio duration reported by the server, in milliseconds
    pub audio_duration_ms: i64,
    pub word_list: Vec<Word>,
    pub request_id: String,
}

/// Result of one item of a batch
#[derive(Debug, Clone, PartialEq)]
pub struct BatchItem {
    pub index: usize,
    pub outcome: Result<SentenceResult>,
}

impl BatchItem {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    /// Error of a failed item
    pub fn error(&self) -> Option<&AsrError> {
        self.outcome.as_ref().err()
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct SentencePayload<'a> {
    project_id: u32,
    sub_service_type: u32,
    #[serde(rename = "EngSerViceType")]
    eng_service_type: &'a str,
    source_type: u32,
    voice_format: &'a str,
    usr_audio_key: String,
    data: String,
    data_len: usize,
    filter_dirty: u8,
    filter_modal: u8,
    filter_punc: u8,
    convert_num_mode: u8,
    word_info: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    hotword_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    customization_id: Option<&'a str>,
}

impl<'a> SentencePayload<'a> {
    fn new(audio: &[u8], options: &'a RecognitionOptions) -> Self {
        Self {
            project_id: 0,
            sub_service_type: 2,
            eng_service_type: &options.engine_type,
            // Audio carried inline
            source_type: 1,
            voice_format: options.voice_format.name(),
            usr_audio_key: uuid::Uuid::new_v4().simple().to_string(),
            data: STANDARD.encode(audio),
            data_len: audio.len(),
            filter_dirty: flag(options.filter_dirty),
            filter_modal: flag(options.filter_modal),
            filter_punc: flag(options.filter_punc),
            convert_num_mode: flag(options.convert_num_mode),
            word_info: options.word_info.code(),
            hotword_id: options.hotword_id.as_deref().filter(|s| !s.is_empty()),
            customization_id: options.customization_id.as_deref().filter(|s| !s.is_empty()),
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "PascalCase", default)]
struct SentenceResponse {
    result: String,
    #[serde(alias = "AudioTime")]
    audio_duration: i64,
    word_list: Option<Vec<SentenceWord>>,
    request_id: String,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "PascalCase", default)]
struct SentenceWord {
    word: String,
    start_time: i64,
    end_time: i64,
}

/// Recognise `audio` in one request
pub async fn recognize_sentence(
    api: &ApiClient,
    audio: &[u8],
    options: &RecognitionOptions,
) -> Result<SentenceResult> {
    let payload = SentencePayload::new(audio, options);
    tracing::info!(
        "One-shot recognition of {} bytes ({}, {})",
        audio.len(),
        options.engine_type,
        options.voice_format.name()
    );

    let response: SentenceResponse = api.call(ACTION_SENTENCE, &payload).await?;
    Ok(SentenceResult {
        text: response.result,
        audio_duration_ms: response.audio_duration,
        word_list: response
            .word_list
            .unwrap_or_default()
            .into_iter()
            .map(|w| Word {
                word: w.word,
                start_time: w.start_time,
                end_time: w.end_time,
                stable_flag: 1,
            })
            .collect(),
        request_id: response.request_id,
    })
}

/// Recognise several clips one after another, `delay` apart.
///
/// Never fails as a whole; each input index gets its own outcome.
pub async fn recognize_batch(
    api: &ApiClient,
    clips: &[Vec<u8>],
    options: &RecognitionOptions,
    delay: Duration,
) -> Vec<BatchItem> {
    let mut items = Vec::with_capacity(clips.len());
    for (index, audio) in clips.iter().enumerate() {
        let outcome = recognize_sentence(api, audio, options).await;
        if let Err(ref e) = outcome {
            tracing::warn!("Batch item {} failed: {}", index, e);
        }
        items.push(BatchItem { index, outcome });

        if index + 1 < clips.len() {
            tokio::time::sleep(delay).await;
        }
    }

    let failed = items.iter().filter(|item| !item.is_success()).count();
    tracing::info!("Batch finished: {} ok, {} failed", items.len() - failed, failed);
    items
}
