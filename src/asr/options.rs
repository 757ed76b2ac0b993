//! Recognition options shared by the streaming and REST paths

use serde::{Deserialize, Serialize};

use super::constants::{BYTES_PER_SECOND_16K, BYTES_PER_SECOND_8K};

/// Audio container/codec understood by the provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum VoiceFormat {
    #[default]
    Pcm,
    Speex,
    Silk,
    Mp3,
    Opus,
    Wav,
    M4a,
    Aac,
}

impl VoiceFormat {
    /// Numeric code used on the streaming URL and in frames
    pub fn code(self) -> u8 {
        match self {
            VoiceFormat::Pcm => 1,
            VoiceFormat::Speex => 4,
            VoiceFormat::Silk => 6,
            VoiceFormat::Mp3 => 8,
            VoiceFormat::Opus => 10,
            VoiceFormat::Wav => 12,
            VoiceFormat::M4a => 14,
            VoiceFormat::Aac => 16,
        }
    }

    /// Name used by the REST one-shot API
    pub fn name(self) -> &'static str {
        match self {
            VoiceFormat::Pcm => "pcm",
            VoiceFormat::Speex => "speex",
            VoiceFormat::Silk => "silk",
            VoiceFormat::Mp3 => "mp3",
            VoiceFormat::Opus => "opus",
            VoiceFormat::Wav => "wav",
            VoiceFormat::M4a => "m4a",
            VoiceFormat::Aac => "aac",
        }
    }
}

/// Word-level timing requested in results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WordInfo {
    Disabled,
    Words,
    #[default]
    WordsWithPunctuation,
}

impl WordInfo {
    pub fn code(self) -> u8 {
        match self {
            WordInfo::Disabled => 0,
            WordInfo::Words => 1,
            WordInfo::WordsWithPunctuation => 2,
        }
    }
}

/// Options for a recognition request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognitionOptions {
    /// Acoustic model, e.g. `16k_zh`, `8k_en`
    #[serde(default = "default_engine_type")]
    pub engine_type: String,
    #[serde(default)]
    pub voice_format: VoiceFormat,
    /// Automatic speech/silence segmentation
    #[serde(default = "default_true")]
    pub need_vad: bool,
    #[serde(default)]
    pub filter_dirty: bool,
    #[serde(default)]
    pub filter_modal: bool,
    #[serde(default)]
    pub filter_punc: bool,
    /// Normalize spoken numerals to digits
    #[serde(default = "default_true")]
    pub convert_num_mode: bool,
    #[serde(default)]
    pub word_info: WordInfo,
    /// Silence before VAD cuts an utterance
    #[serde(default = "default_vad_silence_time_ms")]
    pub vad_silence_time_ms: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hotword_id: Option<String>,
    /// Self-learning model id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customization_id: Option<String>,
}

fn default_engine_type() -> String {
    "16k_zh".to_string()
}

fn default_true() -> bool {
    true
}

fn default_vad_silence_time_ms() -> u32 {
    200
}

impl Default for RecognitionOptions {
    fn default() -> Self {
        Self {
            engine_type: default_engine_type(),
            voice_format: VoiceFormat::default(),
            need_vad: true,
            filter_dirty: false,
            filter_modal: false,
            filter_punc: false,
            convert_num_mode: true,
            word_info: WordInfo::default(),
            vad_silence_time_ms: default_vad_silence_time_ms(),
            hotword_id: None,
            customization_id: None,
        }
    }
}

impl RecognitionOptions {
    /// Byte rate used for duration estimates of this engine's audio
    pub fn bytes_per_second(&self) -> u32 {
        if self.engine_type.starts_with("8k") {
            BYTES_PER_SECOND_8K
        } else {
            BYTES_PER_SECOND_16K
        }
    }
}

pub(crate) fn flag(value: bool) -> u8 {
    u8::from(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = RecognitionOptions::default();
        assert_eq!(options.engine_type, "16k_zh");
        assert_eq!(options.voice_format, VoiceFormat::Pcm);
        assert!(options.need_vad);
        assert!(!options.filter_dirty && !options.filter_modal && !options.filter_punc);
        assert!(options.convert_num_mode);
        assert_eq!(options.word_info.code(), 2);
        assert_eq!(options.vad_silence_time_ms, 200);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let options: RecognitionOptions = toml::from_str(
            r#"
            engine_type = "8k_en"
            voice_format = "wav"
            filter_punc = true
            "#,
        )
        .unwrap();
        assert_eq!(options.engine_type, "8k_en");
        assert_eq!(options.voice_format.code(), 12);
        assert!(options.filter_punc);
        assert!(options.need_vad);
        assert_eq!(options.bytes_per_second(), 1600);
    }
}
