//! ASR Protocol Handling
//!
//! Builds outbound audio frame messages and parses inbound recognition
//! messages of the real-time WebSocket protocol.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};

use super::options::VoiceFormat;
use crate::error::{AsrError, Result};

/// Position of a frame within its session.
///
/// The provider only distinguishes the first frame from the rest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceMarker {
    First,
    Rest,
}

impl SequenceMarker {
    pub fn code(self) -> u8 {
        match self {
            SequenceMarker::First => 0,
            SequenceMarker::Rest => 1,
        }
    }
}

/// One chunk of audio to send
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    pub payload: Vec<u8>,
    /// Overwritten by the session when the frame is transmitted
    pub marker: SequenceMarker,
    pub is_final: bool,
}

/// Outbound frame message
#[derive(Debug, Serialize)]
struct FrameMessage<'a> {
    voice_id: &'a str,
    end: u8,
    seq: u8,
    voice_format: u8,
    data: String,
}

/// Build the JSON text message carrying `frame`
pub fn build_frame_message(
    voice_id: &str,
    frame: &AudioFrame,
    voice_format: VoiceFormat,
) -> Result<String> {
    let message = FrameMessage {
        voice_id,
        end: u8::from(frame.is_final),
        seq: frame.marker.code(),
        voice_format: voice_format.code(),
        data: STANDARD.encode(&frame.payload),
    };
    serde_json::to_string(&message)
        .map_err(|e| AsrError::Send(format!("Failed to encode frame: {}", e)))
}

/// A word with its timing inside the utterance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Word {
    pub word: String,
    pub start_time: i64,
    pub end_time: i64,
    pub stable_flag: i64,
}

/// Parsed recognition update
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RecognitionEvent {
    pub voice_id: String,
    pub text: String,
    pub is_final: bool,
    /// 0 = utterance start, 1 = in progress, 2 = utterance end
    pub slice_type: i64,
    pub word_list: Vec<Word>,
    pub raw_code: i64,
}

#[derive(Debug, Deserialize)]
struct ServerMessage {
    code: i64,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    voice_id: String,
    #[serde(rename = "final", default)]
    is_final: i64,
    #[serde(default)]
    result: Option<ServerResult>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct ServerResult {
    #[serde(alias = "text")]
    voice_text_str: String,
    slice_type: i64,
    word_list: Option<Vec<Word>>,
}

/// Parse an inbound message.
///
/// A nonzero `code` becomes [`AsrError::Protocol`]; an undecodable message is
/// a protocol violation as well.
pub fn parse_server_message(text: &str) -> Result<RecognitionEvent> {
    let message: ServerMessage = serde_json::from_str(text).map_err(|e| AsrError::Protocol {
        code: -1,
        message: format!("Undecodable server message: {}", e),
    })?;

    if message.code != 0 {
        return Err(AsrError::Protocol {
            code: message.code,
            message: message
                .message
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| "recognition failed".to_string()),
        });
    }

    let result = message.result.unwrap_or_default();
    Ok(RecognitionEvent {
        voice_id: message.voice_id,
        text: result.voice_text_str,
        is_final: message.is_final == 1,
        slice_type: result.slice_type,
        word_list: result.word_list.unwrap_or_default(),
        raw_code: message.code,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn test_frame_message_shape() {
        let frame = AudioFrame {
            payload: vec![1, 2, 3],
            marker: SequenceMarker::First,
            is_final: false,
        };
        let text = build_frame_message("voice-1", &frame, VoiceFormat::Pcm).unwrap();
        let json: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(json["voice_id"], "voice-1");
        assert_eq!(json["end"], 0);
        assert_eq!(json["seq"], 0);
        assert_eq!(json["voice_format"], 1);
        assert_eq!(json["data"], "AQID");

        let last = AudioFrame {
            payload: Vec::new(),
            marker: SequenceMarker::Rest,
            is_final: true,
        };
        let json: Value =
            serde_json::from_str(&build_frame_message("voice-1", &last, VoiceFormat::Pcm).unwrap())
                .unwrap();
        assert_eq!(json["end"], 1);
        assert_eq!(json["seq"], 1);
        assert_eq!(json["data"], "");
    }

    #[test]
    fn test_parse_partial_result() {
        let event = parse_server_message(
            r#"{"code":0,"message":"success","voice_id":"v1","final":0,
                "result":{"slice_type":1,"index":0,"start_time":0,"end_time":400,
                "voice_text_str":"你好","word_size":0,"word_list":[]}}"#,
        )
        .unwrap();
        assert_eq!(event.text, "你好");
        assert!(!event.is_final);
        assert_eq!(event.slice_type, 1);
        assert!(event.word_list.is_empty());
    }

    #[test]
    fn test_parse_final_with_words() {
        let event = parse_server_message(
            r#"{"code":0,"voice_id":"v1","final":1,"result":{"text":"hi there","word_list":[
                {"word":"hi","start_time":0,"end_time":200,"stable_flag":1},
                {"word":"there","start_time":200,"end_time":500,"stable_flag":1}]}}"#,
        )
        .unwrap();
        assert!(event.is_final);
        assert_eq!(event.text, "hi there");
        assert_eq!(event.word_list.len(), 2);
        assert_eq!(event.word_list[1].word, "there");
    }

    #[test]
    fn test_parse_handshake_ack_without_result() {
        let event = parse_server_message(r#"{"code":0,"message":"success","voice_id":"v1"}"#)
            .unwrap();
        assert!(event.text.is_empty());
        assert!(!event.is_final);
    }

    #[test]
    fn test_parse_nonzero_code() {
        let err = parse_server_message(r#"{"code":4002,"message":"auth failed","voice_id":"v1"}"#)
            .unwrap_err();
        assert_eq!(
            err,
            AsrError::Protocol {
                code: 4002,
                message: "auth failed".to_string()
            }
        );
    }

    #[test]
    fn test_parse_garbage() {
        assert!(matches!(
            parse_server_message("not json"),
            Err(AsrError::Protocol { code: -1, .. })
        ));
    }
}
