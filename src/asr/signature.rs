//! Request Signing
//!
//! Two schemes are used by the provider:
//! - REST calls carry a TC3-HMAC-SHA256 `Authorization` header built from a
//!   canonical request and a date-scoped derived key.
//! - The streaming handshake carries an HMAC-SHA1 signature of
//!   `{secret_id}{timestamp}` as a query parameter.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::DateTime;
use ring::{digest, hmac};
use serde::Serialize;
use url::form_urlencoded;

use super::constants::*;
use super::options::{flag, RecognitionOptions};
use crate::data::Credentials;
use crate::error::{AsrError, Result};

/// Content type sent with (and signed into) every REST call
pub const CONTENT_TYPE: &str = "application/json; charset=utf-8";

/// Signer for stateless REST calls
#[derive(Clone)]
pub struct RequestSigner {
    secret_id: String,
    secret_key: String,
    region: String,
    host: String,
    service: String,
    version: String,
}

impl RequestSigner {
    /// Create a signer for the default API host
    pub fn new(credentials: &Credentials) -> Result<Self> {
        credentials.validate()?;
        Ok(Self {
            secret_id: credentials.secret_id.clone(),
            secret_key: credentials.secret_key.clone(),
            region: credentials.region.clone(),
            host: API_HOST.to_string(),
            service: API_SERVICE.to_string(),
            version: API_VERSION.to_string(),
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Serialize `payload` and sign it.
    ///
    /// Returns the exact body that was hashed together with the header value;
    /// the body must be sent unchanged.
    pub fn sign<P: Serialize + ?Sized>(
        &self,
        payload: &P,
        timestamp: i64,
        action: &str,
    ) -> Result<(String, String)> {
        let body = serde_json::to_string(payload)
            .map_err(|e| AsrError::Signature(format!("Failed to serialize payload: {}", e)))?;
        let authorization = self.sign_body(&body, timestamp, action)?;
        Ok((body, authorization))
    }

    /// Sign an already serialized body
    pub fn sign_body(&self, body: &str, timestamp: i64, action: &str) -> Result<String> {
        let date = utc_date(timestamp)?;

        let mut headers = [
            ("content-type", CONTENT_TYPE.to_string()),
            ("host", self.host.clone()),
            ("x-tc-action", action.to_lowercase()),
            ("x-tc-region", self.region.to_lowercase()),
            ("x-tc-timestamp", timestamp.to_string()),
            ("x-tc-version", self.version.clone()),
        ];
        headers.sort_by(|a, b| a.0.cmp(b.0));

        let canonical_headers: String = headers
            .iter()
            .map(|(name, value)| format!("{}:{}\n", name, value.trim()))
            .collect();
        let signed_headers = headers
            .iter()
            .map(|(name, _)| *name)
            .collect::<Vec<_>>()
            .join(";");

        let canonical_request = [
            "POST",
            "/",
            "",
            canonical_headers.as_str(),
            signed_headers.as_str(),
            sha256_hex(body.as_bytes()).as_str(),
        ]
        .join("\n");

        let credential_scope = format!("{}/{}/{}", date, self.service, SIGN_REQUEST_SUFFIX);
        let string_to_sign = [
            SIGN_ALGORITHM,
            timestamp.to_string().as_str(),
            credential_scope.as_str(),
            sha256_hex(canonical_request.as_bytes()).as_str(),
        ]
        .join("\n");

        let secret_date = hmac_sha256(format!("TC3{}", self.secret_key).as_bytes(), date.as_bytes());
        let secret_service = hmac_sha256(secret_date.as_ref(), self.service.as_bytes());
        let secret_signing = hmac_sha256(secret_service.as_ref(), SIGN_REQUEST_SUFFIX.as_bytes());
        let signature = hex::encode(hmac_sha256(secret_signing.as_ref(), string_to_sign.as_bytes()));

        Ok(format!(
            "{} Credential={}/{}, SignedHeaders={}, Signature={}",
            SIGN_ALGORITHM, self.secret_id, credential_scope, signed_headers, signature
        ))
    }
}

impl std::fmt::Debug for RequestSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestSigner")
            .field("secret_id", &self.secret_id)
            .field("region", &self.region)
            .field("host", &self.host)
            .finish_non_exhaustive()
    }
}

/// Signer for the streaming handshake URL
#[derive(Clone)]
pub struct StreamSigner {
    secret_id: String,
    secret_key: String,
    app_id: String,
}

impl StreamSigner {
    pub fn new(credentials: &Credentials) -> Result<Self> {
        credentials.validate()?;
        Ok(Self {
            secret_id: credentials.secret_id.clone(),
            secret_key: credentials.secret_key.clone(),
            app_id: credentials.app_id.clone(),
        })
    }

    /// base64(HMAC-SHA1(secret_key, "{secret_id}{timestamp}"))
    pub fn sign(&self, timestamp: i64) -> String {
        let key = hmac::Key::new(hmac::HMAC_SHA1_FOR_LEGACY_USE_ONLY, self.secret_key.as_bytes());
        let tag = hmac::sign(&key, format!("{}{}", self.secret_id, timestamp).as_bytes());
        STANDARD.encode(tag.as_ref())
    }

    /// Build the authenticated `wss://` URL for one session
    pub fn build_url(
        &self,
        options: &RecognitionOptions,
        timestamp: i64,
        nonce: u32,
    ) -> Result<String> {
        if self.app_id.trim().is_empty() {
            return Err(AsrError::Configuration(
                "app_id is required for real-time recognition".to_string(),
            ));
        }

        let signature: String =
            form_urlencoded::byte_serialize(self.sign(timestamp).as_bytes()).collect();

        let mut params: Vec<(&str, String)> = vec![
            ("engine_model_type", options.engine_type.clone()),
            ("voice_format", options.voice_format.code().to_string()),
            ("needvad", flag(options.need_vad).to_string()),
            ("filter_dirty", flag(options.filter_dirty).to_string()),
            ("filter_modal", flag(options.filter_modal).to_string()),
            ("filter_punc", flag(options.filter_punc).to_string()),
            ("convert_num_mode", flag(options.convert_num_mode).to_string()),
            ("word_info", options.word_info.code().to_string()),
        ];
        if let Some(hotword_id) = options.hotword_id.as_deref().filter(|s| !s.is_empty()) {
            params.push(("hotword_id", hotword_id.to_string()));
        }
        if let Some(customization_id) = options.customization_id.as_deref().filter(|s| !s.is_empty())
        {
            params.push(("customization_id", customization_id.to_string()));
        }
        params.extend([
            ("vad_silence_time", options.vad_silence_time_ms.to_string()),
            ("secretid", self.secret_id.clone()),
            ("timestamp", timestamp.to_string()),
            ("expired", (timestamp + SIGNATURE_TTL_SECS).to_string()),
            ("nonce", nonce.to_string()),
        ]);

        let query = params
            .iter()
            .map(|(k, v)| {
                let value: String = form_urlencoded::byte_serialize(v.as_bytes()).collect();
                format!("{}={}", k, value)
            })
            .collect::<Vec<_>>()
            .join("&");

        Ok(format!(
            "wss://{}{}{}?{}&signature={}",
            WEBSOCKET_HOST, WEBSOCKET_PATH, self.app_id, query, signature
        ))
    }
}

impl std::fmt::Debug for StreamSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamSigner")
            .field("secret_id", &self.secret_id)
            .field("app_id", &self.app_id)
            .finish_non_exhaustive()
    }
}

/// Mask the signature of a streaming URL for logging
pub fn redact_url(url: &str) -> String {
    match url.find("signature=") {
        Some(pos) => format!("{}signature=***", &url[..pos]),
        None => url.to_string(),
    }
}

/// `YYYY-MM-DD` of a unix timestamp, always in UTC
pub fn utc_date(timestamp: i64) -> Result<String> {
    DateTime::from_timestamp(timestamp, 0)
        .map(|dt| dt.format("%Y-%m-%d").to_string())
        .ok_or_else(|| AsrError::Signature(format!("Timestamp out of range: {}", timestamp)))
}

fn sha256_hex(data: &[u8]) -> String {
    hex::encode(digest::digest(&digest::SHA256, data))
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> hmac::Tag {
    hmac::sign(&hmac::Key::new(hmac::HMAC_SHA256, key), data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, TimeZone};
    use serde_json::json;

    fn credentials() -> Credentials {
        Credentials {
            secret_id: "AKIDEXAMPLE".to_string(),
            secret_key: "Gu5t9xGARNpq86cd98joQYCN3EXAMPLEKEY".to_string(),
            app_id: "1250000000".to_string(),
            region: "ap-guangzhou".to_string(),
        }
    }

    #[test]
    fn test_tc3_known_answer() {
        let signer = RequestSigner::new(&credentials()).unwrap();
        let (body, auth) = signer
            .sign(&json!({"TaskId": 42}), 1_700_000_000, "DescribeTaskStatus")
            .unwrap();
        assert_eq!(body, r#"{"TaskId":42}"#);
        assert_eq!(
            auth,
            "TC3-HMAC-SHA256 Credential=AKIDEXAMPLE/2023-11-14/asr/tc3_request, \
             SignedHeaders=content-type;host;x-tc-action;x-tc-region;x-tc-timestamp;x-tc-version, \
             Signature=7201fc5691dba9ec502b92363071b024d94a0806f525362e85d40e32a678fa4d"
        );
    }

    #[test]
    fn test_signing_is_pure() {
        let signer = RequestSigner::new(&credentials()).unwrap();
        let payload = json!({"EngSerViceType": "16k_zh", "DataLen": 3});
        let first = signer.sign(&payload, 1_704_067_200, "SentenceRecognition").unwrap();
        let second = signer.sign(&payload, 1_704_067_200, "SentenceRecognition").unwrap();
        assert_eq!(first, second);

        let other_action = signer.sign(&payload, 1_704_067_200, "CreateRecTask").unwrap();
        assert_ne!(first.1, other_action.1);
    }

    #[test]
    fn test_credential_scope_uses_utc_date_at_day_boundary() {
        let signer = RequestSigner::new(&credentials()).unwrap();
        // 2024-01-01T00:00:00Z and one second earlier
        let midnight = 1_704_067_200;

        let east = FixedOffset::east_opt(14 * 3600).unwrap();
        let west = FixedOffset::west_opt(12 * 3600).unwrap();
        // Local calendars disagree with UTC on both sides of midnight
        let before = east.timestamp_opt(midnight - 1, 0).unwrap();
        assert_eq!(before.format("%Y-%m-%d").to_string(), "2024-01-01");
        let after = west.timestamp_opt(midnight, 0).unwrap();
        assert_eq!(after.format("%Y-%m-%d").to_string(), "2023-12-31");

        let auth = signer.sign_body("{}", midnight - 1, "SentenceRecognition").unwrap();
        assert!(auth.contains("/2023-12-31/asr/tc3_request"));
        let auth = signer.sign_body("{}", midnight, "SentenceRecognition").unwrap();
        assert!(auth.contains("/2024-01-01/asr/tc3_request"));
    }

    #[test]
    fn test_timestamp_out_of_range() {
        let signer = RequestSigner::new(&credentials()).unwrap();
        let err = signer.sign_body("{}", i64::MAX, "SentenceRecognition").unwrap_err();
        assert!(matches!(err, AsrError::Signature(_)));
    }

    #[test]
    fn test_missing_secret_rejected_at_construction() {
        let mut creds = credentials();
        creds.secret_key.clear();
        assert!(matches!(
            RequestSigner::new(&creds),
            Err(AsrError::Configuration(_))
        ));
        assert!(matches!(
            StreamSigner::new(&creds),
            Err(AsrError::Configuration(_))
        ));
    }

    #[test]
    fn test_stream_signature_known_answer() {
        let signer = StreamSigner::new(&credentials()).unwrap();
        assert_eq!(signer.sign(1_700_000_000), "jh3b/UUIo60B4xxYiB2YAFZp/xI=");
    }

    #[test]
    fn test_stream_url() {
        let signer = StreamSigner::new(&credentials()).unwrap();
        let url = signer
            .build_url(&RecognitionOptions::default(), 1_700_000_000, 4242)
            .unwrap();
        assert_eq!(
            url,
            "wss://asr.cloud.tencent.com/asr/v2/1250000000\
             ?engine_model_type=16k_zh&voice_format=1&needvad=1&filter_dirty=0\
             &filter_modal=0&filter_punc=0&convert_num_mode=1&word_info=2\
             &vad_silence_time=200&secretid=AKIDEXAMPLE&timestamp=1700000000\
             &expired=1700086400&nonce=4242&signature=jh3b%2FUUIo60B4xxYiB2YAFZp%2FxI%3D"
        );
        assert!(redact_url(&url).ends_with("signature=***"));
    }

    #[test]
    fn test_stream_url_optional_ids() {
        let signer = StreamSigner::new(&credentials()).unwrap();
        let options = RecognitionOptions {
            hotword_id: Some("hw-1".to_string()),
            customization_id: Some(String::new()),
            ..Default::default()
        };
        let url = signer.build_url(&options, 1_700_000_000, 1).unwrap();
        assert!(url.contains("&hotword_id=hw-1&"));
        assert!(!url.contains("customization_id"));
    }

    #[test]
    fn test_stream_url_requires_app_id() {
        let mut creds = credentials();
        creds.app_id.clear();
        let signer = StreamSigner::new(&creds).unwrap();
        let err = signer
            .build_url(&RecognitionOptions::default(), 1_700_000_000, 1)
            .unwrap_err();
        assert!(matches!(err, AsrError::Configuration(_)));
    }
}
