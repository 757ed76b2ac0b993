//! ASR Protocol Constants

use std::time::Duration;

/// REST API host (one-shot and long-audio recognition)
pub const API_HOST: &str = "asr.tencentcloudapi.com";

/// REST service name used in the credential scope
pub const API_SERVICE: &str = "asr";

/// REST API version
pub const API_VERSION: &str = "2019-06-14";

/// REST signature algorithm tag
pub const SIGN_ALGORITHM: &str = "TC3-HMAC-SHA256";

/// Terminal literal of the credential scope and key derivation chain
pub const SIGN_REQUEST_SUFFIX: &str = "tc3_request";

/// Default region when none is configured
pub const DEFAULT_REGION: &str = "ap-guangzhou";

/// Real-time WebSocket host and path prefix (the app id is appended)
pub const WEBSOCKET_HOST: &str = "asr.cloud.tencent.com";
pub const WEBSOCKET_PATH: &str = "/asr/v2/";

/// Validity of a streaming handshake signature, in seconds
pub const SIGNATURE_TTL_SECS: i64 = 86_400;

/// REST actions
pub const ACTION_SENTENCE: &str = "SentenceRecognition";
pub const ACTION_CREATE_TASK: &str = "CreateRecTask";
pub const ACTION_DESCRIBE_TASK: &str = "DescribeTaskStatus";

/// Streaming session timing
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
pub const SEND_RETRY_LIMIT: u32 = 3;
pub const SEND_RETRY_BACKOFF: Duration = Duration::from_millis(100);

/// Audio pacing: 1280 bytes (~400ms at the provider estimate) every 40ms
pub const DEFAULT_CHUNK_SIZE: usize = 1280;
pub const DEFAULT_SEND_INTERVAL: Duration = Duration::from_millis(40);

/// Result settling
pub const SETTLE_WINDOW: Duration = Duration::from_millis(500);
pub const FINAL_RESULT_TIMEOUT: Duration = Duration::from_secs(3);

/// REST request timeout
pub const API_TIMEOUT: Duration = Duration::from_secs(30);

/// Delay between consecutive one-shot calls of a batch
pub const BATCH_DELAY: Duration = Duration::from_millis(100);

/// Byte rate the provider uses for duration estimates of 16k and 8k audio
pub const BYTES_PER_SECOND_16K: u32 = 3200;
pub const BYTES_PER_SECOND_8K: u32 = 1600;
