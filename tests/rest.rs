//! REST recognition flows through `AsrClient` against a mock API endpoint.

use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method};
use wiremock::{Mock, MockServer, ResponseTemplate};

use tencent_asr_client::asr::{LongAudioOptions, TaskStatus};
use tencent_asr_client::{AppConfig, AsrClient, AsrError, Credentials, RecognitionOptions};

fn client(server: &MockServer) -> AsrClient {
    let mut config = AppConfig {
        credentials: Credentials::new("AKIDEXAMPLE", "Gu5t9xGARNpq86cd98joQYCN3EXAMPLEKEY"),
        ..Default::default()
    };
    config.api.endpoint = server.uri();
    AsrClient::new(&config).unwrap()
}

#[tokio::test]
async fn test_sentence_recognition() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(header("X-TC-Action", "SentenceRecognition"))
        .and(body_partial_json(json!({"EngSerViceType": "16k_zh", "VoiceFormat": "pcm", "DataLen": 3200})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "Response": {"Result": "测试", "AudioDuration": 1000, "RequestId": "r-1"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let result = client(&server)
        .recognize_sentence(&[0u8; 3200], &RecognitionOptions::default())
        .await
        .unwrap();
    assert_eq!(result.text, "测试");
    assert_eq!(result.audio_duration_ms, 1000);
    assert_eq!(result.request_id, "r-1");
}

#[tokio::test]
async fn test_batch_through_client() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "Response": {"Result": "ok", "AudioDuration": 10, "RequestId": "r"}
        })))
        .expect(2)
        .mount(&server)
        .await;

    let items = client(&server)
        .recognize_batch(&[vec![0u8; 10], vec![0u8; 20]], &RecognitionOptions::default())
        .await;
    assert_eq!(items.len(), 2);
    assert!(items.iter().all(|item| item.is_success()));
}

#[tokio::test]
async fn test_long_audio_lifecycle() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(header("X-TC-Action", "CreateRecTask"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "Response": {"Data": {"TaskId": 9001}, "RequestId": "r-create"}
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(header("X-TC-Action", "DescribeTaskStatus"))
        .and(body_partial_json(json!({"TaskId": 9001})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "Response": {
                "Data": {
                    "TaskId": 9001,
                    "Status": 2,
                    "StatusStr": "success",
                    "Result": "[0:0.020,0:2.380]  你好世界。\n",
                    "ErrorMsg": "",
                    "ResultDetail": [{"FinalSentence": "你好世界。", "StartMs": 20, "EndMs": 2380}]
                },
                "RequestId": "r-poll"
            }
        })))
        .mount(&server)
        .await;

    let client = client(&server);
    let mut task = client
        .submit_long_audio("https://example.com/meeting.mp3", &LongAudioOptions::default())
        .await
        .unwrap();
    assert_eq!(task.status, TaskStatus::Pending);

    let report = client.poll_long_audio(task.task_id).await.unwrap();
    assert_eq!(report.status, TaskStatus::Succeeded);
    assert_eq!(report.error_message, None);
    assert_eq!(report.result_detail.as_ref().map(Vec::len), Some(1));

    task.apply(report).unwrap();
    assert!(task.is_finished());
    assert!(task.result.unwrap().contains("你好世界"));
}

#[tokio::test]
async fn test_upstream_error_is_verbatim() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "Response": {
                "Error": {"Code": "InvalidParameterValue", "Message": "TaskId is invalid"},
                "RequestId": "r-err"
            }
        })))
        .mount(&server)
        .await;

    let err = client(&server).poll_long_audio(1).await.unwrap_err();
    assert_eq!(
        err,
        AsrError::UpstreamApi {
            code: "InvalidParameterValue".to_string(),
            message: "TaskId is invalid".to_string(),
            request_id: Some("r-err".to_string()),
        }
    );
}

#[test]
fn test_config_file_to_client() {
    let path = std::env::temp_dir().join(format!("asr-it-{}.toml", uuid::Uuid::new_v4()));
    std::fs::write(
        &path,
        r#"
        [credentials]
        secret_id = "AKIDFILE"
        secret_key = "Gu5t9xGARNpq86cd98joQYCN3EXAMPLEKEY"
        region = "ap-shanghai"

        [streaming]
        engine_type = "16k_en"
        "#,
    )
    .unwrap();

    let config = AppConfig::load(&path).unwrap();
    assert_eq!(config.credentials.region, "ap-shanghai");
    let client = AsrClient::new(&config).unwrap();
    assert_eq!(client.default_options().engine_type, "16k_en");
    let _ = std::fs::remove_file(&path);
}
