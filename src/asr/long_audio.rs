//! Long-Audio Tasks
//!
//! Asynchronous transcription of a remote audio file: `CreateRecTask`
//! submits it, `DescribeTaskStatus` reports progress. Polling cadence is up
//! to the caller.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::api::ApiClient;
use super::constants::{ACTION_CREATE_TASK, ACTION_DESCRIBE_TASK};
use super::options::flag;
use crate::error::{AsrError, Result};

/// Server-side task state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl TaskStatus {
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(TaskStatus::Pending),
            1 => Some(TaskStatus::Running),
            2 => Some(TaskStatus::Succeeded),
            3 => Some(TaskStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Succeeded | TaskStatus::Failed)
    }

    fn rank(self) -> u8 {
        match self {
            TaskStatus::Pending => 0,
            TaskStatus::Running => 1,
            TaskStatus::Succeeded | TaskStatus::Failed => 2,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Succeeded => "succeeded",
            TaskStatus::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Options for a long-audio task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LongAudioOptions {
    #[serde(default = "default_engine_type")]
    pub engine_type: String,
    #[serde(default = "default_channel_num")]
    pub channel_num: u32,
    /// 0 = plain text, higher values add word and punctuation detail
    #[serde(default)]
    pub res_text_format: u32,
    #[serde(default)]
    pub filter_dirty: bool,
    #[serde(default)]
    pub filter_modal: bool,
    #[serde(default)]
    pub filter_punc: bool,
    #[serde(default = "default_true")]
    pub convert_num_mode: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback_url: Option<String>,
}

fn default_engine_type() -> String {
    "16k_zh".to_string()
}

fn default_channel_num() -> u32 {
    1
}

fn default_true() -> bool {
    true
}

impl Default for LongAudioOptions {
    fn default() -> Self {
        Self {
            engine_type: default_engine_type(),
            channel_num: default_channel_num(),
            res_text_format: 0,
            filter_dirty: false,
            filter_modal: false,
            filter_punc: false,
            convert_num_mode: true,
            callback_url: None,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct CreateTaskPayload<'a> {
    engine_model_type: &'a str,
    channel_num: u32,
    res_text_format: u32,
    source_type: u32,
    url: &'a str,
    filter_dirty: u8,
    filter_modal: u8,
    filter_punc: u8,
    convert_num_mode: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    callback_url: Option<&'a str>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeTaskPayload {
    task_id: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CreateTaskResponse {
    data: CreateTaskData,
    #[serde(default)]
    request_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CreateTaskData {
    task_id: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeTaskResponse {
    data: TaskData,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct TaskData {
    task_id: u64,
    status: i64,
    #[serde(default)]
    status_str: String,
    #[serde(default)]
    result: Option<String>,
    #[serde(default)]
    error_msg: Option<String>,
    #[serde(default)]
    result_detail: Option<Vec<serde_json::Value>>,
}

/// One `DescribeTaskStatus` answer
#[derive(Debug, Clone, PartialEq)]
pub struct TaskStatusReport {
    pub task_id: u64,
    pub status: TaskStatus,
    pub status_str: String,
    pub result: Option<String>,
    pub error_message: Option<String>,
    /// Per-sentence detail, present when `res_text_format` asked for it
    pub result_detail: Option<Vec<serde_json::Value>>,
}

/// Local record of a submitted task
#[derive(Debug, Clone, PartialEq)]
pub struct LongAudioTask {
    pub task_id: u64,
    pub request_id: String,
    pub status: TaskStatus,
    pub result: Option<String>,
    pub error_message: Option<String>,
}

impl LongAudioTask {
    fn submitted(task_id: u64, request_id: String) -> Self {
        Self {
            task_id,
            request_id,
            status: TaskStatus::Pending,
            result: None,
            error_message: None,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.status.is_terminal()
    }

    /// Advance the record with a polled report.
    ///
    /// Status only moves forward: Pending, Running, then one terminal state.
    pub fn apply(&mut self, report: TaskStatusReport) -> Result<()> {
        if report.task_id != self.task_id {
            return Err(AsrError::InvalidResponse(format!(
                "Report for task {} applied to task {}",
                report.task_id, self.task_id
            )));
        }
        let regressed = report.status.rank() < self.status.rank()
            || (self.status.is_terminal() && report.status != self.status);
        if regressed {
            return Err(AsrError::InvalidResponse(format!(
                "Task {} status regressed from {} to {}",
                self.task_id, self.status, report.status
            )));
        }

        if report.status != self.status {
            tracing::info!("Task {}: {} -> {}", self.task_id, self.status, report.status);
        }
        self.status = report.status;
        if report.result.is_some() {
            self.result = report.result;
        }
        if report.error_message.is_some() {
            self.error_message = report.error_message;
        }
        Ok(())
    }
}

/// Submit the audio at `audio_url` for transcription
pub async fn submit(
    api: &ApiClient,
    audio_url: &str,
    options: &LongAudioOptions,
) -> Result<LongAudioTask> {
    if audio_url.trim().is_empty() {
        return Err(AsrError::Configuration("audio url is empty".to_string()));
    }
    let payload = CreateTaskPayload {
        engine_model_type: &options.engine_type,
        channel_num: options.channel_num,
        res_text_format: options.res_text_format,
        // Audio fetched from a URL
        source_type: 0,
        url: audio_url,
        filter_dirty: flag(options.filter_dirty),
        filter_modal: flag(options.filter_modal),
        filter_punc: flag(options.filter_punc),
        convert_num_mode: flag(options.convert_num_mode),
        callback_url: options.callback_url.as_deref(),
    };

    let response: CreateTaskResponse = api.call(ACTION_CREATE_TASK, &payload).await?;
    tracing::info!("Created long-audio task {}", response.data.task_id);
    Ok(LongAudioTask::submitted(response.data.task_id, response.request_id))
}

/// Query the current state of a task
pub async fn poll(api: &ApiClient, task_id: u64) -> Result<TaskStatusReport> {
    let response: DescribeTaskResponse = api
        .call(ACTION_DESCRIBE_TASK, &DescribeTaskPayload { task_id })
        .await?;
    let data = response.data;
    let status = TaskStatus::from_code(data.status).ok_or_else(|| {
        AsrError::InvalidResponse(format!("Unknown task status {}", data.status))
    })?;
    tracing::debug!("Task {} is {} ({})", data.task_id, status, data.status_str);

    Ok(TaskStatusReport {
        task_id: data.task_id,
        status,
        status_str: data.status_str,
        result: data.result.filter(|r| !r.is_empty()),
        error_message: data.error_msg.filter(|m| !m.is_empty()),
        result_detail: data.result_detail,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asr::api::test_support::client_for;
    use serde_json::json;
    use wiremock::matchers::{body_json, body_partial_json, header, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn report(status: TaskStatus) -> TaskStatusReport {
        TaskStatusReport {
            task_id: 7,
            status,
            status_str: status.to_string(),
            result: None,
            error_message: None,
            result_detail: None,
        }
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(TaskStatus::from_code(0), Some(TaskStatus::Pending));
        assert_eq!(TaskStatus::from_code(3), Some(TaskStatus::Failed));
        assert_eq!(TaskStatus::from_code(4), None);
        assert!(TaskStatus::Succeeded.is_terminal());
        assert!(!TaskStatus::Running.is_terminal());
    }

    #[test]
    fn test_apply_moves_forward_only() {
        let mut task = LongAudioTask::submitted(7, "req".to_string());
        task.apply(report(TaskStatus::Running)).unwrap();
        assert!(task.apply(report(TaskStatus::Pending)).is_err());

        let mut done = report(TaskStatus::Succeeded);
        done.result = Some("[0:0.000,0:1.200]  你好。".to_string());
        task.apply(done).unwrap();
        assert!(task.is_finished());
        assert!(task.result.as_deref().is_some_and(|r| r.contains("你好")));

        // Repeated terminal report is fine, leaving it is not
        task.apply(report(TaskStatus::Succeeded)).unwrap();
        assert!(task.apply(report(TaskStatus::Running)).is_err());
        assert!(task.apply(report(TaskStatus::Failed)).is_err());
        assert_eq!(task.status, TaskStatus::Succeeded);

        let mut other = report(TaskStatus::Succeeded);
        other.task_id = 8;
        assert!(task.apply(other).is_err());
    }

    #[tokio::test]
    async fn test_submit_and_poll() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("X-TC-Action", "CreateRecTask"))
            .and(body_partial_json(json!({
                "EngineModelType": "16k_zh",
                "ChannelNum": 1,
                "ResTextFormat": 0,
                "SourceType": 0,
                "Url": "https://example.com/a.wav",
                "ConvertNumMode": 1
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "Response": {"Data": {"TaskId": 1234}, "RequestId": "req-create"}
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(header("X-TC-Action", "DescribeTaskStatus"))
            .and(body_json(json!({"TaskId": 1234})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "Response": {
                    "Data": {
                        "TaskId": 1234,
                        "Status": 3,
                        "StatusStr": "failed",
                        "Result": "",
                        "ErrorMsg": "Failed to download audio file!",
                        "ResultDetail": null
                    },
                    "RequestId": "req-poll"
                }
            })))
            .mount(&server)
            .await;

        let api = client_for(&server.uri());
        let mut task = submit(&api, "https://example.com/a.wav", &LongAudioOptions::default())
            .await
            .unwrap();
        assert_eq!(task.task_id, 1234);
        assert_eq!(task.request_id, "req-create");
        assert_eq!(task.status, TaskStatus::Pending);

        let report = poll(&api, task.task_id).await.unwrap();
        assert_eq!(report.status, TaskStatus::Failed);
        assert_eq!(report.result, None);
        assert_eq!(report.error_message.as_deref(), Some("Failed to download audio file!"));
        task.apply(report).unwrap();
        assert!(task.is_finished());
    }

    #[tokio::test]
    async fn test_submit_rejects_empty_url() {
        let api = client_for("http://127.0.0.1:9");
        assert!(matches!(
            submit(&api, " ", &LongAudioOptions::default()).await,
            Err(AsrError::Configuration(_))
        ));
    }
}
