//! Signed REST API Client
//!
//! Posts TC3-signed JSON requests to the cloud API and unwraps the
//! `{"Response": {...}}` envelope.

use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::signature::{RequestSigner, CONTENT_TYPE};
use crate::data::ApiConfig;
use crate::error::{AsrError, Result};

/// Caller for signed REST actions
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: Client,
    signer: RequestSigner,
    endpoint: String,
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "Response")]
    response: serde_json::Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ErrorBody {
    code: String,
    #[serde(default)]
    message: String,
}

impl ApiClient {
    pub fn new(signer: RequestSigner, config: &ApiConfig) -> Result<Self> {
        let mut builder = Client::builder().timeout(config.timeout());
        if let Some(proxy) = config.proxy.as_deref().filter(|p| !p.trim().is_empty()) {
            let proxy = reqwest::Proxy::all(proxy)
                .map_err(|e| AsrError::Configuration(format!("Invalid proxy {}: {}", proxy, e)))?;
            tracing::info!("Using proxy for API requests");
            builder = builder.proxy(proxy);
        }
        let http = builder
            .build()
            .map_err(|e| AsrError::Configuration(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            signer,
            endpoint: config.endpoint.clone(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Sign and post `payload` as `action`, decoding `Response` into `R`
    pub async fn call<P, R>(&self, action: &str, payload: &P) -> Result<R>
    where
        P: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let timestamp = chrono::Utc::now().timestamp();
        let (body, authorization) = self.signer.sign(payload, timestamp, action)?;

        tracing::debug!("Calling {} ({} byte body)", action, body.len());
        let response = self
            .http
            .post(&self.endpoint)
            .header("Content-Type", CONTENT_TYPE)
            .header("Host", self.signer.host())
            .header("Authorization", authorization)
            .header("X-TC-Action", action)
            .header("X-TC-Version", self.signer.version())
            .header("X-TC-Timestamp", timestamp.to_string())
            .header("X-TC-Region", self.signer.region())
            .body(body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        let envelope: Envelope = match serde_json::from_str(&text) {
            Ok(envelope) => envelope,
            Err(_) if !status.is_success() => {
                return Err(AsrError::Http(format!("{} returned {}", action, status)));
            }
            Err(e) => {
                return Err(AsrError::InvalidResponse(format!(
                    "{} response is not an API envelope: {}",
                    action, e
                )));
            }
        };

        let mut response = envelope.response;
        if let Some(error) = response.get("Error") {
            let request_id = response
                .get("RequestId")
                .and_then(|v| v.as_str())
                .map(str::to_string);
            let error: ErrorBody = serde_json::from_value(error.clone()).map_err(|e| {
                AsrError::InvalidResponse(format!("Malformed error body: {}", e))
            })?;
            tracing::error!(
                "{} failed [{}]: {} (request id: {:?})",
                action,
                error.code,
                error.message,
                request_id
            );
            return Err(AsrError::UpstreamApi {
                code: error.code,
                message: error.message,
                request_id,
            });
        }

        serde_json::from_value(response.take()).map_err(|e| {
            AsrError::InvalidResponse(format!("Unexpected {} response: {}", action, e))
        })
    }
}
