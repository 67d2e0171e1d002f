//! Voice-conversion backend client
//!
//! Backends are Gradio apps exposing two named endpoints:
//! - `show_model()` → list of model identifiers
//! - `convert(song_name_src, key_shift, vocal_vol, inst_vol, model_dropdown)` → audio file
//!
//! Calls use Gradio's job-submission protocol: `POST .../call/{api}` returns
//! an `event_id`, and `GET .../call/{api}/{event_id}` streams SSE until a
//! `complete` or `error` event. File outputs are downloaded into a private
//! temp directory so the caller owns (and deletes) a local copy.

use crate::registry::normalize_base_url;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

const USER_AGENT: &str = "vcover/0.1.0";
const CONNECT_TIMEOUT_SECS: u64 = 30;
/// Gradio 5 mounts its API under this prefix; Gradio 4 at the root
const API_PREFIXES: [&str; 2] = ["gradio_api/", ""];

/// Backend client errors
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("API error {0}: {1}")]
    ApiError(u16, String),

    #[error("Protocol error: {0}")]
    ProtocolError(String),

    /// The job ran and reported failure
    #[error("{0}")]
    JobFailed(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Arguments of the `convert` endpoint
#[derive(Debug, Clone, PartialEq)]
pub struct ConvertRequest {
    pub song_name_src: String,
    pub key_shift: i32,
    pub vocal_vol: f64,
    pub inst_vol: f64,
    pub model_dropdown: String,
}

impl ConvertRequest {
    /// Request with both volume offsets at neutral
    pub fn new(song_id: impl Into<String>, key_shift: i32, model_id: impl Into<String>) -> Self {
        Self {
            song_name_src: song_id.into(),
            key_shift,
            vocal_vol: 0.0,
            inst_vol: 0.0,
            model_dropdown: model_id.into(),
        }
    }

    /// Positional argument list in endpoint order
    fn to_payload(&self) -> Value {
        json!([
            self.song_name_src,
            self.key_shift,
            self.vocal_vol,
            self.inst_vol,
            self.model_dropdown,
        ])
    }
}

/// Remote voice-conversion backend
///
/// `base_url` is passed per call because it can be changed at runtime.
#[async_trait]
pub trait ConversionBackend: Send + Sync {
    /// Raw output of `show_model`; callers validate the shape
    async fn show_model(&self, base_url: &str) -> Result<Value, BackendError>;

    /// Run `convert`; `Ok(None)` when the job produced no file reference
    async fn convert(
        &self,
        base_url: &str,
        request: &ConvertRequest,
    ) -> Result<Option<PathBuf>, BackendError>;
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    event_id: String,
}

/// Gradio job-submission client
pub struct GradioClient {
    http_client: reqwest::Client,
    download_dir: PathBuf,
}

impl GradioClient {
    pub fn new() -> Result<Self, BackendError> {
        Self::with_download_dir(std::env::temp_dir().join("vcover"))
    }

    pub fn with_download_dir(download_dir: PathBuf) -> Result<Self, BackendError> {
        // No overall timeout: jobs run for minutes and the caller bounds them.
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()
            .map_err(|e| BackendError::NetworkError(e.to_string()))?;

        Ok(Self {
            http_client,
            download_dir,
        })
    }

    /// Submit a job and wait for its outputs
    async fn call(
        &self,
        base_url: &str,
        api_name: &str,
        data: Value,
    ) -> Result<Value, BackendError> {
        let base = normalize_base_url(base_url);

        for (attempt, prefix) in API_PREFIXES.iter().enumerate() {
            let submit_url = format!("{}{}call/{}", base, prefix, api_name);
            tracing::debug!(url = %submit_url, "Submitting backend job");

            let response = self
                .http_client
                .post(&submit_url)
                .json(&json!({ "data": data }))
                .send()
                .await
                .map_err(|e| BackendError::NetworkError(e.to_string()))?;

            let status = response.status();
            if status == reqwest::StatusCode::NOT_FOUND && attempt + 1 < API_PREFIXES.len() {
                continue;
            }
            if !status.is_success() {
                let error_text = response.text().await.unwrap_or_default();
                return Err(BackendError::ApiError(status.as_u16(), error_text));
            }

            let submitted: SubmitResponse = response
                .json()
                .await
                .map_err(|e| BackendError::ProtocolError(e.to_string()))?;

            tracing::debug!(api = api_name, event_id = %submitted.event_id, "Backend job accepted");

            let result_url = format!("{}/{}", submit_url, submitted.event_id);
            let stream = self
                .http_client
                .get(&result_url)
                .send()
                .await
                .map_err(|e| BackendError::NetworkError(e.to_string()))?;

            let status = stream.status();
            if !status.is_success() {
                let error_text = stream.text().await.unwrap_or_default();
                return Err(BackendError::ApiError(status.as_u16(), error_text));
            }

            let body = stream
                .text()
                .await
                .map_err(|e| BackendError::NetworkError(e.to_string()))?;

            return parse_sse_result(&body);
        }

        Err(BackendError::ProtocolError(format!(
            "Endpoint /{} not found",
            api_name
        )))
    }

    /// Resolve a file output to a local path, downloading when needed
    async fn materialize(
        &self,
        base_url: &str,
        output: &Value,
    ) -> Result<Option<PathBuf>, BackendError> {
        match output {
            Value::String(path) if !path.is_empty() => Ok(Some(PathBuf::from(path))),
            Value::Object(map) => {
                if let Some(url) = map.get("url").and_then(Value::as_str) {
                    let name = map
                        .get("orig_name")
                        .and_then(Value::as_str)
                        .or_else(|| map.get("path").and_then(Value::as_str))
                        .map(file_name_of)
                        .unwrap_or("output.wav");
                    let path = self.download(&absolute_url(base_url, url), name).await?;
                    Ok(Some(path))
                } else {
                    Ok(map
                        .get("path")
                        .and_then(Value::as_str)
                        .filter(|p| !p.is_empty())
                        .map(PathBuf::from))
                }
            }
            _ => Ok(None),
        }
    }

    async fn download(&self, url: &str, file_name: &str) -> Result<PathBuf, BackendError> {
        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(|e| BackendError::NetworkError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(BackendError::ApiError(
                status.as_u16(),
                format!("download of {} failed", url),
            ));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| BackendError::NetworkError(e.to_string()))?;

        tokio::fs::create_dir_all(&self.download_dir).await?;
        let path = self
            .download_dir
            .join(format!("{}_{}", Uuid::new_v4().simple(), file_name));
        tokio::fs::write(&path, &bytes).await?;

        tracing::debug!(path = %path.display(), bytes = bytes.len(), "Downloaded backend output");
        Ok(path)
    }
}

#[async_trait]
impl ConversionBackend for GradioClient {
    async fn show_model(&self, base_url: &str) -> Result<Value, BackendError> {
        let outputs = self.call(base_url, "show_model", json!([])).await?;
        Ok(single_output(outputs))
    }

    async fn convert(
        &self,
        base_url: &str,
        request: &ConvertRequest,
    ) -> Result<Option<PathBuf>, BackendError> {
        let outputs = self.call(base_url, "convert", request.to_payload()).await?;
        self.materialize(base_url, &single_output(outputs)).await
    }
}

fn absolute_url(base_url: &str, url: &str) -> String {
    if url.starts_with("http://") || url.starts_with("https://") {
        url.to_string()
    } else {
        format!("{}{}", normalize_base_url(base_url), url.trim_start_matches('/'))
    }
}

fn file_name_of(path: &str) -> &str {
    Path::new(path)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("output.wav")
}

/// Endpoints with one output return it unwrapped
fn single_output(outputs: Value) -> Value {
    match outputs {
        Value::Array(mut items) if items.len() == 1 => items.remove(0),
        other => other,
    }
}

/// Extract the job outcome from a Gradio SSE result stream
fn parse_sse_result(body: &str) -> Result<Value, BackendError> {
    let mut event = "";

    for line in body.lines() {
        if let Some(name) = line.strip_prefix("event:") {
            event = name.trim();
        } else if let Some(data) = line.strip_prefix("data:") {
            let data = data.trim();
            match event {
                "complete" => {
                    return serde_json::from_str(data)
                        .map_err(|e| BackendError::ProtocolError(e.to_string()));
                }
                "error" => {
                    let message = match serde_json::from_str::<Value>(data) {
                        Ok(Value::String(s)) => s,
                        Ok(Value::Null) | Err(_) if data.is_empty() || data == "null" => {
                            "backend job failed".to_string()
                        }
                        _ => data.to_string(),
                    };
                    return Err(BackendError::JobFailed(message));
                }
                _ => {}
            }
        }
    }

    Err(BackendError::ProtocolError(
        "result stream ended without a complete event".to_string(),
    ))
}
