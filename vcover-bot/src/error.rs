//! Error types for vcover-bot
//!
//! [`CoverError`] is the invocation-level taxonomy. Every variant is turned
//! into exactly one chat reply at the invocation boundary via
//! [`CoverError::user_message`]. [`ApiError`] covers the HTTP surface.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::path::PathBuf;
use thiserror::Error;
use vcover_common::BackendKind;

/// Invocation error taxonomy
#[derive(Debug, Error)]
pub enum CoverError {
    /// Command arguments unusable; carries the usage text
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    /// Song search returned no candidates
    #[error("No songs found")]
    NoResultsFound,

    /// A selection wait step expired
    #[error("Selection timed out")]
    SelectionTimeout,

    /// Catalog refresh got something other than a list
    #[error("获取模型列表失败: {0}")]
    InvalidCatalogResponse(String),

    /// Catalog empty when the model step was reached
    #[error("No {0} models available")]
    NoModelsAvailable(BackendKind),

    /// Inference job exceeded the configured limit
    #[error("Inference timed out after {seconds}s")]
    InferenceTimeout { seconds: u64 },

    /// Backend reported a failure
    #[error("{0}")]
    InferenceError(String),

    /// Backend completed without naming an existing file
    #[error("Backend returned no usable file")]
    EmptyResult,

    /// Temp file could not be removed (logged only)
    #[error("Failed to delete temp file {path}: {source}")]
    TempFileCleanup {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Song search collaborator failed
    #[error("Song search failed: {0}")]
    Search(String),

    /// Chat transport failed to deliver a reply
    #[error("Transport error: {0}")]
    Transport(String),

    /// vcover-common error (config persistence)
    #[error("{0}")]
    Common(#[from] vcover_common::Error),
}

impl CoverError {
    /// Single user-facing reply for this error
    pub fn user_message(&self) -> String {
        match self {
            CoverError::InvalidArguments(usage) => usage.clone(),
            CoverError::NoResultsFound => "没能找到这首歌喵~".to_string(),
            CoverError::SelectionTimeout => "选择超时，操作已取消。".to_string(),
            CoverError::NoModelsAvailable(kind) => format!(
                "当前没有可用的 {} 模型，请先使用 /刷新{}模型。",
                kind.label(),
                kind.as_str()
            ),
            CoverError::InferenceTimeout { seconds } => format!(
                "生成超时了！后端在 {} 秒内没有完成任务。如果需要，请在配置文件中调高 'inference_timeout' 的值。",
                seconds
            ),
            CoverError::EmptyResult => "生成失败，后端未返回有效文件路径。".to_string(),
            CoverError::Search(msg) => format!("搜索歌曲时出错了: {}", msg),
            CoverError::InferenceError(msg) => format!("生成时发生严重错误: {}", msg),
            other => format!("生成时发生严重错误: {}", other),
        }
    }
}

/// HTTP API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg),
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
