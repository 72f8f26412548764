//! Response envelope and error mapping shared by all handlers.
//!
//! Every JSON reply has the shape `{ status, message, data, error? }`; the
//! HTTP status line carries the same code as `status`.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use crate::agent::AgentError;
use crate::intent::IntentError;
use crate::llm::ProviderError;
use crate::llm::template::TemplateError;

/// Success payload used when a handler has nothing else to return.
pub const DEFAULT_SUCCESS_DATA: &str = "success";

#[derive(Debug, Clone, Serialize)]
pub struct ApiResponse {
    pub status: u16,
    pub message: String,
    pub data: Value,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub error: String,
}

impl ApiResponse {
    /// `200 ok` carrying `data` (or [`DEFAULT_SUCCESS_DATA`]).
    pub fn success(data: Option<Value>) -> Self {
        Self {
            status: StatusCode::OK.as_u16(),
            message: "ok".to_string(),
            data: data.unwrap_or_else(|| Value::from(DEFAULT_SUCCESS_DATA)),
            error: String::new(),
        }
    }

    pub fn error(status: StatusCode, message: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            status: status.as_u16(),
            message: message.into(),
            data: Value::from(""),
            error: error.into(),
        }
    }
}

impl IntoResponse for ApiResponse {
    fn into_response(self) -> Response {
        let code = StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (code, Json(self)).into_response()
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

/// Handler failure. The display text is the envelope's `message`, the inner
/// cause its `error`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid parameters")]
    InvalidParams(String),
    #[error("request body too large")]
    BodyTooLarge(String),
    #[error("invalid parameters")]
    Template(#[from] TemplateError),
    #[error("model call failed")]
    Provider(#[from] ProviderError),
    #[error("agent call failed")]
    Agent(#[from] AgentError),
    #[error("intent analysis failed")]
    Intent(#[source] IntentError),
    #[error("DNS operation failed")]
    Operation(#[source] IntentError),
    #[error("request timed out")]
    Timeout(u64),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidParams(_) | ApiError::Template(_) => StatusCode::BAD_REQUEST,
            ApiError::BodyTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Timeout(_)
            | ApiError::Provider(ProviderError::Timeout(_))
            | ApiError::Agent(AgentError::Provider(ProviderError::Timeout(_)))
            | ApiError::Intent(IntentError::Provider(ProviderError::Timeout(_))) => {
                StatusCode::GATEWAY_TIMEOUT
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn cause(&self) -> String {
        match self {
            ApiError::InvalidParams(msg) | ApiError::BodyTooLarge(msg) => msg.clone(),
            ApiError::Template(e) => e.to_string(),
            ApiError::Provider(e) => e.to_string(),
            ApiError::Agent(e) => e.to_string(),
            ApiError::Intent(e) | ApiError::Operation(e) => e.to_string(),
            ApiError::Timeout(secs) => format!("no reply within {secs}s"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let cause = self.cause();
        warn!(%status, message = %self, error = %cause, "request failed");
        ApiResponse::error(status, self.to_string(), cause).into_response()
    }
}
