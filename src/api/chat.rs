//! Axum handlers for the chat routes.
//!
//! Non-streaming work runs under `server.request_timeout_seconds`; expiry
//! maps to 504.

use std::future::Future;
use std::time::Duration;

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde_json::{Value, json};
use tracing::info;
use uuid::Uuid;

use super::AppState;
use super::common::{ApiError, ApiResponse};
use super::stream;
use crate::agent::final_answer;
use crate::intent::{describe_operation, parse_intent};
use crate::llm::template::messages_from_template;
use crate::types::AskQuestionReq;

// ── Helpers ───────────────────────────────────────────────────────────────────

/// Unwrap the body, rejecting malformed JSON and blank questions as 400
/// and bodies over the size limit as 413.
fn ask_request(payload: Result<Json<AskQuestionReq>, JsonRejection>) -> Result<AskQuestionReq, ApiError> {
    let Json(req) = payload.map_err(|e| match e.status() {
        StatusCode::PAYLOAD_TOO_LARGE => ApiError::BodyTooLarge(e.body_text()),
        _ => ApiError::InvalidParams(e.body_text()),
    })?;
    if req.question.trim().is_empty() {
        return Err(ApiError::InvalidParams("question is required".to_string()));
    }
    Ok(req)
}

async fn within<T, E>(secs: u64, fut: impl Future<Output = Result<T, E>>) -> Result<T, ApiError>
where
    ApiError: From<E>,
{
    match tokio::time::timeout(Duration::from_secs(secs), fut).await {
        Ok(result) => result.map_err(ApiError::from),
        Err(_) => Err(ApiError::Timeout(secs)),
    }
}

// ── Handlers ──────────────────────────────────────────────────────────────────

/// GET /ping
pub(super) async fn ping() -> Json<Value> {
    Json(json!({ "message": "pong" }))
}

/// POST /api/chat
pub(super) async fn chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<AskQuestionReq>, JsonRejection>,
) -> Result<Response, ApiError> {
    let req = ask_request(payload)?;
    let request_id = Uuid::new_v4();
    let messages = messages_from_template(&state.config.templates, &req.question)?;
    let streaming = req.stream.unwrap_or(state.config.templates.context.enable_stream);
    info!(%request_id, streaming, "chat request");

    if streaming {
        let sse = stream::relay(&state, &headers, &messages, request_id).await?;
        return Ok(sse.into_response());
    }

    let secs = state.config.server.request_timeout_seconds;
    let reply = within(secs, state.llm.generate(&messages)).await?;
    info!(%request_id, chars = reply.content.len(), "chat answered");
    Ok(ApiResponse::success(Some(Value::from(reply.content))).into_response())
}

/// POST /api/chat2
pub(super) async fn chat_agent(
    State(state): State<AppState>,
    payload: Result<Json<AskQuestionReq>, JsonRejection>,
) -> Result<ApiResponse, ApiError> {
    let req = ask_request(payload)?;
    let request_id = Uuid::new_v4();
    let messages = messages_from_template(&state.config.templates, &req.question)?;
    info!(%request_id, tools = ?state.agent.tool_names(), "agent request");

    let secs = state.config.server.request_timeout_seconds;
    let produced = within(secs, state.agent.invoke(&messages)).await?;
    let answer = final_answer(&produced).unwrap_or_default().to_string();
    info!(%request_id, messages = produced.len(), "agent answered");

    Ok(ApiResponse::success(Some(json!({ "answer": answer, "messages": produced }))))
}

/// POST /api/intent
///
/// An empty `action` means the question is not about DNS; it is answered
/// as plain chat.
pub(super) async fn intent(
    State(state): State<AppState>,
    payload: Result<Json<AskQuestionReq>, JsonRejection>,
) -> Result<ApiResponse, ApiError> {
    let req = ask_request(payload)?;
    let request_id = Uuid::new_v4();
    let messages = messages_from_template(&state.config.templates, &req.question)?;
    let secs = state.config.server.request_timeout_seconds;

    let operation = within(secs, async {
        parse_intent(&state.llm, &messages, &state.config.dns.default_domain)
            .await
            .map_err(ApiError::Intent)
    })
    .await?;
    info!(%request_id, action = %operation.action, domain = %operation.domain, "intent parsed");

    if operation.action.is_empty() {
        let reply = within(secs, state.llm.generate(&messages)).await?;
        return Ok(ApiResponse::success(Some(Value::from(reply.content))));
    }

    let summary = describe_operation(&operation).map_err(ApiError::Operation)?;
    Ok(ApiResponse::success(Some(Value::from(summary))))
}
