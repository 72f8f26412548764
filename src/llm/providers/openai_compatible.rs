//! OpenAI-compatible chat completion provider (`{base_url}/chat/completions`).
//!
//! Both hosted backends (Aliyun DashScope compatible mode and Doubao Ark)
//! speak this protocol. All OpenAI wire types are private to this module;
//! callers only see [`ChatMessage`], [`ToolSpec`] and [`ChatStream`].
//! The provider is stateless: tool execution and the call loop belong to the
//! agent.

use std::collections::VecDeque;
use std::fmt::Display;
use std::time::Duration;

use futures_util::{Stream, StreamExt, stream};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, trace, warn};

use crate::llm::{
    ChatMessage, ChatStream, LlmResponse, LlmUsage, ProviderError, Role, ToolCall, ToolSpec,
};
use crate::sse::SseParser;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const COMPLETIONS_PATH: &str = "/chat/completions";

// ── Public provider ───────────────────────────────────────────────────────────

/// Adapter for any HTTP endpoint implementing `/chat/completions`.
///
/// Constructed once at startup, then cheaply cloned because
/// `reqwest::Client` is an `Arc` internally.
#[derive(Debug, Clone)]
pub struct OpenAiCompatibleProvider {
    client: Client,
    endpoint: String,
    model: String,
    temperature: f32,
    timeout_seconds: u64,
    max_tokens: Option<u32>,
    api_key: Option<String>,
}

impl OpenAiCompatibleProvider {
    /// `base_url` is the API root (e.g. `https://host/v1`); the completions
    /// path is appended unless already present.
    pub fn new(
        base_url: &str,
        model: String,
        temperature: f32,
        timeout_seconds: u64,
        max_tokens: Option<u32>,
        api_key: Option<String>,
    ) -> Result<Self, ProviderError> {
        // No client-wide total timeout: it would also cut long streams.
        // `generate` applies `timeout_seconds` per request instead.
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| ProviderError::Request(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: completions_endpoint(base_url),
            model,
            temperature,
            timeout_seconds,
            max_tokens,
            api_key,
        })
    }

    fn request_body(&self, messages: &[ChatMessage], tools: &[ToolSpec], stream: bool) -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: self.model.clone(),
            messages: messages.iter().map(WireMessage::from).collect(),
            temperature: Some(self.temperature),
            max_tokens: self.max_tokens,
            tools: tools.iter().map(WireTool::from).collect(),
            stream,
        }
    }

    fn post(&self, payload: &ChatCompletionRequest) -> reqwest::RequestBuilder {
        let mut req = self.client.post(&self.endpoint).json(payload);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        req
    }

    /// Single non-streaming round-trip.
    pub async fn generate(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolSpec],
    ) -> Result<LlmResponse, ProviderError> {
        let payload = self.request_body(messages, tools, false);

        debug!(
            model = %payload.model,
            messages = payload.messages.len(),
            tools = payload.tools.len(),
            "sending LLM request"
        );
        trace_payload("full LLM request payload", &payload);

        let response = self
            .post(&payload)
            .timeout(Duration::from_secs(self.timeout_seconds))
            .send()
            .await
            .map_err(|e| {
                error!(url = %self.endpoint, error = %e, "LLM HTTP request failed (transport)");
                if e.is_timeout() {
                    ProviderError::Timeout(self.timeout_seconds)
                } else {
                    ProviderError::Request(e.to_string())
                }
            })?;

        let response = check_status(response).await?;

        let parsed = response.json::<ChatCompletionResponse>().await.map_err(|e| {
            error!(error = %e, "failed to deserialize LLM response");
            ProviderError::Request(format!("failed to parse response body: {e}"))
        })?;

        debug!(choices = parsed.choices.len(), "received LLM response");
        trace_payload("full LLM response payload", &parsed);

        let usage = parsed.usage.map(|u| LlmUsage {
            input_tokens: u.prompt_tokens,
            output_tokens: u.completion_tokens,
        });

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::Request("response contained no choices".into()))?;

        let content = choice.message.content.map(|s| s.trim().to_string()).unwrap_or_default();
        let tool_calls: Vec<ToolCall> = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|c| ToolCall { id: c.id, name: c.function.name, arguments: c.function.arguments })
            .collect();

        if content.is_empty() && tool_calls.is_empty() {
            return Err(ProviderError::Request("empty or missing content in response".into()));
        }

        Ok(LlmResponse {
            message: ChatMessage { role: Role::Assistant, content, tool_calls, tool_call_id: None },
            usage,
        })
    }

    /// Streaming round-trip (`"stream": true`). The returned stream yields
    /// content deltas until `data: [DONE]` or end of body.
    pub async fn stream(&self, messages: &[ChatMessage]) -> Result<ChatStream, ProviderError> {
        let payload = self.request_body(messages, &[], true);
        debug!(model = %payload.model, messages = payload.messages.len(), "starting LLM stream");
        trace_payload("full LLM stream request payload", &payload);

        let response = self
            .post(&payload)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .send()
            .await
            .map_err(|e| {
                error!(url = %self.endpoint, error = %e, "LLM stream request failed (transport)");
                ProviderError::Request(e.to_string())
            })?;

        let response = check_status(response).await?;
        Ok(decode_stream(Box::pin(response.bytes_stream())))
    }
}

fn completions_endpoint(base_url: &str) -> String {
    let base = base_url.trim_end_matches('/');
    if base.ends_with(COMPLETIONS_PATH) {
        base.to_string()
    } else {
        format!("{base}{COMPLETIONS_PATH}")
    }
}

fn trace_payload<T: Serialize>(what: &str, value: &T) {
    if tracing::enabled!(tracing::Level::TRACE) {
        let json = serde_json::to_string_pretty(value)
            .unwrap_or_else(|e| format!("<serialization failed: {e}>"));
        trace!(payload = %json, "{what}");
    }
}

// ── Stream decoding ───────────────────────────────────────────────────────────

struct DecodeState<S> {
    body: S,
    parser: SseParser,
    queue: VecDeque<Result<String, ProviderError>>,
    finished: bool,
}

/// Turn a raw SSE byte stream of `chat.completion.chunk` objects into text deltas.
pub(crate) fn decode_stream<S, B, E>(body: S) -> ChatStream
where
    S: Stream<Item = Result<B, E>> + Send + Unpin + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Display + Send + 'static,
{
    let state = DecodeState { body, parser: SseParser::new(), queue: VecDeque::new(), finished: false };

    Box::pin(stream::unfold(state, |mut st| async move {
        loop {
            if let Some(item) = st.queue.pop_front() {
                return Some((item, st));
            }
            if st.finished {
                return None;
            }
            match st.body.next().await {
                Some(Ok(bytes)) => {
                    for frame in st.parser.feed_bytes(bytes.as_ref()) {
                        match decode_chunk(&frame.data) {
                            ChunkEvent::Delta(text) => st.queue.push_back(Ok(text)),
                            ChunkEvent::Skip => {}
                            ChunkEvent::Failed(msg) => {
                                st.queue.push_back(Err(ProviderError::Stream(msg)));
                                st.finished = true;
                                break;
                            }
                            ChunkEvent::Done => {
                                st.finished = true;
                                break;
                            }
                        }
                    }
                }
                Some(Err(e)) => {
                    st.finished = true;
                    return Some((Err(ProviderError::Stream(e.to_string())), st));
                }
                None => {
                    if let Some(frame) = st.parser.finish() {
                        if let ChunkEvent::Delta(text) = decode_chunk(&frame.data) {
                            st.queue.push_back(Ok(text));
                        }
                    }
                    st.finished = true;
                }
            }
        }
    }))
}

#[derive(Debug, PartialEq)]
enum ChunkEvent {
    Delta(String),
    Skip,
    Failed(String),
    Done,
}

fn decode_chunk(data: &str) -> ChunkEvent {
    let data = data.trim();
    if data.is_empty() {
        return ChunkEvent::Skip;
    }
    if data == "[DONE]" {
        return ChunkEvent::Done;
    }
    match serde_json::from_str::<StreamChunk>(data) {
        Ok(chunk) => {
            if let Some(err) = chunk.error {
                return ChunkEvent::Failed(err.message);
            }
            let text: String = chunk
                .choices
                .into_iter()
                .filter_map(|c| c.delta.content)
                .collect();
            if text.is_empty() { ChunkEvent::Skip } else { ChunkEvent::Delta(text) }
        }
        Err(e) => {
            warn!(error = %e, "skipping undecodable stream chunk");
            ChunkEvent::Skip
        }
    }
}

// ── Private wire types ────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: &'static str,
    /// `null` is allowed for assistant turns that only carry tool calls.
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl From<&ChatMessage> for WireMessage {
    fn from(m: &ChatMessage) -> Self {
        let tool_calls = (!m.tool_calls.is_empty()).then(|| {
            m.tool_calls
                .iter()
                .map(|c| WireToolCall {
                    id: c.id.clone(),
                    kind: "function".to_string(),
                    function: WireFunctionCall { name: c.name.clone(), arguments: c.arguments.clone() },
                })
                .collect()
        });
        let content = if m.content.is_empty() && tool_calls.is_some() {
            None
        } else {
            Some(m.content.clone())
        };
        Self { role: m.role.as_str(), content, tool_calls, tool_call_id: m.tool_call_id.clone() }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct WireToolCall {
    #[serde(default)]
    id: String,
    #[serde(rename = "type", default = "function_kind")]
    kind: String,
    function: WireFunctionCall,
}

fn function_kind() -> String {
    "function".to_string()
}

#[derive(Debug, Serialize, Deserialize)]
struct WireFunctionCall {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Serialize)]
struct WireTool {
    #[serde(rename = "type")]
    kind: &'static str,
    function: WireFunction,
}

#[derive(Debug, Serialize)]
struct WireFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

impl From<&ToolSpec> for WireTool {
    fn from(t: &ToolSpec) -> Self {
        Self {
            kind: "function",
            function: WireFunction {
                name: t.name.clone(),
                description: t.description.clone(),
                parameters: t.parameters.clone(),
            },
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<UsageData>,
}

#[derive(Debug, Serialize, Deserialize)]
struct UsageData {
    prompt_tokens: u64,
    completion_tokens: u64,
}

#[derive(Debug, Serialize, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<WireToolCall>>,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    error: Option<ErrorBody>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

// Error envelope used by OpenAI and compatible APIs.
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
    #[serde(default)]
    code: Option<serde_json::Value>,
}

/// Consume the response and return it if successful, or a structured error.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<failed to read error body>".to_string());

    let message = if let Ok(env) = serde_json::from_str::<ErrorEnvelope>(&body) {
        let code = env
            .error
            .code
            .map(|v| match v {
                serde_json::Value::String(s) => format!(" [code={s}]"),
                other => format!(" [code={other}]"),
            })
            .unwrap_or_default();
        format!("HTTP {status}{code}: {}", env.error.message)
    } else {
        format!("HTTP {status}: {body}")
    };

    error!(%status, %message, "LLM request returned HTTP error");
    Err(ProviderError::Request(message))
}
