//! Deadline-bounded access to the configured provider.

use std::time::Duration;

use futures_util::{StreamExt, stream};
use tokio::time::{Instant, timeout, timeout_at};
use tracing::debug;

use crate::config::LlmConfig;
use crate::llm::{ChatMessage, ChatStream, LlmProvider, LlmResponse, ProviderError, ToolSpec};

#[derive(Debug, Clone)]
pub struct LlmService {
    provider: LlmProvider,
    generate_timeout: Duration,
    stream_timeout: Duration,
}

impl LlmService {
    pub fn new(provider: LlmProvider, generate_timeout: Duration, stream_timeout: Duration) -> Self {
        Self { provider, generate_timeout, stream_timeout }
    }

    pub fn from_config(provider: LlmProvider, config: &LlmConfig) -> Self {
        Self::new(
            provider,
            Duration::from_secs(config.generate_timeout_seconds),
            Duration::from_secs(config.stream_timeout_seconds),
        )
    }

    /// One model turn with `tools` bound, under the generation deadline.
    pub async fn complete(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolSpec],
    ) -> Result<LlmResponse, ProviderError> {
        let response = match timeout(self.generate_timeout, self.provider.generate(messages, tools)).await {
            Ok(result) => result?,
            Err(_) => return Err(ProviderError::Timeout(self.generate_timeout.as_secs())),
        };
        if let Some(usage) = &response.usage {
            debug!(input_tokens = usage.input_tokens, output_tokens = usage.output_tokens, "model usage");
        }
        Ok(response)
    }

    /// One-shot answer without tools.
    pub async fn generate(&self, messages: &[ChatMessage]) -> Result<ChatMessage, ProviderError> {
        self.complete(messages, &[]).await.map(|r| r.message)
    }

    /// Streamed answer. The deadline covers opening the stream and every
    /// item after it; hitting it yields a final `Timeout` item.
    pub async fn stream(&self, messages: &[ChatMessage]) -> Result<ChatStream, ProviderError> {
        let secs = self.stream_timeout.as_secs();
        let deadline = Instant::now() + self.stream_timeout;

        let inner = timeout_at(deadline, self.provider.stream(messages))
            .await
            .map_err(|_| ProviderError::Timeout(secs))??;

        Ok(bounded(inner, deadline, secs))
    }
}

/// Stop `inner` at `deadline`, emitting one `Timeout` item when it fires.
fn bounded(inner: ChatStream, deadline: Instant, secs: u64) -> ChatStream {
    Box::pin(stream::unfold(Some(inner), move |state| async move {
        let mut inner = state?;
        match timeout_at(deadline, inner.next()).await {
            Ok(Some(item)) => Some((item, Some(inner))),
            Ok(None) => None,
            Err(_) => Some((Err(ProviderError::Timeout(secs)), None)),
        }
    }))
}

/// Drain a stream into one string, skipping empty deltas.
pub async fn collect_stream(mut stream: ChatStream) -> Result<String, ProviderError> {
    let mut out = String::new();
    let mut index = 0usize;
    while let Some(delta) = stream.next().await {
        let delta = delta?;
        if delta.is_empty() {
            continue;
        }
        debug!(index, content = %delta.trim(), "stream chunk");
        out.push_str(&delta);
        index += 1;
    }
    Ok(out)
}
