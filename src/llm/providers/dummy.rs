//! Dummy LLM provider: echoes the last user message back prefixed with `[echo]`.
//! Lets the service run end to end without an API key.

use futures_util::stream;

use crate::llm::{ChatMessage, ChatStream, LlmResponse, ProviderError, Role};

#[derive(Debug, Clone)]
pub struct DummyProvider;

impl DummyProvider {
    fn reply(messages: &[ChatMessage]) -> String {
        let last = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or_default();
        format!("[echo] {last}")
    }

    pub async fn generate(&self, messages: &[ChatMessage]) -> Result<LlmResponse, ProviderError> {
        Ok(LlmResponse { message: ChatMessage::assistant(Self::reply(messages)), usage: None })
    }

    /// Streams the echo one word at a time.
    pub async fn stream(&self, messages: &[ChatMessage]) -> Result<ChatStream, ProviderError> {
        let text = Self::reply(messages);
        let words: Vec<Result<String, ProviderError>> =
            text.split_inclusive(' ').map(|w| Ok(w.to_string())).collect();
        Ok(Box::pin(stream::iter(words)))
    }
}
