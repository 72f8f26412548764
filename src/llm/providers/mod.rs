//! LLM provider implementations.
//!
//! `build(config, max_tokens, api_key)` is the factory, called at startup.
//! Adding a new backend = new module + new match arm.

pub mod dummy;
pub mod openai_compatible;

use crate::config::{LlmConfig, LlmKind};
use crate::llm::{LlmProvider, ProviderError};

/// Construct a `LlmProvider` for the active `[llm]` backend.
///
/// `api_key` is sourced from `LLM_API_KEY` env (never TOML) and is `None`
/// for keyless local models.
pub fn build(
    config: &LlmConfig,
    max_tokens: u32,
    api_key: Option<String>,
) -> Result<LlmProvider, ProviderError> {
    match (config.kind, config.active()) {
        (LlmKind::Dummy, _) => Ok(LlmProvider::Dummy(dummy::DummyProvider)),
        (_, Some(p)) => {
            let provider = openai_compatible::OpenAiCompatibleProvider::new(
                &p.base_url,
                p.model.clone(),
                p.temperature,
                p.timeout_seconds,
                (max_tokens > 0).then_some(max_tokens),
                api_key,
            )?;
            Ok(LlmProvider::OpenAiCompatible(provider))
        }
        (kind, None) => Err(ProviderError::UnknownProvider(kind.to_string())),
    }
}
