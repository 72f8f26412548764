//! DNS intent extraction.
//!
//! The model is asked to answer with a JSON `DnsOperationRequest`; the reply
//! is parsed and summarised without touching the DNS API.

use thiserror::Error;
use tracing::debug;

use crate::llm::service::LlmService;
use crate::llm::{ChatMessage, ProviderError};
use crate::types::DnsOperationRequest;

#[derive(Debug, Error)]
pub enum IntentError {
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error("failed to parse model reply: {0}")]
    Parse(String),
    #[error("unsupported action: {0}")]
    UnsupportedAction(String),
}

/// Ask the model for the user's DNS intent and decode its reply.
pub async fn parse_intent(
    llm: &LlmService,
    messages: &[ChatMessage],
    default_domain: &str,
) -> Result<DnsOperationRequest, IntentError> {
    let reply = llm.generate(messages).await?;
    debug!(reply = %reply.content, "intent reply");
    parse_reply(&reply.content, default_domain)
}

/// Decode a model reply, accepting bare JSON or a fenced ```json block.
pub fn parse_reply(reply: &str, default_domain: &str) -> Result<DnsOperationRequest, IntentError> {
    let mut req: DnsOperationRequest = serde_json::from_str(strip_fence(reply))
        .map_err(|e| IntentError::Parse(e.to_string()))?;
    if req.domain.trim().is_empty() {
        req.domain = default_domain.to_string();
    }
    Ok(req)
}

fn strip_fence(reply: &str) -> &str {
    let trimmed = reply.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // drop the info string ("json") on the opening line
    let body = rest.split_once('\n').map_or("", |(_, b)| b);
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

/// One-line summary of an operation. Only create, update and delete are
/// recognised.
pub fn describe_operation(req: &DnsOperationRequest) -> Result<String, IntentError> {
    let host = format!("{}.{}", req.rr, req.domain);
    match req.action.as_str() {
        "create" => Ok(format!(
            "created DNS record: {host} {} record pointing to {}",
            req.record_type, req.value
        )),
        "update" => Ok(format!("updated DNS record: {host}")),
        "delete" => Ok(format!("deleted DNS record: {host}")),
        other => Err(IntentError::UnsupportedAction(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::llm::LlmProvider;
    use crate::llm::providers::dummy::DummyProvider;

    #[test]
    fn bare_json_with_default_domain() {
        let req = parse_reply(r#"{"action":"create","rr":"www","type":"A","value":"1.2.3.4"}"#, "gopron.cn").unwrap();
        assert_eq!(req.domain, "gopron.cn");
        assert_eq!(req.rr, "www");
    }

    #[test]
    fn fenced_json_is_accepted() {
        let reply = "```json\n{\"action\":\"delete\",\"domain\":\"a.cn\",\"rr\":\"mail\"}\n```\n";
        let req = parse_reply(reply, "gopron.cn").unwrap();
        assert_eq!(req.action, "delete");
        assert_eq!(req.domain, "a.cn");
    }

    #[test]
    fn prose_is_a_parse_error() {
        assert!(matches!(parse_reply("Sure, here you go", "x"), Err(IntentError::Parse(_))));
    }

    #[test]
    fn describe_known_actions() {
        let mut req = DnsOperationRequest {
            action: "create".into(),
            domain: "gopron.cn".into(),
            rr: "test".into(),
            record_type: "A".into(),
            value: "192.168.1.102".into(),
            ..Default::default()
        };
        assert_eq!(
            describe_operation(&req).unwrap(),
            "created DNS record: test.gopron.cn A record pointing to 192.168.1.102"
        );
        req.action = "delete".into();
        assert_eq!(describe_operation(&req).unwrap(), "deleted DNS record: test.gopron.cn");
        req.action = "enable".into();
        assert!(matches!(describe_operation(&req), Err(IntentError::UnsupportedAction(a)) if a == "enable"));
    }

    #[tokio::test]
    async fn echo_reply_fails_to_parse() {
        let llm = LlmService::new(LlmProvider::Dummy(DummyProvider), Duration::from_secs(1), Duration::from_secs(1));
        let err = parse_intent(&llm, &[ChatMessage::user("add www")], "gopron.cn").await.unwrap_err();
        assert!(matches!(err, IntentError::Parse(_)));
    }
}
