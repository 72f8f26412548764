//! Request and record shapes shared by the HTTP API and the DNS tool.

use serde::{Deserialize, Serialize};

/// Body of the chat endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct AskQuestionReq {
    #[serde(default)]
    pub question: String,
    /// `None` falls back to `templates.context.enable_stream`.
    #[serde(default)]
    pub stream: Option<bool>,
}

/// A DNS operation as extracted from a model reply.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DnsOperationRequest {
    /// create / update / delete / enable / disable / query
    pub action: String,
    pub domain: String,
    /// Host record, e.g. `www`.
    pub rr: String,
    #[serde(rename = "type")]
    pub record_type: String,
    pub value: String,
    pub ttl: u32,
    pub status: String,
    pub record_id: String,
}

/// Record body sent to the DNS API when adding a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsRecord {
    pub domain: String,
    pub rr: String,
    #[serde(rename = "type")]
    pub record_type: String,
    pub value: String,
    pub ttl: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

/// Envelope returned by the DNS API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DnsResponse {
    pub success: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ask_question_defaults() {
        let req: AskQuestionReq = serde_json::from_str("{}").unwrap();
        assert!(req.question.is_empty());
        assert!(req.stream.is_none());
    }

    #[test]
    fn operation_request_tolerates_missing_fields() {
        let req: DnsOperationRequest =
            serde_json::from_str(r#"{"action":"create","rr":"www","type":"A"}"#).unwrap();
        assert_eq!(req.action, "create");
        assert_eq!(req.record_type, "A");
        assert_eq!(req.ttl, 0);
        assert!(req.domain.is_empty());
    }

    #[test]
    fn record_serializes_type_field() {
        let rec = DnsRecord {
            domain: "test.cn".into(),
            rr: "test".into(),
            record_type: "A".into(),
            value: "192.168.1.102".into(),
            ttl: 300,
            record_id: None,
            status: None,
        };
        let json = serde_json::to_value(&rec).unwrap();
        assert_eq!(json["type"], "A");
        assert_eq!(json["ttl"], 300);
        assert!(json.get("record_id").is_none());
    }
}
