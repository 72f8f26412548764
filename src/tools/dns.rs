//! DNS record tool. Forwards model requests to the DNS management REST API.
//!
//! The tool owns no state and performs no validation of record contents:
//! responses from the API are handed back to the model verbatim.
//!
//! ```text
//! query → GET  {base}/api/dns/records?domain=<d>[&rr=<rr>]
//! add   → POST {base}/api/dns/records   (JSON DnsRecord)
//! ```

use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use super::ToolError;
use crate::config::DnsConfig;
use crate::llm::ToolSpec;
use crate::types::{DnsRecord, DnsResponse};

pub const DNS_TOOL_NAME: &str = "aliyun_dns_operator";

const RECORDS_PATH: &str = "/api/dns/records";

#[derive(Debug, Deserialize)]
struct DnsToolArgs {
    action: String,
    #[serde(default)]
    domain: String,
    #[serde(default)]
    rr: String,
    #[serde(default, rename = "type")]
    record_type: String,
    #[serde(default)]
    value: String,
    #[serde(default)]
    ttl: u32,
}

#[derive(Debug, Clone)]
pub struct DnsTool {
    client: Client,
    records_url: String,
    default_domain: String,
}

impl DnsTool {
    pub fn new(base_url: &str, default_domain: &str, timeout_seconds: u64) -> Result<Self, ToolError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()
            .map_err(|e| ToolError::Request(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            records_url: format!("{}{RECORDS_PATH}", base_url.trim_end_matches('/')),
            default_domain: default_domain.to_string(),
        })
    }

    pub fn from_config(config: &DnsConfig) -> Result<Self, ToolError> {
        Self::new(&config.base_url, &config.default_domain, config.timeout_seconds)
    }

    pub fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: DNS_TOOL_NAME.to_string(),
            description: "Aliyun DNS record operations: query or add resolution records.".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "action": {
                        "type": "string",
                        "description": "Operation: query, add, update, delete, enable, disable"
                    },
                    "domain": { "type": "string", "description": "Domain name" },
                    "rr": { "type": "string", "description": "Host record, e.g. www" },
                    "type": { "type": "string", "description": "Record type: A, CNAME, ..." },
                    "value": { "type": "string", "description": "Record value" },
                    "ttl": { "type": "integer", "description": "TTL in seconds" },
                    "status": { "type": "string", "description": "Status: enable/disable" },
                    "record_id": { "type": "string", "description": "Record ID (needed for updates)" }
                },
                "required": ["action", "domain"]
            }),
        }
    }

    pub async fn invoke(&self, arguments_json: &str) -> Result<String, ToolError> {
        let mut args: DnsToolArgs = serde_json::from_str(arguments_json)
            .map_err(|e| ToolError::InvalidArguments(format!("{e}")))?;
        if args.domain.trim().is_empty() {
            args.domain = self.default_domain.clone();
        }

        match args.action.as_str() {
            "query" => self.query_records(&args.domain, &args.rr).await,
            "add" => {
                let record = DnsRecord {
                    domain: args.domain,
                    rr: args.rr,
                    record_type: args.record_type,
                    value: args.value,
                    ttl: args.ttl,
                    record_id: None,
                    status: None,
                };
                self.add_record(&record).await
            }
            other => Err(ToolError::UnsupportedAction(other.to_string())),
        }
    }

    async fn query_records(&self, domain: &str, rr: &str) -> Result<String, ToolError> {
        info!(%domain, %rr, "querying DNS records");
        let mut params = vec![("domain", domain)];
        if !rr.is_empty() {
            params.push(("rr", rr));
        }
        let req = self.client.get(&self.records_url).query(&params);
        self.send(req).await
    }

    async fn add_record(&self, record: &DnsRecord) -> Result<String, ToolError> {
        info!(
            domain = %record.domain,
            rr = %record.rr,
            record_type = %record.record_type,
            value = %record.value,
            ttl = record.ttl,
            "adding DNS record"
        );
        let req = self.client.post(&self.records_url).json(record);
        self.send(req).await
    }

    async fn send(&self, req: reqwest::RequestBuilder) -> Result<String, ToolError> {
        let response = req
            .send()
            .await
            .map_err(|e| ToolError::Request(format!("DNS API unreachable: {e}")))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ToolError::Request(format!("failed to read DNS API response: {e}")))?;

        match serde_json::from_str::<DnsResponse>(&body) {
            Ok(r) if !r.success => warn!(%status, message = %r.message, "DNS API reported failure"),
            _ if !status.is_success() => warn!(%status, "DNS API returned HTTP error"),
            _ => {}
        }
        Ok(body)
    }
}
