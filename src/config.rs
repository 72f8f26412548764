//! Configuration loading with env-var overrides.
//!
//! Reads a TOML file (by default `config/default.toml`, or
//! `config/config-<env>.toml` when `AI_AGENT_ENV` names a known environment),
//! then applies `AI_AGENT_LOG_LEVEL`. The model API key is taken from
//! `LLM_API_KEY` and never from TOML.

use std::{
    env, fmt, fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use serde::Deserialize;

use crate::error::AppError;

pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// HTTP listener configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address to bind.
    pub bind: String,
    /// Upper bound for non-streaming handlers.
    pub request_timeout_seconds: u64,
    /// Maximum accepted request body size.
    pub max_body_bytes: usize,
}

/// Which model backend is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmKind {
    Aliyun,
    Doubao,
    /// Local echo backend. No network, no API key.
    Dummy,
}

impl LlmKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LlmKind::Aliyun => "aliyun",
            LlmKind::Doubao => "doubao",
            LlmKind::Dummy => "dummy",
        }
    }
}

impl fmt::Display for LlmKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LlmKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "aliyun" => Ok(LlmKind::Aliyun),
            "doubao" => Ok(LlmKind::Doubao),
            "dummy" => Ok(LlmKind::Dummy),
            other => Err(AppError::Config(format!("unknown model type: '{other}'"))),
        }
    }
}

/// One OpenAI-compatible endpoint (`[llm.aliyun]`, `[llm.doubao]`).
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// API root; `/chat/completions` is appended.
    pub base_url: String,
    pub model: String,
    /// Not used for chat; kept so existing config files stay valid.
    pub embedding_model: Option<String>,
    pub temperature: f32,
    /// Per-request HTTP timeout.
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub kind: LlmKind,
    pub aliyun: ProviderConfig,
    pub doubao: ProviderConfig,
    /// Deadline for a single non-streaming generation.
    pub generate_timeout_seconds: u64,
    /// Deadline for a whole streamed answer.
    pub stream_timeout_seconds: u64,
}

impl LlmConfig {
    /// Endpoint settings of the active backend. `None` for the dummy backend.
    pub fn active(&self) -> Option<&ProviderConfig> {
        match self.kind {
            LlmKind::Aliyun => Some(&self.aliyun),
            LlmKind::Doubao => Some(&self.doubao),
            LlmKind::Dummy => None,
        }
    }

    /// Model name of the active backend, for logging.
    pub fn active_model(&self) -> &str {
        self.active().map(|p| p.model.as_str()).unwrap_or("echo")
    }
}

#[derive(Debug, Clone)]
pub struct SystemTemplate {
    /// Value of `{role}`.
    pub role: String,
    /// Value of `{style}`.
    pub style: String,
    /// System prompt text with `{role}` / `{style}` placeholders.
    pub content: String,
}

#[derive(Debug, Clone)]
pub struct ContextOptions {
    /// Forwarded to the model as `max_tokens` when non-zero.
    pub max_tokens: u32,
    /// Default for requests that do not say whether to stream.
    pub enable_stream: bool,
}

/// Prompt templates (`[templates]`).
#[derive(Debug, Clone)]
pub struct MessageTemplates {
    pub system: SystemTemplate,
    /// User prompt with a `{question}` placeholder.
    pub user: String,
    pub context: ContextOptions,
}

#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Maximum model→tool rounds per request.
    pub max_tool_rounds: usize,
}

#[derive(Debug, Clone)]
pub struct DnsConfig {
    pub base_url: String,
    /// Used when neither the user nor the model named a domain.
    pub default_domain: String,
    pub timeout_seconds: u64,
}

/// Fully-resolved service configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Environment label, logged at startup.
    pub env: String,
    pub log_level: String,
    pub server: ServerConfig,
    pub llm: LlmConfig,
    pub templates: MessageTemplates,
    pub agent: AgentConfig,
    pub dns: DnsConfig,
    /// API key from `LLM_API_KEY`; `None` for keyless endpoints.
    pub llm_api_key: Option<String>,
}

// ── Raw TOML shape ────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct RawConfig {
    #[serde(default = "default_env")]
    env: String,
    #[serde(default = "default_log_level")]
    log_level: String,
    #[serde(default)]
    server: RawServer,
    llm: RawLlm,
    #[serde(default)]
    templates: RawTemplates,
    #[serde(default)]
    agent: RawAgent,
    #[serde(default)]
    dns: RawDns,
}

#[derive(Deserialize)]
struct RawServer {
    #[serde(default = "default_bind")]
    bind: String,
    #[serde(default = "default_request_timeout_seconds")]
    request_timeout_seconds: u64,
    #[serde(default = "default_max_body_bytes")]
    max_body_bytes: usize,
}

impl Default for RawServer {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            request_timeout_seconds: default_request_timeout_seconds(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

#[derive(Deserialize)]
struct RawLlm {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    aliyun: RawProvider,
    #[serde(default)]
    doubao: RawProvider,
    #[serde(default = "default_generate_timeout_seconds")]
    generate_timeout_seconds: u64,
    #[serde(default = "default_stream_timeout_seconds")]
    stream_timeout_seconds: u64,
}

#[derive(Deserialize)]
struct RawProvider {
    #[serde(default)]
    base_url: String,
    #[serde(default, alias = "llm_model")]
    model: String,
    #[serde(default)]
    embedding_model: Option<String>,
    #[serde(default = "default_temperature")]
    temperature: f32,
    #[serde(default = "default_provider_timeout_seconds")]
    timeout_seconds: u64,
}

impl Default for RawProvider {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            model: String::new(),
            embedding_model: None,
            temperature: default_temperature(),
            timeout_seconds: default_provider_timeout_seconds(),
        }
    }
}

#[derive(Deserialize, Default)]
struct RawTemplates {
    #[serde(default)]
    system: RawSystemTemplate,
    #[serde(default)]
    user: RawUserTemplate,
    #[serde(default)]
    context: RawContext,
}

#[derive(Deserialize, Default)]
struct RawSystemTemplate {
    #[serde(default)]
    role: String,
    #[serde(default)]
    style: String,
    #[serde(default)]
    content: String,
}

#[derive(Deserialize)]
struct RawUserTemplate {
    #[serde(default = "default_user_template")]
    template: String,
}

impl Default for RawUserTemplate {
    fn default() -> Self {
        Self { template: default_user_template() }
    }
}

#[derive(Deserialize)]
struct RawContext {
    #[serde(default = "default_max_tokens")]
    max_tokens: u32,
    #[serde(default)]
    enable_stream: bool,
}

impl Default for RawContext {
    fn default() -> Self {
        Self { max_tokens: default_max_tokens(), enable_stream: false }
    }
}

#[derive(Deserialize)]
struct RawAgent {
    #[serde(default = "default_max_tool_rounds")]
    max_tool_rounds: usize,
}

impl Default for RawAgent {
    fn default() -> Self {
        Self { max_tool_rounds: default_max_tool_rounds() }
    }
}

#[derive(Deserialize)]
struct RawDns {
    #[serde(default = "default_dns_base_url")]
    base_url: String,
    #[serde(default = "default_dns_domain")]
    default_domain: String,
    #[serde(default = "default_dns_timeout_seconds")]
    timeout_seconds: u64,
}

impl Default for RawDns {
    fn default() -> Self {
        Self {
            base_url: default_dns_base_url(),
            default_domain: default_dns_domain(),
            timeout_seconds: default_dns_timeout_seconds(),
        }
    }
}

fn default_env() -> String { "local".to_string() }
fn default_log_level() -> String { "info".to_string() }
fn default_bind() -> String { "127.0.0.1:8800".to_string() }
fn default_request_timeout_seconds() -> u64 { 30 }
fn default_max_body_bytes() -> usize { 10 << 20 }
fn default_generate_timeout_seconds() -> u64 { 30 }
fn default_stream_timeout_seconds() -> u64 { 30 * 60 }
fn default_temperature() -> f32 { 0.7 }
fn default_provider_timeout_seconds() -> u64 { 60 }
fn default_user_template() -> String { "{question}".to_string() }
fn default_max_tokens() -> u32 { 2048 }
fn default_max_tool_rounds() -> usize { 5 }
fn default_dns_base_url() -> String { "http://localhost:8800/".to_string() }
fn default_dns_domain() -> String { "gopron.cn".to_string() }
fn default_dns_timeout_seconds() -> u64 { 10 }

// ── Loading ───────────────────────────────────────────────────────────────────

/// Pick the config file: an explicit path wins, then the `AI_AGENT_ENV`
/// environment name, then the default file.
pub fn resolve_path(cli_path: Option<&str>, env_name: Option<&str>) -> PathBuf {
    if let Some(p) = cli_path {
        return PathBuf::from(p);
    }
    match env_name {
        Some(name @ ("dev" | "test" | "prod")) => PathBuf::from(format!("config/config-{name}.toml")),
        _ => PathBuf::from(DEFAULT_CONFIG_PATH),
    }
}

/// Load config using the process environment for path selection and overrides.
pub fn load(cli_path: Option<&str>) -> Result<Config, AppError> {
    let env_name = env::var("AI_AGENT_ENV").ok();
    let log_level_override = env::var("AI_AGENT_LOG_LEVEL").ok();
    let path = resolve_path(cli_path, env_name.as_deref());
    let mut config = load_from(&path, log_level_override.as_deref())?;
    config.llm_api_key = env::var("LLM_API_KEY").ok().filter(|k| !k.is_empty());
    Ok(config)
}

/// Internal loader; accepts an explicit path and optional log-level override.
/// Tests call this directly instead of mutating env vars.
pub fn load_from(path: &Path, log_level_override: Option<&str>) -> Result<Config, AppError> {
    let raw = fs::read_to_string(path)
        .map_err(|e| AppError::Config(format!("cannot read {}: {e}", path.display())))?;
    parse(&raw, log_level_override)
        .map_err(|e| match e {
            AppError::Config(msg) => AppError::Config(format!("{}: {msg}", path.display())),
            other => other,
        })
}

/// Parse TOML text into a resolved [`Config`].
pub fn parse(text: &str, log_level_override: Option<&str>) -> Result<Config, AppError> {
    let parsed: RawConfig =
        toml::from_str(text).map_err(|e| AppError::Config(format!("parse error: {e}")))?;

    let kind: LlmKind = parsed.llm.kind.parse()?;

    let llm = LlmConfig {
        kind,
        aliyun: resolve_provider(parsed.llm.aliyun),
        doubao: resolve_provider(parsed.llm.doubao),
        generate_timeout_seconds: parsed.llm.generate_timeout_seconds,
        stream_timeout_seconds: parsed.llm.stream_timeout_seconds,
    };

    if let Some(active) = llm.active() {
        if active.base_url.is_empty() {
            return Err(AppError::Config(format!("[llm.{kind}] base_url is required")));
        }
        if active.model.is_empty() {
            return Err(AppError::Config(format!("[llm.{kind}] model is required")));
        }
    }

    let log_level = log_level_override.unwrap_or(&parsed.log_level).to_string();
    // Full directives ("ai_agent=debug,...") are left to EnvFilter.
    if !log_level.contains(['=', ',']) {
        crate::logger::parse_level(&log_level).map_err(|e| AppError::Config(e.to_string()))?;
    }

    if parsed.agent.max_tool_rounds == 0 {
        return Err(AppError::Config("[agent] max_tool_rounds must be at least 1".into()));
    }

    Ok(Config {
        env: parsed.env,
        log_level,
        server: ServerConfig {
            bind: parsed.server.bind,
            request_timeout_seconds: parsed.server.request_timeout_seconds,
            max_body_bytes: parsed.server.max_body_bytes,
        },
        llm,
        templates: MessageTemplates {
            system: SystemTemplate {
                role: parsed.templates.system.role,
                style: parsed.templates.system.style,
                content: parsed.templates.system.content,
            },
            user: parsed.templates.user.template,
            context: ContextOptions {
                max_tokens: parsed.templates.context.max_tokens,
                enable_stream: parsed.templates.context.enable_stream,
            },
        },
        agent: AgentConfig { max_tool_rounds: parsed.agent.max_tool_rounds },
        dns: DnsConfig {
            base_url: parsed.dns.base_url,
            default_domain: parsed.dns.default_domain,
            timeout_seconds: parsed.dns.timeout_seconds,
        },
        llm_api_key: None,
    })
}

fn resolve_provider(raw: RawProvider) -> ProviderConfig {
    ProviderConfig {
        base_url: raw.base_url,
        model: raw.model,
        embedding_model: raw.embedding_model.filter(|m| !m.is_empty()),
        temperature: raw.temperature,
        timeout_seconds: raw.timeout_seconds,
    }
}
