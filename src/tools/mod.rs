//! Tools the model may call.
//!
//! `Tool` is an enum over concrete tools, mirroring the provider enum in
//! `llm`: adding a tool = new module + new variant + new match arms.
//! `ToolBox` is the set bound to an agent.

pub mod dns;

use thiserror::Error;
use tracing::debug;

use crate::llm::ToolSpec;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
    #[error("unsupported action: {0}")]
    UnsupportedAction(String),
    #[error("tool request failed: {0}")]
    Request(String),
}

#[derive(Debug, Clone)]
pub enum Tool {
    Dns(dns::DnsTool),
}

impl Tool {
    pub fn name(&self) -> &'static str {
        match self {
            Tool::Dns(_) => dns::DNS_TOOL_NAME,
        }
    }

    pub fn spec(&self) -> ToolSpec {
        match self {
            Tool::Dns(t) => t.spec(),
        }
    }

    /// Run the tool with the model-supplied JSON arguments.
    pub async fn invoke(&self, arguments_json: &str) -> Result<String, ToolError> {
        match self {
            Tool::Dns(t) => t.invoke(arguments_json).await,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ToolBox {
    tools: Vec<Tool>,
}

impl ToolBox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, tool: Tool) -> Self {
        self.add(tool);
        self
    }

    /// Register `tool`, replacing any tool with the same name.
    pub fn add(&mut self, tool: Tool) {
        self.tools.retain(|t| t.name() != tool.name());
        self.tools.push(tool);
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.tools.iter().map(Tool::name).collect()
    }

    pub fn specs(&self) -> Vec<ToolSpec> {
        self.tools.iter().map(Tool::spec).collect()
    }

    pub async fn invoke(&self, name: &str, arguments_json: &str) -> Result<String, ToolError> {
        let tool = self
            .tools
            .iter()
            .find(|t| t.name() == name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;
        debug!(tool = name, args_len = arguments_json.len(), "invoking tool");
        tool.invoke(arguments_json).await
    }
}
