//! Tool-calling agent.
//!
//! One request runs a bounded loop: ask the model with every tool spec bound;
//! if it asks for tool calls, run them and feed the results back as `tool`
//! messages; stop on a plain answer or after `max_rounds` model turns.
//! Tool failures are not fatal: the error text becomes the tool output so
//! the model can explain it to the user.

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::llm::service::LlmService;
use crate::llm::{ChatMessage, ProviderError, Role};
use crate::tools::{Tool, ToolBox};

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("no input messages")]
    EmptyConversation,
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

#[derive(Debug, Clone)]
pub struct Agent {
    llm: LlmService,
    tools: ToolBox,
    max_rounds: usize,
}

impl Agent {
    pub fn new(llm: LlmService, tools: ToolBox, max_rounds: usize) -> Self {
        Self { llm, tools, max_rounds: max_rounds.max(1) }
    }

    /// Bind another tool. A tool with the same name is replaced.
    pub fn add_tool(&mut self, tool: Tool) {
        info!(tool = tool.name(), "tool bound to agent");
        self.tools.add(tool);
    }

    pub fn tool_names(&self) -> Vec<&'static str> {
        self.tools.names()
    }

    /// Run the loop over `messages` and return only the messages it produced,
    /// in order: assistant turns interleaved with their tool results.
    pub async fn invoke(&self, messages: &[ChatMessage]) -> Result<Vec<ChatMessage>, AgentError> {
        if messages.is_empty() {
            return Err(AgentError::EmptyConversation);
        }

        let specs = self.tools.specs();
        let mut transcript = messages.to_vec();
        let start = transcript.len();

        for round in 1..=self.max_rounds {
            let reply = self.llm.complete(&transcript, &specs).await?.message;
            let calls = reply.tool_calls.clone();
            transcript.push(reply);

            if calls.is_empty() {
                debug!(round, "agent finished with a plain answer");
                break;
            }

            for call in &calls {
                debug!(round, tool = %call.name, call_id = %call.id, "model requested tool");
                let output = match self.tools.invoke(&call.name, &call.arguments).await {
                    Ok(out) => out,
                    Err(e) => {
                        warn!(tool = %call.name, error = %e, "tool call failed");
                        format!("error: {e}")
                    }
                };
                transcript.push(ChatMessage::tool(call.id.clone(), output));
            }

            if round == self.max_rounds {
                warn!(max_rounds = self.max_rounds, "tool round limit reached");
            }
        }

        Ok(transcript.split_off(start))
    }
}

/// The user-facing answer of an agent run: the last assistant text, else the
/// last tool output.
pub fn final_answer(messages: &[ChatMessage]) -> Option<&str> {
    let last_with = |role: Role| {
        messages
            .iter()
            .rev()
            .find(|m| m.role == role && !m.content.trim().is_empty())
            .map(|m| m.content.as_str())
    };
    last_with(Role::Assistant).or_else(|| last_with(Role::Tool))
}
