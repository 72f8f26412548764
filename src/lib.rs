//! ai-agent: an HTTP front for a chat-completion model with SSE streaming
//! and a DNS record tool.

pub mod agent;
pub mod api;
pub mod config;
pub mod error;
pub mod intent;
pub mod llm;
pub mod logger;
pub mod sse;
pub mod tools;
pub mod types;
