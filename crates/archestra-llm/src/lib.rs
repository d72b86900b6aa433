//! Upstream LLM client for archestra.
//!
//! This crate is the only place that speaks the OpenAI Chat Completions or
//! Anthropic Messages wire protocols. It is shared by the proxy pipeline
//! (forwarding a client's request to the real upstream) and the quarantine
//! sub-agent (issuing its own, separate privileged/quarantined calls).
//!
//! ## Modules
//!
//! - [`llm`] -- client, streaming parsers, and wire types.
//! - [`error`] -- client error types.

pub mod error;
pub mod llm;

pub use error::{LlmError, Result};
pub use llm::{
    ChatRequest, ContentBlock, LlmClient, LlmClientConfig, LlmResponse, Message, Provider,
    ResponseSchema, Role, StreamEvent, ToolCall, ToolDefinition, ToolResult, Usage,
};
