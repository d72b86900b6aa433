//! LLM integration layer.
//!
//! This module provides the interface between callers and upstream large
//! language model providers.  It is organized into:
//!
//! - [`types`] -- Core data types (messages, tool calls, streaming events).
//! - [`client`] -- HTTP client for the OpenAI and Anthropic APIs.
//! - [`streaming`] -- SSE stream parser for Anthropic incremental responses.
//! - [`streaming_openai`] -- SSE stream parser for OpenAI incremental responses.

pub mod client;
pub mod streaming;
pub mod streaming_openai;
pub mod types;

pub use client::{LlmClient, LlmClientConfig};
pub use types::{
    ChatRequest, ContentBlock, LlmResponse, Message, Provider, ResponseSchema, Role, StreamEvent,
    ToolCall, ToolDefinition, ToolResult, Usage,
};
