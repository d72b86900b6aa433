//! Multi-provider LLM client.
//!
//! Supports the **OpenAI Chat Completions API** and the **Anthropic
//! Messages API**, each with streaming SSE and non-streaming modes. Which
//! wire shape a request takes is selected per-call via [`ChatRequest`]'s
//! target [`Provider`], so a single client instance can serve requests
//! forwarded to either upstream.

use std::sync::Arc;

use futures::StreamExt;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde_json::{Value, json};

use crate::error::{LlmError, Result};
use crate::llm::streaming::SseParser;
use crate::llm::streaming_openai::OpenAiStreamAccumulator;
use crate::llm::types::{
    ChatRequest, LlmResponse, Message, Provider, Role, StreamDelta, StreamEvent, ToolCall,
    ToolDefinition, Usage,
};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

const ANTHROPIC_VERSION: &str = "2023-06-01";

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Configuration for connecting to a single upstream provider endpoint.
#[derive(Debug, Clone)]
pub struct LlmClientConfig {
    /// Which wire protocol this configuration targets.
    pub provider: Provider,
    /// API key for authentication.
    pub api_key: String,
    /// Base URL for the API (e.g. `https://api.openai.com`).
    pub base_url: String,
    /// Default model identifier, used when a request omits one.
    pub default_model: String,
    /// Default maximum tokens per response.
    pub max_tokens: u32,
}

impl LlmClientConfig {
    /// Configuration for an OpenAI-compatible endpoint.
    pub fn openai(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        default_model: impl Into<String>,
    ) -> Self {
        Self {
            provider: Provider::Openai,
            api_key: api_key.into(),
            base_url: base_url.into(),
            default_model: default_model.into(),
            max_tokens: 4096,
        }
    }

    /// Configuration for the Anthropic Messages API.
    pub fn anthropic(api_key: impl Into<String>, default_model: impl Into<String>) -> Self {
        Self {
            provider: Provider::Anthropic,
            api_key: api_key.into(),
            base_url: "https://api.anthropic.com".into(),
            default_model: default_model.into(),
            max_tokens: 4096,
        }
    }
}

/// An LLM client that communicates with an OpenAI-compatible or Anthropic
/// upstream, selected per request.
#[derive(Debug, Clone)]
pub struct LlmClient {
    config: Arc<LlmClientConfig>,
    http: reqwest::Client,
}

impl LlmClient {
    /// Create a new client with the given configuration.
    pub fn new(config: LlmClientConfig) -> Result<Self> {
        if config.api_key.is_empty() {
            return Err(LlmError::MissingApiKey {
                provider: format!("{:?}", config.provider).to_lowercase(),
            });
        }

        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .map_err(|e| LlmError::RequestFailed {
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            config: Arc::new(config),
            http,
        })
    }

    /// The provider this client is configured to speak.
    pub fn provider(&self) -> Provider {
        self.config.provider
    }

    // -----------------------------------------------------------------------
    // Public API
    // -----------------------------------------------------------------------

    /// Send a chat request and return the full response (non-streaming).
    pub async fn chat_completion(&self, request: &ChatRequest) -> Result<LlmResponse> {
        let body = self.build_request_body(request, false);
        let resp = self.send_request(&body).await?;
        let (status, text) = Self::read_body(resp).await?;

        if !status.is_success() {
            return Err(self.provider_error(status, text));
        }

        let v: Value = serde_json::from_str(&text).map_err(|e| LlmError::ParseFailed {
            reason: format!("invalid JSON response: {e}"),
        })?;

        match self.config.provider {
            Provider::Anthropic => Self::parse_anthropic_response(&v),
            Provider::Openai => Self::parse_openai_response(&v),
        }
    }

    /// Send a chat request using streaming SSE and return the aggregated
    /// response, without incremental callbacks.
    pub async fn chat_completion_stream(&self, request: &ChatRequest) -> Result<LlmResponse> {
        self.chat_completion_stream_with_callback(request, |_| {})
            .await
    }

    /// Send a chat request using streaming SSE, invoking a callback for each
    /// text delta so callers can forward incremental output downstream.
    pub async fn chat_completion_stream_with_callback<F>(
        &self,
        request: &ChatRequest,
        mut on_text: F,
    ) -> Result<LlmResponse>
    where
        F: FnMut(&str) + Send,
    {
        let body = self.build_request_body(request, true);
        let resp = self.send_request(&body).await?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(self.provider_error(status, text));
        }

        match self.config.provider {
            Provider::Anthropic => self.consume_anthropic_stream(resp, &mut on_text).await,
            Provider::Openai => self.consume_openai_stream(resp, &mut on_text).await,
        }
    }

    /// List model ids available from the upstream provider.
    pub async fn list_models(&self) -> Result<Vec<String>> {
        let url = match self.config.provider {
            Provider::Openai => format!("{}/v1/models", self.config.base_url),
            Provider::Anthropic => format!("{}/v1/models", self.config.base_url),
        };

        let resp = self
            .http
            .get(&url)
            .headers(self.auth_headers())
            .send()
            .await?;
        let (status, text) = Self::read_body(resp).await?;
        if !status.is_success() {
            return Err(self.provider_error(status, text));
        }

        let v: Value = serde_json::from_str(&text).map_err(|e| LlmError::ParseFailed {
            reason: format!("invalid JSON in model list response: {e}"),
        })?;

        let ids = v["data"]
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|m| m["id"].as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default();
        Ok(ids)
    }

    fn provider_error(&self, status: reqwest::StatusCode, body: String) -> LlmError {
        LlmError::ProviderError {
            provider: format!("{:?}", self.config.provider).to_lowercase(),
            status: status.as_u16(),
            body,
        }
    }

    async fn read_body(resp: reqwest::Response) -> Result<(reqwest::StatusCode, String)> {
        let status = resp.status();
        let text = resp.text().await.map_err(|e| LlmError::RequestFailed {
            reason: format!("failed to read response body: {e}"),
        })?;
        Ok((status, text))
    }

    // -----------------------------------------------------------------------
    // Internal: request building
    // -----------------------------------------------------------------------

    fn build_request_body(&self, request: &ChatRequest, stream: bool) -> Value {
        match self.config.provider {
            Provider::Anthropic => self.build_anthropic_body(request, stream),
            Provider::Openai => self.build_openai_body(request, stream),
        }
    }

    fn model_or_default<'a>(&'a self, request: &'a ChatRequest) -> &'a str {
        if request.model.is_empty() {
            &self.config.default_model
        } else {
            &request.model
        }
    }

    fn build_anthropic_body(&self, request: &ChatRequest, stream: bool) -> Value {
        let (system_text, messages) = Self::split_system_message_anthropic(&request.messages);

        let mut body = json!({
            "model": self.model_or_default(request),
            "max_tokens": request.max_tokens.unwrap_or(self.config.max_tokens),
            "messages": messages,
        });

        if let Some(system) = system_text {
            body["system"] = json!(system);
        }
        if let Some(temp) = request.temperature {
            body["temperature"] = json!(temp);
        }
        if !request.tools.is_empty() {
            body["tools"] = Self::build_tools_payload(&request.tools);
        }
        if let Some(schema) = &request.response_schema {
            // Anthropic has no native JSON-schema response mode; emulate it
            // with a forced single-tool call that mirrors the schema.
            body["tools"] = json!([{
                "name": schema.name,
                "description": "Return the answer in the required shape.",
                "input_schema": schema.schema,
            }]);
            body["tool_choice"] = json!({"type": "tool", "name": schema.name});
        }
        if stream {
            body["stream"] = json!(true);
        }

        body
    }

    fn build_openai_body(&self, request: &ChatRequest, stream: bool) -> Value {
        let messages = Self::build_openai_messages(&request.messages);

        let mut body = json!({
            "model": self.model_or_default(request),
            "messages": messages,
        });

        if let Some(temp) = request.temperature {
            body["temperature"] = json!(temp);
        }
        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }
        if !request.tools.is_empty() {
            body["tools"] = json!(
                request
                    .tools
                    .iter()
                    .map(|t| json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.input_schema,
                        }
                    }))
                    .collect::<Vec<_>>()
            );
        }
        if let Some(schema) = &request.response_schema {
            body["response_format"] = json!({
                "type": "json_schema",
                "json_schema": {
                    "name": schema.name,
                    "schema": schema.schema,
                    "strict": true,
                }
            });
        }
        if stream {
            body["stream"] = json!(true);
        }

        body
    }

    fn build_tools_payload(tools: &[ToolDefinition]) -> Value {
        json!(
            tools
                .iter()
                .map(|t| json!({
                    "name": t.name,
                    "description": t.description,
                    "input_schema": t.input_schema,
                }))
                .collect::<Vec<_>>()
        )
    }

    /// Split the system message out (Anthropic expects it as a top-level
    /// field, not in the `messages` array) and convert the remaining
    /// messages to the Anthropic wire format.
    fn split_system_message_anthropic(messages: &[Message]) -> (Option<String>, Vec<Value>) {
        let mut system: Option<String> = None;
        let mut wire_messages: Vec<Value> = Vec::with_capacity(messages.len());

        for msg in messages {
            match msg.role {
                Role::System => match &mut system {
                    Some(existing) => {
                        existing.push('\n');
                        existing.push_str(&msg.content);
                    }
                    None => system = Some(msg.content.clone()),
                },
                Role::User => {
                    wire_messages.push(json!({"role": "user", "content": msg.content}));
                }
                Role::Assistant => {
                    if msg.tool_calls.is_empty() {
                        wire_messages
                            .push(json!({"role": "assistant", "content": msg.content}));
                    } else {
                        let mut content: Vec<Value> = Vec::new();
                        if !msg.content.is_empty() {
                            content.push(json!({"type": "text", "text": msg.content}));
                        }
                        for tc in &msg.tool_calls {
                            content.push(json!({
                                "type": "tool_use",
                                "id": tc.id,
                                "name": tc.name,
                                "input": tc.arguments,
                            }));
                        }
                        wire_messages.push(json!({"role": "assistant", "content": content}));
                    }
                }
                Role::Tool => {
                    wire_messages.push(json!({
                        "role": "user",
                        "content": [{
                            "type": "tool_result",
                            "tool_use_id": msg.tool_call_id,
                            "content": msg.content,
                        }],
                    }));
                }
            }
        }

        (system, wire_messages)
    }

    /// Convert messages to the OpenAI chat-completions wire format, which
    /// keeps `system`/`user`/`assistant`/`tool` as distinct message roles
    /// rather than folding `system` and `tool` into `user`.
    fn build_openai_messages(messages: &[Message]) -> Vec<Value> {
        messages
            .iter()
            .map(|msg| match msg.role {
                Role::System => json!({"role": "system", "content": msg.content}),
                Role::User => json!({"role": "user", "content": msg.content}),
                Role::Assistant => {
                    if msg.tool_calls.is_empty() {
                        json!({"role": "assistant", "content": msg.content})
                    } else {
                        json!({
                            "role": "assistant",
                            "content": if msg.content.is_empty() { Value::Null } else { json!(msg.content) },
                            "tool_calls": msg.tool_calls.iter().map(|tc| json!({
                                "id": tc.id,
                                "type": "function",
                                "function": {
                                    "name": tc.name,
                                    "arguments": tc.arguments.to_string(),
                                }
                            })).collect::<Vec<_>>(),
                        })
                    }
                }
                Role::Tool => json!({
                    "role": "tool",
                    "tool_call_id": msg.tool_call_id,
                    "content": msg.content,
                }),
            })
            .collect()
    }

    fn auth_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        match self.config.provider {
            Provider::Anthropic => {
                if let Ok(v) = HeaderValue::from_str(&self.config.api_key) {
                    headers.insert("x-api-key", v);
                }
                headers.insert(
                    "anthropic-version",
                    HeaderValue::from_static(ANTHROPIC_VERSION),
                );
            }
            Provider::Openai => {
                if let Ok(v) = HeaderValue::from_str(&format!("Bearer {}", self.config.api_key)) {
                    headers.insert(AUTHORIZATION, v);
                }
            }
        }
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers
    }

    async fn send_request(&self, body: &Value) -> Result<reqwest::Response> {
        let url = match self.config.provider {
            Provider::Anthropic => format!("{}/v1/messages", self.config.base_url),
            Provider::Openai => format!("{}/v1/chat/completions", self.config.base_url),
        };

        tracing::debug!(url = %url, model = %body["model"], "sending llm request");

        self.http
            .post(&url)
            .headers(self.auth_headers())
            .json(body)
            .send()
            .await
            .map_err(|e| LlmError::RequestFailed {
                reason: e.to_string(),
            })
    }

    // -----------------------------------------------------------------------
    // Internal: non-streaming response parsing
    // -----------------------------------------------------------------------

    fn parse_anthropic_response(v: &Value) -> Result<LlmResponse> {
        let content = v["content"].as_array().ok_or_else(|| LlmError::ParseFailed {
            reason: "missing `content` array in response".into(),
        })?;

        let mut text_parts: Vec<String> = Vec::new();
        let mut tool_calls: Vec<ToolCall> = Vec::new();

        for block in content {
            match block["type"].as_str() {
                Some("text") => {
                    if let Some(t) = block["text"].as_str() {
                        text_parts.push(t.to_owned());
                    }
                }
                Some("tool_use") => tool_calls.push(ToolCall {
                    id: block["id"].as_str().unwrap_or_default().to_owned(),
                    name: block["name"].as_str().unwrap_or_default().to_owned(),
                    arguments: block["input"].clone(),
                }),
                _ => {}
            }
        }

        if tool_calls.is_empty() {
            Ok(LlmResponse::Text(text_parts.join("")))
        } else {
            Ok(LlmResponse::ToolCalls(tool_calls))
        }
    }

    fn parse_openai_response(v: &Value) -> Result<LlmResponse> {
        let message = &v["choices"][0]["message"];
        if message.is_null() {
            return Err(LlmError::ParseFailed {
                reason: "missing `choices[0].message` in response".into(),
            });
        }

        if let Some(calls) = message["tool_calls"].as_array() {
            if !calls.is_empty() {
                let tool_calls: Result<Vec<ToolCall>> = calls
                    .iter()
                    .map(|tc| {
                        let args_str = tc["function"]["arguments"].as_str().unwrap_or("{}");
                        let arguments: Value =
                            serde_json::from_str(args_str).map_err(|e| LlmError::ParseFailed {
                                reason: format!("invalid tool call arguments json: {e}"),
                            })?;
                        Ok(ToolCall {
                            id: tc["id"].as_str().unwrap_or_default().to_owned(),
                            name: tc["function"]["name"].as_str().unwrap_or_default().to_owned(),
                            arguments,
                        })
                    })
                    .collect();
                return Ok(LlmResponse::ToolCalls(tool_calls?));
            }
        }

        Ok(LlmResponse::Text(
            message["content"].as_str().unwrap_or_default().to_owned(),
        ))
    }

    // -----------------------------------------------------------------------
    // Internal: streaming consumption
    // -----------------------------------------------------------------------

    async fn consume_anthropic_stream<F>(
        &self,
        resp: reqwest::Response,
        on_text: &mut F,
    ) -> Result<LlmResponse>
    where
        F: FnMut(&str),
    {
        let mut parser = SseParser::new();
        let mut accumulator = AnthropicStreamAccumulator::new();
        let mut byte_stream = resp.bytes_stream();
        let mut line_buffer = String::new();

        while let Some(chunk_result) = byte_stream.next().await {
            let chunk = chunk_result.map_err(|e| LlmError::StreamError {
                reason: format!("stream read error: {e}"),
            })?;
            let text = std::str::from_utf8(&chunk).map_err(|e| LlmError::StreamError {
                reason: format!("invalid utf-8 in stream: {e}"),
            })?;
            line_buffer.push_str(text);

            while let Some(newline_pos) = line_buffer.find('\n') {
                let line = line_buffer[..newline_pos].to_owned();
                line_buffer = line_buffer[newline_pos + 1..].to_owned();

                if let Some(event) = parser.parse_line(&line)? {
                    accumulator.apply(&event, on_text);
                    if matches!(event, StreamEvent::MessageStop) {
                        return accumulator.into_response();
                    }
                }
            }
        }

        accumulator.into_response()
    }

    async fn consume_openai_stream<F>(
        &self,
        resp: reqwest::Response,
        on_text: &mut F,
    ) -> Result<LlmResponse>
    where
        F: FnMut(&str),
    {
        let mut accumulator = OpenAiStreamAccumulator::new();
        let mut byte_stream = resp.bytes_stream();
        let mut line_buffer = String::new();

        while let Some(chunk_result) = byte_stream.next().await {
            let chunk = chunk_result.map_err(|e| LlmError::StreamError {
                reason: format!("stream read error: {e}"),
            })?;
            let text = std::str::from_utf8(&chunk).map_err(|e| LlmError::StreamError {
                reason: format!("invalid utf-8 in stream: {e}"),
            })?;
            line_buffer.push_str(text);

            while let Some(newline_pos) = line_buffer.find('\n') {
                let line = line_buffer[..newline_pos].to_owned();
                line_buffer = line_buffer[newline_pos + 1..].to_owned();

                if let Some(delta) = accumulator.feed_line(&line)? {
                    on_text(&delta);
                }
                if accumulator.is_done() {
                    return accumulator.into_response().map(|(resp, _usage)| resp);
                }
            }
        }

        accumulator.into_response().map(|(resp, _usage)| resp)
    }
}

// ---------------------------------------------------------------------------
// Anthropic stream accumulator
// ---------------------------------------------------------------------------

/// Accumulates fragments from Anthropic streaming events into a complete
/// response.
#[derive(Debug, Default)]
struct AnthropicStreamAccumulator {
    text: String,
    tool_calls: Vec<ToolCallBuilder>,
    stop_reason: Option<String>,
    #[allow(dead_code)]
    usage: Usage,
}

#[derive(Debug)]
struct ToolCallBuilder {
    id: String,
    name: String,
    input_json: String,
}

impl AnthropicStreamAccumulator {
    fn new() -> Self {
        Self::default()
    }

    fn apply<F>(&mut self, event: &StreamEvent, on_text: &mut F)
    where
        F: FnMut(&str),
    {
        match event {
            StreamEvent::ContentBlockStart {
                content_type,
                id,
                name,
                ..
            } => {
                if content_type == "tool_use" {
                    self.tool_calls.push(ToolCallBuilder {
                        id: id.clone().unwrap_or_default(),
                        name: name.clone().unwrap_or_default(),
                        input_json: String::new(),
                    });
                }
            }
            StreamEvent::ContentBlockDelta { delta, .. } => match delta {
                StreamDelta::TextDelta(t) => {
                    self.text.push_str(t);
                    on_text(t);
                }
                StreamDelta::InputJsonDelta(j) => {
                    if let Some(builder) = self.tool_calls.last_mut() {
                        builder.input_json.push_str(j);
                    }
                }
            },
            StreamEvent::MessageDelta { stop_reason } => {
                self.stop_reason = stop_reason.clone();
            }
            _ => {}
        }
    }

    fn into_response(self) -> Result<LlmResponse> {
        if self.tool_calls.is_empty() {
            return Ok(LlmResponse::Text(self.text));
        }

        let calls: Result<Vec<ToolCall>> = self
            .tool_calls
            .into_iter()
            .map(|b| {
                let arguments: Value = if b.input_json.is_empty() {
                    Value::Object(Default::default())
                } else {
                    serde_json::from_str(&b.input_json).map_err(|e| LlmError::ParseFailed {
                        reason: format!("invalid json in tool call `{}` input: {e}", b.name),
                    })?
                };
                Ok(ToolCall {
                    id: b.id,
                    name: b.name,
                    arguments,
                })
            })
            .collect();

        Ok(LlmResponse::ToolCalls(calls?))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
