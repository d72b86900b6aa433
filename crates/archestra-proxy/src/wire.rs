//! Translates between the literal OpenAI/Anthropic wire JSON the client and
//! upstream provider exchange, and the normalized [`archestra_llm::Message`]
//! this proxy evaluates policy against internally.

use archestra_llm::{ContentBlock, LlmResponse, Message, Role, ToolCall};
use serde_json::{Value, json};

use crate::error::ApiError;

/// Parse an OpenAI chat-completions `messages` array into the internal
/// representation.
pub fn parse_openai_messages(raw: &Value) -> Result<Vec<Message>, ApiError> {
    let items = raw
        .as_array()
        .ok_or_else(|| ApiError::InvalidRequest("messages must be an array".into()))?;

    items.iter().map(parse_openai_message).collect()
}

/// Parse an Anthropic Messages API `messages` array into the internal
/// representation, preserving each message's content blocks so the
/// dual-LLM sanitizer can apply Anthropic-shape extraction rules to it.
pub fn parse_anthropic_messages(raw: &Value) -> Result<Vec<Message>, ApiError> {
    let items = raw
        .as_array()
        .ok_or_else(|| ApiError::InvalidRequest("messages must be an array".into()))?;

    items.iter().map(parse_anthropic_message).collect()
}

fn parse_anthropic_message(raw: &Value) -> Result<Message, ApiError> {
    let role = raw["role"]
        .as_str()
        .ok_or_else(|| ApiError::InvalidRequest("message missing role".into()))?;
    let role = match role {
        "user" => Role::User,
        "assistant" => Role::Assistant,
        other => return Err(ApiError::InvalidRequest(format!("unknown message role: {other}"))),
    };

    let blocks = match &raw["content"] {
        Value::String(s) => vec![ContentBlock::Text { text: s.clone() }],
        Value::Array(items) => items.iter().filter_map(parse_anthropic_content_block).collect(),
        Value::Null => Vec::new(),
        other => vec![ContentBlock::Text { text: other.to_string() }],
    };

    let tool_calls = raw["content"]
        .as_array()
        .map(|items| items.iter().filter_map(parse_anthropic_tool_use).collect())
        .unwrap_or_default();

    let mut message = Message::with_content_blocks(role, blocks);
    message.tool_calls = tool_calls;
    Ok(message)
}

fn parse_anthropic_content_block(raw: &Value) -> Option<ContentBlock> {
    match raw["type"].as_str()? {
        "text" => Some(ContentBlock::Text {
            text: raw["text"].as_str()?.to_string(),
        }),
        "tool_result" => {
            let tool_use_id = raw["tool_use_id"].as_str()?.to_string();
            let content = match &raw["content"] {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            Some(ContentBlock::ToolResult { tool_use_id, content })
        }
        _ => None,
    }
}

fn parse_anthropic_tool_use(raw: &Value) -> Option<ToolCall> {
    if raw["type"].as_str()? != "tool_use" {
        return None;
    }
    Some(ToolCall {
        id: raw["id"].as_str()?.to_string(),
        name: raw["name"].as_str()?.to_string(),
        arguments: raw["input"].clone(),
    })
}

fn parse_openai_message(raw: &Value) -> Result<Message, ApiError> {
    let role = raw["role"]
        .as_str()
        .ok_or_else(|| ApiError::InvalidRequest("message missing role".into()))?;

    let content = match &raw["content"] {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    };

    match role {
        "system" => Ok(Message::system(content)),
        "user" => Ok(Message::user(content)),
        "tool" => {
            let tool_call_id = raw["tool_call_id"]
                .as_str()
                .ok_or_else(|| ApiError::InvalidRequest("tool message missing tool_call_id".into()))?;
            Ok(Message::tool_result(tool_call_id, content))
        }
        "assistant" => {
            let tool_calls: Vec<ToolCall> = raw["tool_calls"]
                .as_array()
                .map(|arr| arr.iter().filter_map(parse_openai_tool_call).collect())
                .unwrap_or_default();
            if tool_calls.is_empty() {
                Ok(Message::assistant(content))
            } else {
                let mut msg = Message::assistant_tool_calls(tool_calls);
                msg.content = content;
                Ok(msg)
            }
        }
        other => Err(ApiError::InvalidRequest(format!("unknown message role: {other}"))),
    }
}

fn parse_openai_tool_call(raw: &Value) -> Option<ToolCall> {
    let id = raw["id"].as_str()?.to_string();
    let name = raw["function"]["name"].as_str()?.to_string();
    let arguments_raw = raw["function"]["arguments"].as_str().unwrap_or("{}");
    let arguments = serde_json::from_str(arguments_raw).unwrap_or(Value::Null);
    Some(ToolCall {
        id,
        name,
        arguments,
    })
}

/// Render a normalized response back into the OpenAI chat-completions
/// response shape.
pub fn render_openai_response(model: &str, response: &LlmResponse) -> Value {
    let message = match response {
        LlmResponse::Text(text) => json!({
            "role": "assistant",
            "content": text,
        }),
        LlmResponse::ToolCalls(calls) => json!({
            "role": "assistant",
            "content": null,
            "tool_calls": calls.iter().map(render_openai_tool_call).collect::<Vec<_>>(),
        }),
    };

    json!({
        "id": format!("chatcmpl-{}", uuid::Uuid::new_v4()),
        "object": "chat.completion",
        "model": model,
        "choices": [{
            "index": 0,
            "message": message,
            "finish_reason": match response {
                LlmResponse::Text(_) => "stop",
                LlmResponse::ToolCalls(_) => "tool_calls",
            },
        }],
    })
}

fn render_openai_tool_call(call: &ToolCall) -> Value {
    json!({
        "id": call.id,
        "type": "function",
        "function": {
            "name": call.name,
            "arguments": serde_json::to_string(&call.arguments).unwrap_or_default(),
        },
    })
}

/// Render a normalized response as a single OpenAI chat-completion-chunk SSE
/// payload. The proxy buffers the whole upstream response before gating tool
/// calls, so it emits one chunk carrying the full delta rather than
/// incremental token deltas.
pub fn render_openai_stream_chunk(model: &str, response: &LlmResponse) -> Value {
    let delta = match response {
        LlmResponse::Text(text) => json!({"role": "assistant", "content": text}),
        LlmResponse::ToolCalls(calls) => json!({
            "role": "assistant",
            "tool_calls": calls
                .iter()
                .enumerate()
                .map(|(index, call)| json!({
                    "index": index,
                    "id": call.id,
                    "type": "function",
                    "function": {
                        "name": call.name,
                        "arguments": serde_json::to_string(&call.arguments).unwrap_or_default(),
                    },
                }))
                .collect::<Vec<_>>(),
        }),
    };

    json!({
        "id": format!("chatcmpl-{}", uuid::Uuid::new_v4()),
        "object": "chat.completion.chunk",
        "model": model,
        "choices": [{
            "index": 0,
            "delta": delta,
            "finish_reason": match response {
                LlmResponse::Text(_) => "stop",
                LlmResponse::ToolCalls(_) => "tool_calls",
            },
        }],
    })
}

/// Render a tool-invocation-blocked error as the terminating SSE error event
/// the streaming egress gate emits instead of an HTTP 403 (the response has
/// already started by the time the gate runs).
pub fn render_stream_block_event(reason: &str) -> Value {
    json!({
        "error": {
            "message": reason,
            "type": "tool_invocation_blocked",
        },
    })
}

/// Format a JSON value as a `data: <json>\n\n` SSE event.
pub fn sse_event(value: &Value) -> String {
    format!("data: {value}\n\n")
}

/// Find the tool name an assistant turn associated with `tool_call_id`, by
/// walking backwards through messages preceding the tool result.
pub fn resolve_tool_name(messages: &[Message], before: usize, tool_call_id: &str) -> Option<String> {
    messages[..before]
        .iter()
        .rev()
        .filter(|m| m.role == Role::Assistant)
        .flat_map(|m| m.tool_calls.iter())
        .find(|tc| tc.id == tool_call_id)
        .map(|tc| tc.name.clone())
}
