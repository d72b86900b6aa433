//! Pulls the two pieces of context the quarantine sub-agent needs out of an
//! inbound conversation: the user's original request, and the untrusted
//! tool result anchored to a specific tool call.
//!
//! OpenAI-shaped messages carry the tool result as a dedicated `role=tool`
//! message; Anthropic-shaped messages embed it as a `tool_result` content
//! block inside a `role=user` turn instead, so the two shapes need distinct
//! extraction rules. [`archestra_llm::Message::content_blocks`] is `Some`
//! only for messages that came from an Anthropic-shaped request; extraction
//! dispatches on the caller's [`Provider`] rather than guessing from that.

use archestra_llm::{ContentBlock, Message, Provider, Role};
use serde_json::Value;

use crate::error::{QuarantineError, Result};

/// The original user request.
///
/// OpenAI shape: the `content` of the last `role=user` message. Anthropic
/// shape: the text of the last `role=user` message that carries a text
/// block, ignoring user turns that consist solely of a `tool_result` block.
pub fn extract_original_request(provider: Provider, messages: &[Message]) -> Result<String> {
    match provider {
        Provider::Openai => messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.clone())
            .ok_or(QuarantineError::NoOriginalRequest),
        Provider::Anthropic => messages
            .iter()
            .rev()
            .filter(|m| m.role == Role::User)
            .find_map(|m| last_text_block(m))
            .ok_or(QuarantineError::NoOriginalRequest),
    }
}

fn last_text_block(message: &Message) -> Option<String> {
    let blocks = message.content_blocks.as_ref()?;
    blocks.iter().find_map(|b| match b {
        ContentBlock::Text { text } => Some(text.clone()),
        ContentBlock::ToolResult { .. } => None,
    })
}

/// The tool result content for the tool call identified by `anchor`.
///
/// OpenAI shape: the `role=tool` message whose `tool_call_id` equals
/// `anchor`. Anthropic shape: the `tool_result` content block, embedded in
/// any message, whose `tool_use_id` equals `anchor`.
///
/// Returned as a [`Value`]: JSON-parsed when the content is valid JSON,
/// otherwise wrapped as a JSON string so callers always have a `Value` to
/// feed into the quarantined agent's prompt substitution.
pub fn extract_tool_result(provider: Provider, messages: &[Message], anchor: &str) -> Result<Value> {
    let content = match provider {
        Provider::Openai => messages
            .iter()
            .rev()
            .find(|m| m.role == Role::Tool && m.tool_call_id.as_deref() == Some(anchor))
            .map(|m| m.content.clone())
            .ok_or_else(|| QuarantineError::AnchorNotFound {
                anchor: anchor.to_string(),
            })?,
        Provider::Anthropic => messages
            .iter()
            .rev()
            .find_map(|m| tool_result_block(m, anchor))
            .ok_or_else(|| QuarantineError::AnchorNotFound {
                anchor: anchor.to_string(),
            })?,
    };

    Ok(serde_json::from_str(&content).unwrap_or(Value::String(content)))
}

fn tool_result_block(message: &Message, anchor: &str) -> Option<String> {
    let blocks = message.content_blocks.as_ref()?;
    blocks.iter().find_map(|b| match b {
        ContentBlock::ToolResult { tool_use_id, content } if tool_use_id == anchor => {
            Some(content.clone())
        }
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_last_user_message_openai_shape() {
        let messages = vec![
            Message::user("first"),
            Message::assistant("reply"),
            Message::user("second"),
        ];
        assert_eq!(
            extract_original_request(Provider::Openai, &messages).unwrap(),
            "second"
        );
    }

    #[test]
    fn missing_user_message_is_error() {
        let messages = vec![Message::assistant("no user here")];
        assert!(extract_original_request(Provider::Openai, &messages).is_err());
    }

    #[test]
    fn extracts_tool_result_by_anchor_openai_shape() {
        let messages = vec![
            Message::user("find my emails"),
            Message::assistant_tool_calls(vec![]),
            Message::tool_result("call_1", r#"{"emails":["a@b.com"]}"#),
        ];
        let result = extract_tool_result(Provider::Openai, &messages, "call_1").unwrap();
        assert_eq!(result["emails"][0], "a@b.com");
    }

    #[test]
    fn non_json_tool_result_is_wrapped_as_string() {
        let messages = vec![Message::tool_result("call_1", "plain text result")];
        let result = extract_tool_result(Provider::Openai, &messages, "call_1").unwrap();
        assert_eq!(result, Value::String("plain text result".to_string()));
    }

    #[test]
    fn missing_anchor_is_error() {
        let messages = vec![Message::tool_result("call_1", "x")];
        assert!(extract_tool_result(Provider::Openai, &messages, "call_2").is_err());
    }

    #[test]
    fn extracts_last_text_block_anthropic_shape() {
        let messages = vec![
            Message::with_content_blocks(
                Role::User,
                vec![ContentBlock::Text {
                    text: "check my inbox".into(),
                }],
            ),
            Message::with_content_blocks(
                Role::User,
                vec![ContentBlock::ToolResult {
                    tool_use_id: "call_1".into(),
                    content: r#"{"emails":[]}"#.into(),
                }],
            ),
        ];
        assert_eq!(
            extract_original_request(Provider::Anthropic, &messages).unwrap(),
            "check my inbox"
        );
    }

    #[test]
    fn extracts_tool_result_block_anthropic_shape() {
        let messages = vec![
            Message::with_content_blocks(
                Role::User,
                vec![ContentBlock::Text {
                    text: "check my inbox".into(),
                }],
            ),
            Message::with_content_blocks(
                Role::User,
                vec![ContentBlock::ToolResult {
                    tool_use_id: "call_1".into(),
                    content: r#"{"emails":["a@b.com"]}"#.into(),
                }],
            ),
        ];
        let result = extract_tool_result(Provider::Anthropic, &messages, "call_1").unwrap();
        assert_eq!(result["emails"][0], "a@b.com");
    }

    #[test]
    fn anthropic_original_request_skips_tool_result_only_turn() {
        let messages = vec![
            Message::with_content_blocks(
                Role::User,
                vec![ContentBlock::Text {
                    text: "original question".into(),
                }],
            ),
            Message::with_content_blocks(Role::Assistant, vec![]),
            Message::with_content_blocks(
                Role::User,
                vec![ContentBlock::ToolResult {
                    tool_use_id: "call_1".into(),
                    content: "{}".into(),
                }],
            ),
        ];
        assert_eq!(
            extract_original_request(Provider::Anthropic, &messages).unwrap(),
            "original question"
        );
    }
}
