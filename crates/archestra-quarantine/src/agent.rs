//! The dual-LLM quarantine sub-agent.
//!
//! A privileged LLM drives a question/answer loop against untrusted tool
//! output without ever seeing that output directly. A second, quarantined
//! LLM is the only model shown the raw data; it may only answer multiple
//! choice questions posed by the privileged model, never emit free text.
//! After the loop ends, the privileged model summarizes the exchange for
//! the caller — the only thing that ever reaches the outer conversation.

use archestra_llm::{ChatRequest, LlmClient, Message, Provider, ResponseSchema};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, instrument, warn};

use crate::error::Result;
use crate::extraction::{extract_original_request, extract_tool_result};

/// One completed question/answer exchange between the two models.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QaTurn {
    pub question: String,
    pub options: Vec<String>,
    /// Zero-based index into `options` the quarantined model selected.
    pub answer_index: usize,
}

/// Final output of a quarantine run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuarantineOutcome {
    pub conversations: Vec<QaTurn>,
    pub result: String,
}

/// Configuration for a single quarantine run: prompt templates and the
/// round budget.
#[derive(Debug, Clone)]
pub struct QuarantineConfig {
    pub main_agent_prompt: String,
    pub quarantined_agent_prompt: String,
    pub summary_prompt: String,
    pub max_rounds: u32,
}

/// Runs the quarantine loop for one untrusted tool result.
pub struct QuarantineAgent<'a> {
    privileged: &'a LlmClient,
    quarantined: &'a LlmClient,
    config: &'a QuarantineConfig,
    /// Which wire shape `messages` in [`QuarantineAgent::run`] is in —
    /// governs which extraction rule finds the original request and the
    /// anchored tool result, independent of which client actually executes
    /// the Q&A loop.
    provider: Provider,
}

#[derive(Debug, Deserialize)]
struct PrivilegedTurn {
    question: String,
    options: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct QuarantinedAnswer {
    answer: Value,
}

const DONE_MARKER: &str = "DONE";

impl<'a> QuarantineAgent<'a> {
    /// `privileged` answers with `DONE` or a `QUESTION:`/`OPTIONS:` block and
    /// never sees `tool_result`. `quarantined` sees `tool_result` and answers
    /// only with an option index. `provider` is the shape `messages` will be
    /// in when passed to [`QuarantineAgent::run`] (OpenAI `role=tool`
    /// messages vs. Anthropic `tool_result` content blocks).
    pub fn new(
        privileged: &'a LlmClient,
        quarantined: &'a LlmClient,
        config: &'a QuarantineConfig,
        provider: Provider,
    ) -> Self {
        Self {
            privileged,
            quarantined,
            config,
            provider,
        }
    }

    /// Run the full quarantine loop against `messages`, the inbound
    /// conversation, anchored at `anchor` (the tool_call_id / tool_use_id of
    /// the untrusted result).
    #[instrument(skip(self, messages))]
    pub async fn run(&self, messages: &[Message], anchor: &str) -> Result<QuarantineOutcome> {
        let original_request = extract_original_request(self.provider, messages)?;
        let tool_result = extract_tool_result(self.provider, messages, anchor)?;

        let mut qa_turns: Vec<QaTurn> = Vec::new();

        for round in 0..self.config.max_rounds {
            let prompt = self
                .config
                .main_agent_prompt
                .replace("{{originalUserRequest}}", &original_request);

            let mut privileged_messages = vec![Message::system(prompt)];
            for turn in &qa_turns {
                privileged_messages.push(Message::assistant(format!(
                    "QUESTION: {}\nOPTIONS: {}",
                    turn.question,
                    turn.options.join(", ")
                )));
                privileged_messages.push(Message::user(format!(
                    "Answer: {} ({})",
                    turn.answer_index, turn.options[turn.answer_index]
                )));
            }
            if qa_turns.is_empty() {
                privileged_messages.push(Message::user("Begin."));
            }

            let mut request = ChatRequest::new(self.privileged_model(), privileged_messages);
            request.temperature = Some(0.0);

            let response = self.privileged.chat_completion(&request).await?;

            let text = match response {
                archestra_llm::LlmResponse::Text(text) => text,
                archestra_llm::LlmResponse::ToolCalls(_) => {
                    warn!(round, "privileged turn returned tool calls, terminating loop");
                    break;
                }
            };

            if text.trim().contains(DONE_MARKER) {
                debug!(round, "privileged agent signaled DONE");
                break;
            }

            let Some(turn) = parse_privileged_turn(&text) else {
                warn!(round, "malformed privileged output, terminating loop early");
                break;
            };

            let answer_index = self.ask_quarantined(&turn, &tool_result).await?;

            qa_turns.push(QaTurn {
                question: turn.question,
                options: turn.options,
                answer_index,
            });
        }

        let result = self.summarize(&original_request, &qa_turns).await?;

        info!(rounds = qa_turns.len(), "quarantine run complete");
        Ok(QuarantineOutcome {
            conversations: qa_turns,
            result,
        })
    }

    async fn ask_quarantined(
        &self,
        turn: &PrivilegedTurn,
        tool_result: &Value,
    ) -> Result<usize> {
        let tool_result_data = serde_json::to_string(tool_result).unwrap_or_default();
        let options_text = turn
            .options
            .iter()
            .enumerate()
            .map(|(i, opt)| format!("{i}: {opt}"))
            .collect::<Vec<_>>()
            .join("\n");
        let max_index = turn.options.len().saturating_sub(1);

        let prompt = self
            .config
            .quarantined_agent_prompt
            .replace("{{toolResultData}}", &tool_result_data)
            .replace("{{question}}", &turn.question)
            .replace("{{options}}", &options_text)
            .replace("{{maxIndex}}", &max_index.to_string());

        let schema = ResponseSchema {
            name: "quarantine_answer".to_string(),
            schema: json!({
                "type": "object",
                "properties": { "answer": { "type": "integer" } },
                "required": ["answer"]
            }),
        };

        let mut request = ChatRequest::new(self.quarantined_model(), vec![Message::user(prompt)]);
        request.temperature = Some(0.0);
        request.response_schema = Some(schema);

        let response = self.quarantined.chat_completion(&request).await?;

        let archestra_llm::LlmResponse::Text(text) = response else {
            return Ok(max_index);
        };

        let parsed: std::result::Result<QuarantinedAnswer, _> = serde_json::from_str(&text);
        let index = parsed
            .ok()
            .and_then(|a| a.answer.as_u64())
            .map(|n| n as usize);

        Ok(match index {
            Some(i) if i <= max_index => i,
            _ => max_index,
        })
    }

    async fn summarize(&self, original_request: &str, qa_turns: &[QaTurn]) -> Result<String> {
        let qa_text = if qa_turns.is_empty() {
            "No questions were asked.".to_string()
        } else {
            qa_turns
                .iter()
                .map(|t| format!("Q: {}\nA: {}", t.question, t.options[t.answer_index]))
                .collect::<Vec<_>>()
                .join("\n\n")
        };

        let prompt = self
            .config
            .summary_prompt
            .replace("{{qaText}}", &qa_text)
            .replace("{{originalUserRequest}}", original_request);

        let response = self
            .privileged
            .chat_completion(&ChatRequest::new(
                self.privileged_model(),
                vec![Message::user(prompt)],
            ))
            .await?;

        Ok(match response {
            archestra_llm::LlmResponse::Text(text) => text,
            archestra_llm::LlmResponse::ToolCalls(_) => String::new(),
        })
    }

    fn privileged_model(&self) -> &str {
        match self.privileged.provider() {
            Provider::Openai => "gpt-4o",
            Provider::Anthropic => "claude-sonnet-4-20250514",
        }
    }

    fn quarantined_model(&self) -> &str {
        match self.quarantined.provider() {
            Provider::Openai => "gpt-4o-mini",
            Provider::Anthropic => "claude-haiku-4-20250514",
        }
    }
}

fn parse_privileged_turn(text: &str) -> Option<PrivilegedTurn> {
    let question_line = text.lines().find_map(|l| l.strip_prefix("QUESTION:"))?;
    let options_line = text.lines().find_map(|l| l.strip_prefix("OPTIONS:"))?;

    let options: Vec<String> = options_line
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    if options.is_empty() {
        return None;
    }

    Some(PrivilegedTurn {
        question: question_line.trim().to_string(),
        options,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_turn() {
        let text = "QUESTION: Who sent this?\nOPTIONS: alice@example.com, bob@attacker.net";
        let turn = parse_privileged_turn(text).unwrap();
        assert_eq!(turn.question, "Who sent this?");
        assert_eq!(turn.options, vec!["alice@example.com", "bob@attacker.net"]);
    }

    #[test]
    fn missing_options_line_fails_to_parse() {
        assert!(parse_privileged_turn("QUESTION: who?").is_none());
    }

    #[test]
    fn empty_options_list_fails_to_parse() {
        assert!(parse_privileged_turn("QUESTION: who?\nOPTIONS:").is_none());
    }
}
