//! The per-request guarded chat-completion pipeline: ingress taint scanning,
//! forwarding to the upstream provider, and egress tool-invocation gating.

use archestra_guard::{InvocationEvaluator, TrustedDataEvaluator};
use archestra_llm::{ChatRequest, LlmResponse, Message, Provider, Role};
use archestra_quarantine::{QuarantineAgent, QuarantineConfig};
use serde_json::Value;
use tracing::{info, warn};

use crate::error::ApiError;
use crate::state::AppState;
use crate::wire;

/// Outcome of running the pipeline for a single non-streaming request.
pub struct PipelineOutcome {
    pub response_json: Value,
}

/// Run the full ingress → forward → egress pipeline for one non-streaming
/// chat-completion request.
pub async fn run(
    state: &AppState,
    provider: Provider,
    agent_id: &str,
    chat_id: &str,
    model: &str,
    mut messages: Vec<Message>,
) -> Result<PipelineOutcome, ApiError> {
    ingress_scan(state, agent_id, chat_id, &mut messages).await?;
    persist_last_user_message(state, chat_id, &messages).await?;

    let client = state
        .llm_client(provider)
        .ok_or_else(|| ApiError::Configuration(format!("no client configured for provider {provider:?}")))?;

    let request = ChatRequest::new(model, messages);
    let response = client.chat_completion(&request).await?;

    egress_gate(state, agent_id, chat_id, &response).await?;

    Ok(PipelineOutcome {
        response_json: wire::render_openai_response(model, &response),
    })
}

/// Run the full ingress → forward → egress pipeline for one streaming
/// chat-completion request, returning the complete SSE response body.
///
/// The proxy buffers the whole upstream response before running the
/// tool-invocation gate (the simplest correct strategy the specification
/// endorses for streaming egress), so the returned body always carries a
/// single chunk followed by `[DONE]`, or a terminating error event on block.
pub async fn run_stream(
    state: &AppState,
    provider: Provider,
    agent_id: &str,
    chat_id: &str,
    model: &str,
    mut messages: Vec<Message>,
) -> Result<String, ApiError> {
    ingress_scan(state, agent_id, chat_id, &mut messages).await?;
    persist_last_user_message(state, chat_id, &messages).await?;

    let client = state
        .llm_client(provider)
        .ok_or_else(|| ApiError::Configuration(format!("no client configured for provider {provider:?}")))?;

    let request = ChatRequest::new(model, messages);
    let response = client.chat_completion_stream(&request).await?;

    let mut body = String::new();
    match egress_gate(state, agent_id, chat_id, &response).await {
        Ok(()) => {
            let chunk = wire::render_openai_stream_chunk(model, &response);
            body.push_str(&wire::sse_event(&chunk));
        }
        Err(ApiError::ToolInvocationBlocked(reason)) => {
            info!(reason = %reason, "streaming egress gate denied tool call");
            body.push_str(&wire::sse_event(&wire::render_stream_block_event(&reason)));
        }
        Err(other) => return Err(other),
    }
    body.push_str("data: [DONE]\n\n");

    Ok(body)
}

/// Scan inbound tool-result messages, taint/sanitise as required, mutating
/// `messages` in place before forwarding.
async fn ingress_scan(
    state: &AppState,
    agent_id: &str,
    chat_id: &str,
    messages: &mut [Message],
) -> Result<(), ApiError> {
    let trusted_data = TrustedDataEvaluator::new(&state.policies);

    for i in 0..messages.len() {
        if messages[i].role != Role::Tool {
            continue;
        }

        let tool_call_id = messages[i].tool_call_id.clone().unwrap_or_default();
        let original_content = messages[i].content.clone();
        let tool_name = wire::resolve_tool_name(messages, i, &tool_call_id);

        let Some(tool_name) = tool_name else {
            warn!(tool_call_id, "unknown tool for result, passing through untrusted");
            persist_interaction(state, chat_id, &original_content, true, "unknown tool for result")
                .await?;
            continue;
        };

        let tool_result: Value =
            serde_json::from_str(&original_content).unwrap_or(Value::String(original_content.clone()));

        let decision = trusted_data
            .evaluate(agent_id, &tool_name, &tool_result)
            .await?;

        if decision.is_blocked {
            messages[i].content = format!("[Content blocked by policy: {}]", decision.reason);
        } else if decision.should_sanitize_with_dual_llm {
            let summary = sanitize_with_dual_llm(state, agent_id, messages, &tool_call_id).await?;
            messages[i].content = summary;
        }

        persist_interaction(
            state,
            chat_id,
            &original_content,
            !decision.is_trusted,
            &decision.reason,
        )
        .await?;
    }

    Ok(())
}

async fn sanitize_with_dual_llm(
    state: &AppState,
    agent_id: &str,
    messages: &[Message],
    anchor: &str,
) -> Result<String, ApiError> {
    if let Some(cached) = state.dual_llm.get_result(anchor).await? {
        return Ok(cached.result);
    }

    let config = state
        .dual_llm
        .get_config()
        .await?
        .ok_or_else(|| ApiError::Configuration("dual-llm config is not set".into()))?;
    if config.max_rounds == 0 {
        return Err(ApiError::Configuration("dual-llm max_rounds must be >= 1".into()));
    }

    let provider = Provider::Openai;
    let privileged = state
        .llm_client(provider)
        .ok_or_else(|| ApiError::Configuration("no client configured for provider openai".into()))?;
    let quarantined = privileged;

    let quarantine_config = QuarantineConfig {
        main_agent_prompt: config.main_agent_prompt,
        quarantined_agent_prompt: config.quarantined_agent_prompt,
        summary_prompt: config.summary_prompt,
        max_rounds: config.max_rounds,
    };

    // `messages` here always came through `wire::parse_openai_messages`
    // (the ingress scan's only entry point today), so extraction uses the
    // OpenAI-shape rule regardless of which client executes the loop.
    let agent = QuarantineAgent::new(privileged, quarantined, &quarantine_config, Provider::Openai);
    let outcome = agent.run(messages, anchor).await?;

    let conversations = serde_json::to_string(&outcome.conversations).unwrap_or_default();
    state
        .dual_llm
        .put_result(agent_id, anchor, &conversations, &outcome.result)
        .await?;

    Ok(outcome.result)
}

async fn persist_last_user_message(
    state: &AppState,
    chat_id: &str,
    messages: &[Message],
) -> Result<(), ApiError> {
    if let Some(last_user) = messages.iter().rev().find(|m| m.role == Role::User) {
        persist_interaction(state, chat_id, &last_user.content, false, "").await?;
    }
    Ok(())
}

async fn persist_interaction(
    state: &AppState,
    chat_id: &str,
    content: &str,
    tainted: bool,
    reason: &str,
) -> Result<(), ApiError> {
    let reason = if tainted { Some(reason) } else { None };
    state
        .chats
        .append_interaction(chat_id, content, tainted, reason)
        .await?;
    Ok(())
}

/// Evaluate the tool-invocation gate against an upstream response. Returns
/// an error on the first denial; persists the assistant message on pass.
async fn egress_gate(
    state: &AppState,
    agent_id: &str,
    chat_id: &str,
    response: &LlmResponse,
) -> Result<(), ApiError> {
    let invocation = InvocationEvaluator::new(&state.policies);

    let content = match response {
        LlmResponse::Text(text) => text.clone(),
        LlmResponse::ToolCalls(calls) => {
            for call in calls {
                let arguments = match call.arguments.as_object() {
                    Some(obj) => obj.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
                    None => {
                        return Err(ApiError::ToolInvocationBlocked(
                            "unparseable tool arguments".into(),
                        ));
                    }
                };

                let decision = invocation
                    .evaluate(agent_id, &call.name, &arguments)
                    .await?;
                if !decision.is_allowed {
                    let reason = decision
                        .deny_reason
                        .unwrap_or_else(|| "tool invocation denied by policy".into());
                    info!(tool = %call.name, reason = %reason, "egress gate denied tool call");
                    return Err(ApiError::ToolInvocationBlocked(reason));
                }
            }
            serde_json::to_string(calls).unwrap_or_default()
        }
    };

    persist_interaction(state, chat_id, &content, false, "").await?;
    Ok(())
}
