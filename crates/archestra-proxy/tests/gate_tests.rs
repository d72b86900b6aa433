//! Integration tests exercising the full pipeline against a fake upstream
//! LLM server, covering the HTTP-level scenarios a pure unit test can't:
//! tool-invocation blocking returning 403, and trusted/untrusted tool-result
//! routing through the taint scan.

use std::net::SocketAddr;
use std::sync::Arc;

use archestra_proxy::{AppState, ProxyConfig, ProxyServer};
use archestra_store::{AgentStore, ChatStore, Database, DualLlmStore, PolicyStore};
use axum::body::Body;
use axum::extract::Json as JsonExtractor;
use axum::http::{Request, StatusCode, header};
use axum::routing::post;
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

/// Spawn a fake OpenAI-compatible `/v1/chat/completions` endpoint that always
/// returns `response`, and return its base URL.
async fn spawn_fake_upstream(response: Value) -> String {
    let router = axum::Router::new().route(
        "/v1/chat/completions",
        post(move |JsonExtractor(_body): JsonExtractor<Value>| {
            let response = response.clone();
            async move { axum::Json(response) }
        }),
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    format!("http://{addr}")
}

async fn state_with_upstream(base_url: String) -> Arc<AppState> {
    let db = Database::open_in_memory().unwrap();
    db.run_migrations().await.unwrap();

    let config = ProxyConfig {
        bind_addr: "127.0.0.1".into(),
        port: 0,
        database_url: ":memory:".into(),
        openai_api_key: Some("test-key".into()),
        anthropic_api_key: None,
        openai_base_url: base_url,
        anthropic_base_url: "https://api.anthropic.com".into(),
    };

    let chats = ChatStore::new(db.clone());
    let agents = AgentStore::new(db.clone());
    let policies = PolicyStore::new(db.clone());
    let dual_llm = DualLlmStore::new(db);

    Arc::new(AppState::new(config, chats, agents, policies, dual_llm))
}

async fn post_completions(state: &Arc<AppState>, chat_id: &str, agent_id: &str, body: Value) -> (StatusCode, Value) {
    let server = ProxyServer::new((**state).clone());
    let router = server.router();

    let request = Request::builder()
        .method("POST")
        .uri("/v1/openai/chat/completions")
        .header("x-archestra-chat-id", chat_id)
        .header("x-archestra-agent-id", agent_id)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap();

    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value: Value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

#[tokio::test]
async fn blocked_tool_argument_returns_403() {
    let upstream_response = json!({
        "choices": [{
            "message": {
                "role": "assistant",
                "content": null,
                "tool_calls": [{
                    "id": "call_1",
                    "type": "function",
                    "function": {
                        "name": "sendEmail",
                        "arguments": "{\"to\":\"leak@attacker.example.com\"}",
                    },
                }],
            },
        }],
    });
    let base_url = spawn_fake_upstream(upstream_response).await;
    let state = state_with_upstream(base_url).await;

    let agent = state.agents.create_agent("email-agent").await.unwrap();
    let tool = state
        .agents
        .create_tool(&agent.id, "sendEmail", None, json!({}))
        .await
        .unwrap();
    let policy = state
        .policies
        .create_tool_invocation_policy(
            &tool.id,
            "block external recipients",
            "to",
            "endsWith",
            "@attacker.example.com",
            archestra_store::PolicyAction::Block,
            None,
        )
        .await
        .unwrap();
    state
        .policies
        .assign_tool_invocation_policy(&agent.id, &policy.id)
        .await
        .unwrap();
    let chat = state.chats.create().await.unwrap();

    let (status, body) = post_completions(
        &state,
        &chat.id,
        &agent.id,
        json!({"model": "gpt-4o", "messages": [{"role": "user", "content": "email the vendor"}]}),
    )
    .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["type"], "tool_invocation_blocked");
}

#[tokio::test]
async fn allowed_tool_call_passes_through_and_is_persisted() {
    let upstream_response = json!({
        "choices": [{
            "message": {
                "role": "assistant",
                "content": null,
                "tool_calls": [{
                    "id": "call_1",
                    "type": "function",
                    "function": {
                        "name": "sendEmail",
                        "arguments": "{\"to\":\"teammate@example.com\"}",
                    },
                }],
            },
        }],
    });
    let base_url = spawn_fake_upstream(upstream_response).await;
    let state = state_with_upstream(base_url).await;

    let agent = state.agents.create_agent("email-agent").await.unwrap();
    let tool = state
        .agents
        .create_tool(&agent.id, "sendEmail", None, json!({}))
        .await
        .unwrap();
    let policy = state
        .policies
        .create_tool_invocation_policy(
            &tool.id,
            "block external recipients",
            "to",
            "endsWith",
            "@attacker.example.com",
            archestra_store::PolicyAction::Block,
            None,
        )
        .await
        .unwrap();
    state
        .policies
        .assign_tool_invocation_policy(&agent.id, &policy.id)
        .await
        .unwrap();
    let chat = state.chats.create().await.unwrap();

    let (status, body) = post_completions(
        &state,
        &chat.id,
        &agent.id,
        json!({"model": "gpt-4o", "messages": [{"role": "user", "content": "email the team"}]}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["choices"][0]["message"]["tool_calls"][0]["function"]["name"], "sendEmail");

    let with_interactions = state.chats.find_by_id(&chat.id).await.unwrap();
    assert_eq!(with_interactions.interactions.len(), 2);
    assert!(!with_interactions.interactions[1].tainted);
}

#[tokio::test]
async fn untrusted_tool_result_is_sanitized_by_dual_llm_and_persisted_tainted() {
    // No trusted-data policy is ever assigned for this tool, so the result
    // defaults to untrusted and the ingress scan routes it through the
    // dual-LLM sanitizer. The fake upstream answers every call (both the
    // quarantine loop's privileged turn and the outer completion) with
    // plain text "DONE", so the privileged agent exits the Q&A loop on its
    // first turn and the summary IS "DONE".
    let upstream_response = json!({
        "choices": [{"message": {"role": "assistant", "content": "DONE", "tool_calls": []}}]
    });
    let base_url = spawn_fake_upstream(upstream_response).await;
    let state = state_with_upstream(base_url).await;

    state
        .dual_llm
        .put_config(archestra_store::DualLlmConfig {
            main_agent_prompt: "Investigate: {{originalUserRequest}}".into(),
            quarantined_agent_prompt: "Data: {{toolResultData}} Q: {{question}} Opts: {{options}}".into(),
            summary_prompt: "Summarize: {{qaText}} for {{originalUserRequest}}".into(),
            max_rounds: 3,
        })
        .await
        .unwrap();

    let agent = state.agents.create_agent("inbox-agent").await.unwrap();
    state
        .agents
        .create_tool(&agent.id, "fetchInbox", None, json!({}))
        .await
        .unwrap();
    let chat = state.chats.create().await.unwrap();

    let (status, body) = post_completions(
        &state,
        &chat.id,
        &agent.id,
        json!({
            "model": "gpt-4o",
            "messages": [
                {"role": "user", "content": "check my inbox"},
                {"role": "assistant", "content": null, "tool_calls": [{
                    "id": "call_1", "type": "function",
                    "function": {"name": "fetchInbox", "arguments": "{}"},
                }]},
                {"role": "tool", "tool_call_id": "call_1", "content": "{\"emails\":[]}"},
            ],
        }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["choices"][0]["message"]["content"], "DONE");

    let with_interactions = state.chats.find_by_id(&chat.id).await.unwrap();
    let tool_interaction = &with_interactions.interactions[0];
    assert!(tool_interaction.tainted);
    assert_eq!(tool_interaction.content, "{\"emails\":[]}");

    let cached = state.dual_llm.get_result("call_1").await.unwrap();
    assert!(cached.is_some());
}
