//! Route handlers for chat/interaction management and guarded chat
//! completions.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, header};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::{Value, json};

use crate::error::{ApiError, Result};
use crate::pipeline;
use crate::state::{AppState, parse_provider};
use crate::wire;

const CHAT_ID_HEADER: &str = "x-archestra-chat-id";
const AGENT_ID_HEADER: &str = "x-archestra-agent-id";

fn required_header<'a>(headers: &'a HeaderMap, name: &str) -> Result<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::InvalidRequest(format!("missing required header: {name}")))
}

// ---------------------------------------------------------------------------
// GET /health
// ---------------------------------------------------------------------------

pub async fn health() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

// ---------------------------------------------------------------------------
// GET /openapi.json
// ---------------------------------------------------------------------------

pub async fn openapi() -> Json<Value> {
    Json(json!({
        "openapi": "3.0.3",
        "info": { "title": "archestra proxy", "version": env!("CARGO_PKG_VERSION") },
        "paths": {
            "/api/chats": { "get": {}, "post": {} },
            "/api/chats/{id}": { "get": {} },
            "/v1/{provider}/chat/completions": { "post": {} },
            "/v1/{provider}/models": { "get": {} },
            "/health": { "get": {} }
        }
    }))
}

// ---------------------------------------------------------------------------
// Chats
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct CreateChatResponse {
    #[serde(rename = "chatId")]
    pub chat_id: String,
}

pub async fn create_chat(State(state): State<Arc<AppState>>) -> Result<Json<CreateChatResponse>> {
    let chat = state.chats.create().await?;
    Ok(Json(CreateChatResponse { chat_id: chat.id }))
}

pub async fn list_chats(State(state): State<Arc<AppState>>) -> Result<Json<Value>> {
    let chats = state.chats.list().await?;
    let mut out = Vec::with_capacity(chats.len());
    for chat in chats {
        let with_interactions = state.chats.find_by_id(&chat.id).await?;
        out.push(render_chat(&with_interactions));
    }
    Ok(Json(json!(out)))
}

pub async fn get_chat(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Value>> {
    let with_interactions = state.chats.find_by_id(&id).await?;
    Ok(Json(render_chat(&with_interactions)))
}

fn render_chat(chat: &archestra_store::ChatWithInteractions) -> Value {
    json!({
        "id": chat.chat.id,
        "createdAt": chat.chat.created_at,
        "updatedAt": chat.chat.updated_at,
        "interactions": chat.interactions.iter().map(|i| json!({
            "id": i.id,
            "content": i.content,
            "tainted": i.tainted,
            "taintReason": i.taint_reason,
            "createdAt": i.created_at,
        })).collect::<Vec<_>>(),
    })
}

// ---------------------------------------------------------------------------
// POST /v1/:provider/chat/completions
// ---------------------------------------------------------------------------

pub async fn chat_completions(
    State(state): State<Arc<AppState>>,
    Path(provider): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Response> {
    let provider = parse_provider(&provider)
        .ok_or_else(|| ApiError::InvalidRequest(format!("unsupported provider: {provider}")))?;

    let chat_id = required_header(&headers, CHAT_ID_HEADER)?.to_string();
    let agent_id = required_header(&headers, AGENT_ID_HEADER)?.to_string();

    if !state.chats.exists(&chat_id).await? {
        return Err(ApiError::NotFound(format!("chat not found: {chat_id}")));
    }
    state.agents.get_agent(&agent_id).await.map_err(|_| {
        ApiError::NotFound(format!("agent not found: {agent_id}"))
    })?;

    let model = body["model"].as_str().unwrap_or_default().to_string();
    // Outbound forwarding (archestra_llm::client) only serializes a
    // message's flat `content`, not `content_blocks`, so routing genuinely
    // Anthropic-shaped request bodies through here would silently drop any
    // `tool_result` block on the way upstream. Until that serializer is
    // content-block-aware, every inbound request is read in OpenAI shape
    // regardless of `provider`; `provider` only selects the upstream client
    // and, inside the dual-LLM sanitizer, which extraction rule applies.
    let messages = wire::parse_openai_messages(&body["messages"])?;
    let stream = body["stream"].as_bool().unwrap_or(false);

    if stream {
        let sse_body =
            pipeline::run_stream(&state, provider, &agent_id, &chat_id, &model, messages).await?;
        let response = (
            [
                (header::CONTENT_TYPE, "text/event-stream"),
                (header::CACHE_CONTROL, "no-cache"),
                (header::CONNECTION, "keep-alive"),
            ],
            sse_body,
        )
            .into_response();
        Ok(response)
    } else {
        let outcome = pipeline::run(&state, provider, &agent_id, &chat_id, &model, messages).await?;
        Ok(Json(outcome.response_json).into_response())
    }
}

// ---------------------------------------------------------------------------
// GET /v1/:provider/models
// ---------------------------------------------------------------------------

pub async fn list_models(
    State(state): State<Arc<AppState>>,
    Path(provider): Path<String>,
) -> Result<Json<Value>> {
    let provider = parse_provider(&provider)
        .ok_or_else(|| ApiError::InvalidRequest(format!("unsupported provider: {provider}")))?;
    let client = state
        .llm_client(provider)
        .ok_or_else(|| ApiError::Configuration(format!("no client configured for provider {provider:?}")))?;
    let models = client.list_models().await?;
    Ok(Json(json!({ "object": "list", "data": models.into_iter().map(|id| json!({"id": id})).collect::<Vec<_>>() })))
}
