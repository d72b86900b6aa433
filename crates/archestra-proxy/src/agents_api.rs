//! CRUD handlers for agents, tools, and their policy assignments. Backs an
//! external admin UI; this crate ships only the data operations.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use serde::Deserialize;
use serde_json::{Value, json};

use archestra_store::PolicyAction;

use crate::error::Result;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Agents
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct CreateAgentRequest {
    pub name: String,
}

pub async fn create_agent(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateAgentRequest>,
) -> Result<Json<Value>> {
    let agent = state.agents.create_agent(&body.name).await?;
    Ok(Json(render_agent(&agent)))
}

pub async fn list_agents(State(state): State<Arc<AppState>>) -> Result<Json<Value>> {
    let agents = state.agents.list_agents().await?;
    Ok(Json(json!(agents.iter().map(render_agent).collect::<Vec<_>>())))
}

pub async fn get_agent(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Value>> {
    let agent = state.agents.get_agent(&id).await?;
    Ok(Json(render_agent(&agent)))
}

#[derive(Deserialize)]
pub struct UpdateAgentRequest {
    pub name: String,
}

pub async fn update_agent(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<UpdateAgentRequest>,
) -> Result<Json<Value>> {
    state.agents.update_agent_name(&id, &body.name).await?;
    let agent = state.agents.get_agent(&id).await?;
    Ok(Json(render_agent(&agent)))
}

pub async fn delete_agent(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Value>> {
    state.agents.delete_agent(&id).await?;
    Ok(Json(json!({"deleted": true})))
}

fn render_agent(agent: &archestra_store::Agent) -> Value {
    json!({
        "id": agent.id,
        "name": agent.name,
        "createdAt": agent.created_at,
        "updatedAt": agent.updated_at,
    })
}

// ---------------------------------------------------------------------------
// Tools
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct CreateToolRequest {
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub parameters: Value,
}

pub async fn create_tool(
    State(state): State<Arc<AppState>>,
    Path(agent_id): Path<String>,
    Json(body): Json<CreateToolRequest>,
) -> Result<Json<Value>> {
    let tool = state
        .agents
        .create_tool(&agent_id, &body.name, body.description.as_deref(), body.parameters)
        .await?;
    Ok(Json(render_tool(&tool)))
}

pub async fn list_tools(
    State(state): State<Arc<AppState>>,
    Path(agent_id): Path<String>,
) -> Result<Json<Value>> {
    let tools = state.agents.list_tools_for_agent(&agent_id).await?;
    Ok(Json(json!(tools.iter().map(render_tool).collect::<Vec<_>>())))
}

pub async fn delete_tool(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Value>> {
    state.agents.delete_tool(&id).await?;
    Ok(Json(json!({"deleted": true})))
}

fn render_tool(tool: &archestra_store::Tool) -> Value {
    json!({
        "id": tool.id,
        "agentId": tool.agent_id,
        "name": tool.name,
        "description": tool.description,
        "parameters": tool.parameters,
    })
}

// ---------------------------------------------------------------------------
// Tool-invocation policies
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct CreateInvocationPolicyRequest {
    #[serde(rename = "toolId")]
    pub tool_id: String,
    pub description: String,
    #[serde(rename = "argumentName")]
    pub argument_name: String,
    pub operator: String,
    pub value: String,
    pub action: PolicyActionWire,
    #[serde(rename = "blockPrompt")]
    pub block_prompt: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyActionWire {
    Allow,
    Block,
}

pub async fn create_invocation_policy(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateInvocationPolicyRequest>,
) -> Result<Json<Value>> {
    let action = match body.action {
        PolicyActionWire::Allow => PolicyAction::Allow,
        PolicyActionWire::Block => PolicyAction::Block,
    };
    let policy = state
        .policies
        .create_tool_invocation_policy(
            &body.tool_id,
            &body.description,
            &body.argument_name,
            &body.operator,
            &body.value,
            action,
            body.block_prompt.as_deref(),
        )
        .await?;
    Ok(Json(json!({
        "id": policy.id,
        "toolId": policy.tool_id,
        "description": policy.description,
        "argumentName": policy.argument_name,
        "operator": policy.operator,
        "value": policy.value,
        "action": policy.action,
        "blockPrompt": policy.block_prompt,
    })))
}

pub async fn delete_invocation_policy(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Value>> {
    state.policies.delete_tool_invocation_policy(&id).await?;
    Ok(Json(json!({"deleted": true})))
}

#[derive(Deserialize)]
pub struct AssignPolicyRequest {
    #[serde(rename = "policyId")]
    pub policy_id: String,
}

pub async fn assign_invocation_policy(
    State(state): State<Arc<AppState>>,
    Path(agent_id): Path<String>,
    Json(body): Json<AssignPolicyRequest>,
) -> Result<Json<Value>> {
    state
        .policies
        .assign_tool_invocation_policy(&agent_id, &body.policy_id)
        .await?;
    Ok(Json(json!({"assigned": true})))
}

// ---------------------------------------------------------------------------
// Trusted-data policies
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct CreateTrustedDataPolicyRequest {
    #[serde(rename = "toolId")]
    pub tool_id: String,
    pub description: String,
    #[serde(rename = "attributePath")]
    pub attribute_path: String,
    pub operator: String,
    pub value: String,
}

pub async fn create_trusted_data_policy(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateTrustedDataPolicyRequest>,
) -> Result<Json<Value>> {
    let policy = state
        .policies
        .create_trusted_data_policy(
            &body.tool_id,
            &body.description,
            &body.attribute_path,
            &body.operator,
            &body.value,
        )
        .await?;
    Ok(Json(json!({
        "id": policy.id,
        "toolId": policy.tool_id,
        "description": policy.description,
        "attributePath": policy.attribute_path,
        "operator": policy.operator,
        "value": policy.value,
    })))
}

pub async fn delete_trusted_data_policy(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Value>> {
    state.policies.delete_trusted_data_policy(&id).await?;
    Ok(Json(json!({"deleted": true})))
}

pub async fn assign_trusted_data_policy(
    State(state): State<Arc<AppState>>,
    Path(agent_id): Path<String>,
    Json(body): Json<AssignPolicyRequest>,
) -> Result<Json<Value>> {
    state
        .policies
        .assign_trusted_data_policy(&agent_id, &body.policy_id)
        .await?;
    Ok(Json(json!({"assigned": true})))
}
