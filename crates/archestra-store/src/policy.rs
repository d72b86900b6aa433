//! Policy persistence: tool-invocation policies, trusted-data policies,
//! and the agent junction tables that scope them.
//!
//! The two read paths that matter for request-time evaluation are
//! [`PolicyStore::list_tool_invocation_policies_for_agent_and_tool`] and
//! [`PolicyStore::list_trusted_data_policies_for_agent_and_tool`]: both
//! join an agent's assigned policies down to the ones that also apply to
//! a named tool, returned in the stable `created_at ASC, id ASC` order
//! the evaluators rely on for deterministic first-match semantics.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::instrument;
use uuid::Uuid;

use crate::db::Database;
use crate::error::{StoreError, StoreResult};

// ═══════════════════════════════════════════════════════════════════════
//  Types
// ═══════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyAction {
    Allow,
    Block,
}

impl PolicyAction {
    fn from_str(s: &str) -> StoreResult<Self> {
        match s {
            "allow" => Ok(Self::Allow),
            "block" => Ok(Self::Block),
            other => Err(StoreError::InvalidArgument(format!("unknown policy action: {other}"))),
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            Self::Allow => "allow",
            Self::Block => "block",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInvocationPolicy {
    pub id: String,
    pub tool_id: String,
    pub description: String,
    pub argument_name: String,
    /// One of the operator names defined by `archestra_core::Operator`.
    pub operator: String,
    pub value: String,
    pub action: PolicyAction,
    pub block_prompt: Option<String>,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrustedDataPolicy {
    pub id: String,
    pub tool_id: String,
    pub description: String,
    pub attribute_path: String,
    pub operator: String,
    pub value: String,
    pub created_at: i64,
}

/// CRUD and junction operations for both policy kinds.
#[derive(Clone)]
pub struct PolicyStore {
    db: Database,
}

impl PolicyStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    // ── tool-invocation policies ────────────────────────────────────

    #[instrument(skip(self, description, value, block_prompt))]
    #[allow(clippy::too_many_arguments)]
    pub async fn create_tool_invocation_policy(
        &self,
        tool_id: &str,
        description: &str,
        argument_name: &str,
        operator: &str,
        value: &str,
        action: PolicyAction,
        block_prompt: Option<&str>,
    ) -> StoreResult<ToolInvocationPolicy> {
        let id = Uuid::new_v4().to_string();
        let tool_id = tool_id.to_string();
        let description = description.to_string();
        let argument_name = argument_name.to_string();
        let operator = operator.to_string();
        let value = value.to_string();
        let block_prompt = block_prompt.map(|s| s.to_string());
        let now = Utc::now().timestamp();

        let policy = ToolInvocationPolicy {
            id: id.clone(),
            tool_id: tool_id.clone(),
            description: description.clone(),
            argument_name: argument_name.clone(),
            operator: operator.clone(),
            value: value.clone(),
            action,
            block_prompt: block_prompt.clone(),
            created_at: now,
        };

        self.db
            .execute(move |conn| {
                conn.execute(
                    "INSERT INTO tool_invocation_policies \
                     (id, tool_id, description, argument_name, operator, value, action, block_prompt, created_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                    rusqlite::params![
                        id,
                        tool_id,
                        description,
                        argument_name,
                        operator,
                        value,
                        action.as_str(),
                        block_prompt,
                        now
                    ],
                )?;
                Ok(())
            })
            .await?;

        Ok(policy)
    }

    #[instrument(skip(self))]
    pub async fn delete_tool_invocation_policy(&self, id: &str) -> StoreResult<()> {
        let id = id.to_string();
        self.db
            .execute(move |conn| {
                let deleted = conn.execute(
                    "DELETE FROM tool_invocation_policies WHERE id = ?1",
                    rusqlite::params![id],
                )?;
                if deleted == 0 {
                    return Err(StoreError::NotFound {
                        entity: "tool_invocation_policy",
                        id,
                    });
                }
                Ok(())
            })
            .await
    }

    #[instrument(skip(self))]
    pub async fn assign_tool_invocation_policy(&self, agent_id: &str, policy_id: &str) -> StoreResult<()> {
        let agent_id = agent_id.to_string();
        let policy_id = policy_id.to_string();
        self.db
            .execute(move |conn| {
                conn.execute(
                    "INSERT OR IGNORE INTO agent_tool_invocation_policies (agent_id, policy_id) VALUES (?1, ?2)",
                    rusqlite::params![agent_id, policy_id],
                )?;
                Ok(())
            })
            .await
    }

    #[instrument(skip(self))]
    pub async fn unassign_tool_invocation_policy(&self, agent_id: &str, policy_id: &str) -> StoreResult<()> {
        let agent_id = agent_id.to_string();
        let policy_id = policy_id.to_string();
        self.db
            .execute(move |conn| {
                conn.execute(
                    "DELETE FROM agent_tool_invocation_policies WHERE agent_id = ?1 AND policy_id = ?2",
                    rusqlite::params![agent_id, policy_id],
                )?;
                Ok(())
            })
            .await
    }

    /// Every tool-invocation policy assigned to `agent_id` that is also
    /// scoped to the tool named `tool_name`, ordered `created_at ASC, id ASC`.
    #[instrument(skip(self))]
    pub async fn list_tool_invocation_policies_for_agent_and_tool(
        &self,
        agent_id: &str,
        tool_name: &str,
    ) -> StoreResult<Vec<ToolInvocationPolicy>> {
        let agent_id = agent_id.to_string();
        let tool_name = tool_name.to_string();
        self.db
            .execute(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT p.id, p.tool_id, p.description, p.argument_name, p.operator, p.value, p.action, p.block_prompt, p.created_at \
                     FROM tool_invocation_policies p \
                     JOIN agent_tool_invocation_policies ap ON ap.policy_id = p.id \
                     JOIN tools t ON t.id = p.tool_id \
                     WHERE ap.agent_id = ?1 AND t.name = ?2 \
                     ORDER BY p.created_at ASC, p.id ASC",
                )?;
                let rows = stmt
                    .query_map(rusqlite::params![agent_id, tool_name], row_to_tool_invocation_policy)?
                    .collect::<Result<Vec<_>, rusqlite::Error>>()?;
                rows.into_iter().collect::<StoreResult<Vec<_>>>()
            })
            .await
    }

    // ── trusted-data policies ───────────────────────────────────────

    #[instrument(skip(self, description, value))]
    pub async fn create_trusted_data_policy(
        &self,
        tool_id: &str,
        description: &str,
        attribute_path: &str,
        operator: &str,
        value: &str,
    ) -> StoreResult<TrustedDataPolicy> {
        let id = Uuid::new_v4().to_string();
        let tool_id = tool_id.to_string();
        let description = description.to_string();
        let attribute_path = attribute_path.to_string();
        let operator = operator.to_string();
        let value = value.to_string();
        let now = Utc::now().timestamp();

        let policy = TrustedDataPolicy {
            id: id.clone(),
            tool_id: tool_id.clone(),
            description: description.clone(),
            attribute_path: attribute_path.clone(),
            operator: operator.clone(),
            value: value.clone(),
            created_at: now,
        };

        self.db
            .execute(move |conn| {
                conn.execute(
                    "INSERT INTO trusted_data_policies \
                     (id, tool_id, description, attribute_path, operator, value, created_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    rusqlite::params![id, tool_id, description, attribute_path, operator, value, now],
                )?;
                Ok(())
            })
            .await?;

        Ok(policy)
    }

    #[instrument(skip(self))]
    pub async fn delete_trusted_data_policy(&self, id: &str) -> StoreResult<()> {
        let id = id.to_string();
        self.db
            .execute(move |conn| {
                let deleted = conn.execute(
                    "DELETE FROM trusted_data_policies WHERE id = ?1",
                    rusqlite::params![id],
                )?;
                if deleted == 0 {
                    return Err(StoreError::NotFound {
                        entity: "trusted_data_policy",
                        id,
                    });
                }
                Ok(())
            })
            .await
    }

    #[instrument(skip(self))]
    pub async fn assign_trusted_data_policy(&self, agent_id: &str, policy_id: &str) -> StoreResult<()> {
        let agent_id = agent_id.to_string();
        let policy_id = policy_id.to_string();
        self.db
            .execute(move |conn| {
                conn.execute(
                    "INSERT OR IGNORE INTO agent_trusted_data_policies (agent_id, policy_id) VALUES (?1, ?2)",
                    rusqlite::params![agent_id, policy_id],
                )?;
                Ok(())
            })
            .await
    }

    #[instrument(skip(self))]
    pub async fn unassign_trusted_data_policy(&self, agent_id: &str, policy_id: &str) -> StoreResult<()> {
        let agent_id = agent_id.to_string();
        let policy_id = policy_id.to_string();
        self.db
            .execute(move |conn| {
                conn.execute(
                    "DELETE FROM agent_trusted_data_policies WHERE agent_id = ?1 AND policy_id = ?2",
                    rusqlite::params![agent_id, policy_id],
                )?;
                Ok(())
            })
            .await
    }

    /// Every trusted-data policy assigned to `agent_id` that is also
    /// scoped to the tool named `tool_name`, ordered `created_at ASC, id ASC`.
    #[instrument(skip(self))]
    pub async fn list_trusted_data_policies_for_agent_and_tool(
        &self,
        agent_id: &str,
        tool_name: &str,
    ) -> StoreResult<Vec<TrustedDataPolicy>> {
        let agent_id = agent_id.to_string();
        let tool_name = tool_name.to_string();
        self.db
            .execute(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT p.id, p.tool_id, p.description, p.attribute_path, p.operator, p.value, p.created_at \
                     FROM trusted_data_policies p \
                     JOIN agent_trusted_data_policies ap ON ap.policy_id = p.id \
                     JOIN tools t ON t.id = p.tool_id \
                     WHERE ap.agent_id = ?1 AND t.name = ?2 \
                     ORDER BY p.created_at ASC, p.id ASC",
                )?;
                let rows = stmt
                    .query_map(rusqlite::params![agent_id, tool_name], |row| {
                        Ok(TrustedDataPolicy {
                            id: row.get(0)?,
                            tool_id: row.get(1)?,
                            description: row.get(2)?,
                            attribute_path: row.get(3)?,
                            operator: row.get(4)?,
                            value: row.get(5)?,
                            created_at: row.get(6)?,
                        })
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
    }
}

struct RawToolInvocationPolicy {
    id: String,
    tool_id: String,
    description: String,
    argument_name: String,
    operator: String,
    value: String,
    action: String,
    block_prompt: Option<String>,
    created_at: i64,
}

fn row_to_tool_invocation_policy(row: &rusqlite::Row) -> rusqlite::Result<StoreResult<ToolInvocationPolicy>> {
    let raw = RawToolInvocationPolicy {
        id: row.get(0)?,
        tool_id: row.get(1)?,
        description: row.get(2)?,
        argument_name: row.get(3)?,
        operator: row.get(4)?,
        value: row.get(5)?,
        action: row.get(6)?,
        block_prompt: row.get(7)?,
        created_at: row.get(8)?,
    };
    Ok(PolicyAction::from_str(&raw.action).map(|action| ToolInvocationPolicy {
        id: raw.id,
        tool_id: raw.tool_id,
        description: raw.description,
        argument_name: raw.argument_name,
        operator: raw.operator,
        value: raw.value,
        action,
        block_prompt: raw.block_prompt,
        created_at: raw.created_at,
    }))
}

// ── tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AgentStore;

    async fn setup() -> (Database, AgentStore, PolicyStore) {
        let db = Database::open_in_memory().unwrap();
        db.run_migrations().await.unwrap();
        (db.clone(), AgentStore::new(db.clone()), PolicyStore::new(db))
    }

    #[tokio::test]
    async fn scoped_policy_visible_only_through_assignment() {
        let (_db, agents, policies) = setup().await;
        let agent = agents.create_agent("bot").await.unwrap();
        let tool = agents
            .create_tool(&agent.id, "sendEmail", None, serde_json::json!({}))
            .await
            .unwrap();

        let policy = policies
            .create_tool_invocation_policy(
                &tool.id,
                "block external sends",
                "to",
                "endsWith",
                "@grafana.com",
                PolicyAction::Block,
                Some("Sending to this domain is not allowed."),
            )
            .await
            .unwrap();

        let before = policies
            .list_tool_invocation_policies_for_agent_and_tool(&agent.id, "sendEmail")
            .await
            .unwrap();
        assert!(before.is_empty());

        policies.assign_tool_invocation_policy(&agent.id, &policy.id).await.unwrap();

        let after = policies
            .list_tool_invocation_policies_for_agent_and_tool(&agent.id, "sendEmail")
            .await
            .unwrap();
        assert_eq!(after.len(), 1);
        assert_eq!(after[0].id, policy.id);
        assert_eq!(after[0].action, PolicyAction::Block);
    }

    #[tokio::test]
    async fn policies_ordered_by_creation() {
        let (_db, agents, policies) = setup().await;
        let agent = agents.create_agent("bot").await.unwrap();
        let tool = agents
            .create_tool(&agent.id, "readFile", None, serde_json::json!({}))
            .await
            .unwrap();

        let first = policies
            .create_tool_invocation_policy(&tool.id, "first", "path", "contains", "/etc", PolicyAction::Block, None)
            .await
            .unwrap();
        let second = policies
            .create_tool_invocation_policy(&tool.id, "second", "path", "equal", "/tmp", PolicyAction::Allow, None)
            .await
            .unwrap();

        policies.assign_tool_invocation_policy(&agent.id, &first.id).await.unwrap();
        policies.assign_tool_invocation_policy(&agent.id, &second.id).await.unwrap();

        let ordered = policies
            .list_tool_invocation_policies_for_agent_and_tool(&agent.id, "readFile")
            .await
            .unwrap();
        assert_eq!(ordered[0].id, first.id);
        assert_eq!(ordered[1].id, second.id);
    }

    #[tokio::test]
    async fn trusted_data_policy_round_trip() {
        let (_db, agents, policies) = setup().await;
        let agent = agents.create_agent("bot").await.unwrap();
        let tool = agents
            .create_tool(&agent.id, "fetchInbox", None, serde_json::json!({}))
            .await
            .unwrap();

        let policy = policies
            .create_trusted_data_policy(&tool.id, "trusted senders", "emails[*].from", "endsWith", "@example.com")
            .await
            .unwrap();
        policies.assign_trusted_data_policy(&agent.id, &policy.id).await.unwrap();

        let found = policies
            .list_trusted_data_policies_for_agent_and_tool(&agent.id, "fetchInbox")
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].attribute_path, "emails[*].from");
    }

    #[tokio::test]
    async fn tool_cascade_removes_dangling_assignment() {
        let (_db, agents, policies) = setup().await;
        let agent = agents.create_agent("bot").await.unwrap();
        let tool = agents
            .create_tool(&agent.id, "sendEmail", None, serde_json::json!({}))
            .await
            .unwrap();
        let policy = policies
            .create_tool_invocation_policy(&tool.id, "d", "to", "equal", "x", PolicyAction::Block, None)
            .await
            .unwrap();
        policies.assign_tool_invocation_policy(&agent.id, &policy.id).await.unwrap();

        agents.delete_tool(&tool.id).await.unwrap();

        let found = policies
            .list_tool_invocation_policies_for_agent_and_tool(&agent.id, "sendEmail")
            .await
            .unwrap();
        assert!(found.is_empty());
    }
}
