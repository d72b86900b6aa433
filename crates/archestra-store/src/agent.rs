//! Agent and tool persistence.
//!
//! Agents own tools; tools carry a unique name and a JSON parameter schema.
//! Deleting an agent cascades to its tools, which in turn cascades to any
//! policies scoped to those tools.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::db::Database;
use crate::error::{StoreError, StoreResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: String,
    pub name: String,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tool {
    pub id: String,
    pub agent_id: String,
    pub name: String,
    pub description: Option<String>,
    pub parameters: Value,
}

/// CRUD operations on agents and their tools.
#[derive(Clone)]
pub struct AgentStore {
    db: Database,
}

impl AgentStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    #[instrument(skip(self))]
    pub async fn create_agent(&self, name: &str) -> StoreResult<Agent> {
        let id = Uuid::new_v4().to_string();
        let name = name.to_string();
        let now = Utc::now().timestamp();

        let agent = Agent {
            id: id.clone(),
            name: name.clone(),
            created_at: now,
            updated_at: now,
        };

        self.db
            .execute(move |conn| {
                conn.execute(
                    "INSERT INTO agents (id, name, created_at, updated_at) VALUES (?1, ?2, ?3, ?3)",
                    rusqlite::params![id, name, now],
                )?;
                Ok(())
            })
            .await?;

        debug!(agent_id = %agent.id, "agent created");
        Ok(agent)
    }

    #[instrument(skip(self))]
    pub async fn get_agent(&self, id: &str) -> StoreResult<Agent> {
        let id = id.to_string();
        self.db
            .execute(move |conn| {
                conn.query_row(
                    "SELECT id, name, created_at, updated_at FROM agents WHERE id = ?1",
                    rusqlite::params![id],
                    |row| {
                        Ok(Agent {
                            id: row.get(0)?,
                            name: row.get(1)?,
                            created_at: row.get(2)?,
                            updated_at: row.get(3)?,
                        })
                    },
                )
                .map_err(|e| match e {
                    rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound {
                        entity: "agent",
                        id: id.clone(),
                    },
                    other => StoreError::Sqlite(other),
                })
            })
            .await
    }

    #[instrument(skip(self))]
    pub async fn list_agents(&self) -> StoreResult<Vec<Agent>> {
        self.db
            .execute(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, name, created_at, updated_at FROM agents ORDER BY created_at ASC",
                )?;
                let rows = stmt
                    .query_map([], |row| {
                        Ok(Agent {
                            id: row.get(0)?,
                            name: row.get(1)?,
                            created_at: row.get(2)?,
                            updated_at: row.get(3)?,
                        })
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
    }

    #[instrument(skip(self))]
    pub async fn update_agent_name(&self, id: &str, name: &str) -> StoreResult<()> {
        let id = id.to_string();
        let name = name.to_string();
        let now = Utc::now().timestamp();
        self.db
            .execute(move |conn| {
                let updated = conn.execute(
                    "UPDATE agents SET name = ?2, updated_at = ?3 WHERE id = ?1",
                    rusqlite::params![id, name, now],
                )?;
                if updated == 0 {
                    return Err(StoreError::NotFound { entity: "agent", id });
                }
                Ok(())
            })
            .await
    }

    #[instrument(skip(self))]
    pub async fn delete_agent(&self, id: &str) -> StoreResult<()> {
        let id = id.to_string();
        self.db
            .execute(move |conn| {
                let deleted = conn.execute("DELETE FROM agents WHERE id = ?1", rusqlite::params![id])?;
                if deleted == 0 {
                    return Err(StoreError::NotFound { entity: "agent", id });
                }
                Ok(())
            })
            .await
    }

    #[instrument(skip(self, parameters))]
    pub async fn create_tool(
        &self,
        agent_id: &str,
        name: &str,
        description: Option<&str>,
        parameters: Value,
    ) -> StoreResult<Tool> {
        let id = Uuid::new_v4().to_string();
        let agent_id = agent_id.to_string();
        let name = name.to_string();
        let description = description.map(|s| s.to_string());
        let parameters_str = serde_json::to_string(&parameters)?;

        let tool = Tool {
            id: id.clone(),
            agent_id: agent_id.clone(),
            name: name.clone(),
            description: description.clone(),
            parameters: parameters.clone(),
        };

        self.db
            .execute(move |conn| {
                conn.execute(
                    "INSERT INTO tools (id, agent_id, name, description, parameters) VALUES (?1, ?2, ?3, ?4, ?5)",
                    rusqlite::params![id, agent_id, name, description, parameters_str],
                )?;
                Ok(())
            })
            .await?;

        Ok(tool)
    }

    #[instrument(skip(self))]
    pub async fn get_tool_by_name(&self, name: &str) -> StoreResult<Option<Tool>> {
        let name = name.to_string();
        self.db
            .execute(move |conn| {
                let result = conn.query_row(
                    "SELECT id, agent_id, name, description, parameters FROM tools WHERE name = ?1",
                    rusqlite::params![name],
                    row_to_tool,
                );
                match result {
                    Ok(tool) => Ok(Some(tool)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(StoreError::Sqlite(e)),
                }
            })
            .await
    }

    #[instrument(skip(self))]
    pub async fn list_tools_for_agent(&self, agent_id: &str) -> StoreResult<Vec<Tool>> {
        let agent_id = agent_id.to_string();
        self.db
            .execute(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, agent_id, name, description, parameters FROM tools WHERE agent_id = ?1 ORDER BY name ASC",
                )?;
                let rows = stmt
                    .query_map(rusqlite::params![agent_id], row_to_tool)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
    }

    #[instrument(skip(self))]
    pub async fn delete_tool(&self, id: &str) -> StoreResult<()> {
        let id = id.to_string();
        self.db
            .execute(move |conn| {
                let deleted = conn.execute("DELETE FROM tools WHERE id = ?1", rusqlite::params![id])?;
                if deleted == 0 {
                    return Err(StoreError::NotFound { entity: "tool", id });
                }
                Ok(())
            })
            .await
    }
}

fn row_to_tool(row: &rusqlite::Row) -> rusqlite::Result<Tool> {
    let parameters_str: String = row.get(4)?;
    let parameters: Value = serde_json::from_str(&parameters_str).unwrap_or(Value::Null);
    Ok(Tool {
        id: row.get(0)?,
        agent_id: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        parameters,
    })
}

// ── tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    async fn setup_db() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.run_migrations().await.unwrap();
        db
    }

    #[tokio::test]
    async fn create_agent_and_tool() {
        let store = AgentStore::new(setup_db().await);
        let agent = store.create_agent("support-bot").await.unwrap();

        let tool = store
            .create_tool(
                &agent.id,
                "sendEmail",
                Some("sends an email"),
                serde_json::json!({"type": "object", "properties": {"to": {"type": "string"}}}),
            )
            .await
            .unwrap();

        assert_eq!(tool.agent_id, agent.id);
        let found = store.get_tool_by_name("sendEmail").await.unwrap().unwrap();
        assert_eq!(found.id, tool.id);
    }

    #[tokio::test]
    async fn deleting_agent_cascades_tools() {
        let store = AgentStore::new(setup_db().await);
        let agent = store.create_agent("bot").await.unwrap();
        store
            .create_tool(&agent.id, "readFile", None, serde_json::json!({}))
            .await
            .unwrap();

        store.delete_agent(&agent.id).await.unwrap();

        let remaining = store.get_tool_by_name("readFile").await.unwrap();
        assert!(remaining.is_none());
    }

    #[tokio::test]
    async fn get_nonexistent_agent_is_not_found() {
        let store = AgentStore::new(setup_db().await);
        let result = store.get_agent("missing").await;
        assert!(matches!(result, Err(StoreError::NotFound { entity: "agent", .. })));
    }
}
