//! Persistence for the dual-LLM quarantine subsystem: the singleton prompt
//! configuration and the per-tool-call result cache.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::db::Database;
use crate::error::{StoreError, StoreResult};

const SINGLETON_ID: &str = "default";

/// Prompt templates and round budget for the quarantine sub-agent.
///
/// A single row (`id = 'default'`) is upserted; there is never more than one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DualLlmConfig {
    pub main_agent_prompt: String,
    pub quarantined_agent_prompt: String,
    pub summary_prompt: String,
    pub max_rounds: u32,
}

/// A cached quarantine verdict for one tool call, keyed by `tool_call_id`.
///
/// Callers must check this cache before invoking the quarantine loop and
/// reuse the stored `result` byte-for-byte on a hit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DualLlmResult {
    pub agent_id: String,
    pub tool_call_id: String,
    /// JSON-serialized transcript of the privileged/quarantined exchange.
    pub conversations: String,
    pub result: String,
    pub created_at: i64,
}

#[derive(Clone)]
pub struct DualLlmStore {
    db: Database,
}

impl DualLlmStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Fetch the singleton configuration, if one has been set.
    #[instrument(skip(self))]
    pub async fn get_config(&self) -> StoreResult<Option<DualLlmConfig>> {
        self.db
            .execute(|conn| {
                let result = conn.query_row(
                    "SELECT main_agent_prompt, quarantined_agent_prompt, summary_prompt, max_rounds \
                     FROM dual_llm_config WHERE id = 'default'",
                    [],
                    |row| {
                        Ok(DualLlmConfig {
                            main_agent_prompt: row.get(0)?,
                            quarantined_agent_prompt: row.get(1)?,
                            summary_prompt: row.get(2)?,
                            max_rounds: row.get(3)?,
                        })
                    },
                );
                match result {
                    Ok(cfg) => Ok(Some(cfg)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(StoreError::Sqlite(e)),
                }
            })
            .await
    }

    /// Insert or replace the singleton configuration.
    #[instrument(skip(self, config))]
    pub async fn put_config(&self, config: DualLlmConfig) -> StoreResult<()> {
        if config.max_rounds == 0 {
            return Err(StoreError::InvalidArgument(
                "max_rounds must be at least 1".to_string(),
            ));
        }
        self.db
            .execute(move |conn| {
                conn.execute(
                    "INSERT INTO dual_llm_config (id, main_agent_prompt, quarantined_agent_prompt, summary_prompt, max_rounds) \
                     VALUES (?1, ?2, ?3, ?4, ?5) \
                     ON CONFLICT(id) DO UPDATE SET \
                        main_agent_prompt = excluded.main_agent_prompt, \
                        quarantined_agent_prompt = excluded.quarantined_agent_prompt, \
                        summary_prompt = excluded.summary_prompt, \
                        max_rounds = excluded.max_rounds",
                    rusqlite::params![
                        SINGLETON_ID,
                        config.main_agent_prompt,
                        config.quarantined_agent_prompt,
                        config.summary_prompt,
                        config.max_rounds
                    ],
                )?;
                Ok(())
            })
            .await
    }

    /// Look up a cached quarantine result by tool call id.
    #[instrument(skip(self))]
    pub async fn get_result(&self, tool_call_id: &str) -> StoreResult<Option<DualLlmResult>> {
        let tool_call_id = tool_call_id.to_string();
        self.db
            .execute(move |conn| {
                let result = conn.query_row(
                    "SELECT agent_id, tool_call_id, conversations, result, created_at \
                     FROM dual_llm_results WHERE tool_call_id = ?1",
                    rusqlite::params![tool_call_id],
                    |row| {
                        Ok(DualLlmResult {
                            agent_id: row.get(0)?,
                            tool_call_id: row.get(1)?,
                            conversations: row.get(2)?,
                            result: row.get(3)?,
                            created_at: row.get(4)?,
                        })
                    },
                );
                match result {
                    Ok(r) => Ok(Some(r)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(StoreError::Sqlite(e)),
                }
            })
            .await
    }

    /// Upsert a quarantine result. Last writer wins on a `tool_call_id` collision.
    #[instrument(skip(self, conversations, result))]
    pub async fn put_result(
        &self,
        agent_id: &str,
        tool_call_id: &str,
        conversations: &str,
        result: &str,
    ) -> StoreResult<DualLlmResult> {
        let agent_id = agent_id.to_string();
        let tool_call_id = tool_call_id.to_string();
        let conversations = conversations.to_string();
        let result = result.to_string();
        let now = Utc::now().timestamp();

        let record = DualLlmResult {
            agent_id: agent_id.clone(),
            tool_call_id: tool_call_id.clone(),
            conversations: conversations.clone(),
            result: result.clone(),
            created_at: now,
        };

        self.db
            .execute(move |conn| {
                conn.execute(
                    "INSERT INTO dual_llm_results (agent_id, tool_call_id, conversations, result, created_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5) \
                     ON CONFLICT(tool_call_id) DO UPDATE SET \
                        agent_id = excluded.agent_id, \
                        conversations = excluded.conversations, \
                        result = excluded.result, \
                        created_at = excluded.created_at",
                    rusqlite::params![agent_id, tool_call_id, conversations, result, now],
                )?;
                Ok(())
            })
            .await?;

        debug!(tool_call_id = %record.tool_call_id, "dual-llm result cached");
        Ok(record)
    }
}

// ── tests ────────────────────────────────────────────────────────────
