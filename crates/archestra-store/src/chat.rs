//! Chat and interaction persistence.
//!
//! A chat is an append-only log of interactions: inbound tool results,
//! user messages, and assistant replies, each stamped with whether the
//! proxy considered its content tainted. There is no update or delete API
//! for interactions — once persisted, an interaction is immutable.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::db::Database;
use crate::error::{StoreError, StoreResult};

// ═══════════════════════════════════════════════════════════════════════
//  Types
// ═══════════════════════════════════════════════════════════════════════

/// A conversation the proxy is mediating.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chat {
    pub id: String,
    pub created_at: i64,
    pub updated_at: i64,
}

/// A single entry in a chat's append-only log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Interaction {
    pub id: String,
    pub chat_id: String,
    /// Raw content as received, before any dual-LLM substitution.
    pub content: String,
    /// Whether this content failed the trusted-data check.
    pub tainted: bool,
    pub taint_reason: Option<String>,
    pub created_at: i64,
}

/// A chat plus its interactions, ordered oldest first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatWithInteractions {
    pub chat: Chat,
    pub interactions: Vec<Interaction>,
}

// ═══════════════════════════════════════════════════════════════════════
//  ChatStore
// ═══════════════════════════════════════════════════════════════════════

/// Append-only repository for chats and interactions.
#[derive(Clone)]
pub struct ChatStore {
    db: Database,
}

impl ChatStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Create a new, empty chat.
    #[instrument(skip(self))]
    pub async fn create(&self) -> StoreResult<Chat> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().timestamp();

        let chat = Chat {
            id: id.clone(),
            created_at: now,
            updated_at: now,
        };

        self.db
            .execute(move |conn| {
                conn.execute(
                    "INSERT INTO chats (id, created_at, updated_at) VALUES (?1, ?2, ?2)",
                    rusqlite::params![id, now],
                )?;
                Ok(())
            })
            .await?;

        debug!(chat_id = %chat.id, "chat created");
        Ok(chat)
    }

    /// Does a chat with this id exist?
    #[instrument(skip(self))]
    pub async fn exists(&self, chat_id: &str) -> StoreResult<bool> {
        let chat_id = chat_id.to_string();
        self.db
            .execute(move |conn| {
                let count: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM chats WHERE id = ?1",
                    rusqlite::params![chat_id],
                    |row| row.get(0),
                )?;
                Ok(count > 0)
            })
            .await
    }

    /// List all chats, most recently updated first.
    #[instrument(skip(self))]
    pub async fn list(&self) -> StoreResult<Vec<Chat>> {
        self.db
            .execute(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, created_at, updated_at FROM chats ORDER BY updated_at DESC",
                )?;
                let rows = stmt
                    .query_map([], |row| {
                        Ok(Chat {
                            id: row.get(0)?,
                            created_at: row.get(1)?,
                            updated_at: row.get(2)?,
                        })
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
    }

    /// Fetch a chat and all of its interactions, oldest first.
    ///
    /// Returns [`StoreError::NotFound`] if the chat does not exist.
    #[instrument(skip(self))]
    pub async fn find_by_id(&self, chat_id: &str) -> StoreResult<ChatWithInteractions> {
        let id = chat_id.to_string();
        self.db
            .execute(move |conn| {
                let chat = conn
                    .query_row(
                        "SELECT id, created_at, updated_at FROM chats WHERE id = ?1",
                        rusqlite::params![id],
                        |row| {
                            Ok(Chat {
                                id: row.get(0)?,
                                created_at: row.get(1)?,
                                updated_at: row.get(2)?,
                            })
                        },
                    )
                    .map_err(|e| match e {
                        rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound {
                            entity: "chat",
                            id: id.clone(),
                        },
                        other => StoreError::Sqlite(other),
                    })?;

                let interactions = query_interactions(conn, &id)?;

                Ok(ChatWithInteractions { chat, interactions })
            })
            .await
    }

    /// Fetch only the interactions for a chat, oldest first.
    #[instrument(skip(self))]
    pub async fn find_interactions_by_chat_id(
        &self,
        chat_id: &str,
    ) -> StoreResult<Vec<Interaction>> {
        let id = chat_id.to_string();
        self.db.execute(move |conn| query_interactions(conn, &id)).await
    }

    /// Append an interaction to a chat's log and bump the chat's `updated_at`.
    #[instrument(skip(self, content, taint_reason))]
    pub async fn append_interaction(
        &self,
        chat_id: &str,
        content: &str,
        tainted: bool,
        taint_reason: Option<&str>,
    ) -> StoreResult<Interaction> {
        let id = Uuid::new_v4().to_string();
        let chat_id = chat_id.to_string();
        let content = content.to_string();
        let taint_reason = taint_reason.map(|s| s.to_string());
        let now = Utc::now().timestamp();

        let interaction = Interaction {
            id: id.clone(),
            chat_id: chat_id.clone(),
            content: content.clone(),
            tainted,
            taint_reason: taint_reason.clone(),
            created_at: now,
        };

        self.db
            .execute(move |conn| {
                conn.execute(
                    "INSERT INTO interactions (id, chat_id, content, tainted, taint_reason, created_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    rusqlite::params![id, chat_id, content, tainted, taint_reason, now],
                )?;
                conn.execute(
                    "UPDATE chats SET updated_at = ?2 WHERE id = ?1",
                    rusqlite::params![chat_id, now],
                )?;
                Ok(())
            })
            .await?;

        Ok(interaction)
    }
}

fn query_interactions(
    conn: &rusqlite::Connection,
    chat_id: &str,
) -> StoreResult<Vec<Interaction>> {
    let mut stmt = conn.prepare(
        "SELECT id, chat_id, content, tainted, taint_reason, created_at \
         FROM interactions WHERE chat_id = ?1 ORDER BY created_at ASC, id ASC",
    )?;
    let rows = stmt
        .query_map(rusqlite::params![chat_id], |row| {
            Ok(Interaction {
                id: row.get(0)?,
                chat_id: row.get(1)?,
                content: row.get(2)?,
                tainted: row.get(3)?,
                taint_reason: row.get(4)?,
                created_at: row.get(5)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
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
    async fn create_and_exists() {
        let store = ChatStore::new(setup_db().await);
        let chat = store.create().await.unwrap();
        assert!(store.exists(&chat.id).await.unwrap());
        assert!(!store.exists("missing").await.unwrap());
    }

    #[tokio::test]
    async fn find_by_id_missing_chat_is_not_found() {
        let store = ChatStore::new(setup_db().await);
        let result = store.find_by_id("missing").await;
        assert!(matches!(result, Err(StoreError::NotFound { entity: "chat", .. })));
    }

    #[tokio::test]
    async fn interactions_are_ordered_and_immutable() {
        let store = ChatStore::new(setup_db().await);
        let chat = store.create().await.unwrap();

        store
            .append_interaction(&chat.id, "tool result", true, Some("unknown tool"))
            .await
            .unwrap();
        store
            .append_interaction(&chat.id, "user message", false, None)
            .await
            .unwrap();
        store
            .append_interaction(&chat.id, "assistant reply", false, None)
            .await
            .unwrap();

        let fetched = store.find_by_id(&chat.id).await.unwrap();
        assert_eq!(fetched.interactions.len(), 3);
        assert_eq!(fetched.interactions[0].content, "tool result");
        assert!(fetched.interactions[0].tainted);
        assert_eq!(
            fetched.interactions[0].taint_reason.as_deref(),
            Some("unknown tool")
        );
        assert_eq!(fetched.interactions[2].content, "assistant reply");
        assert!(!fetched.interactions[2].tainted);
    }

    #[tokio::test]
    async fn list_chats_most_recently_updated_first() {
        let store = ChatStore::new(setup_db().await);
        let first = store.create().await.unwrap();
        let second = store.create().await.unwrap();

        store
            .append_interaction(&first.id, "bump", false, None)
            .await
            .unwrap();

        let chats = store.list().await.unwrap();
        assert_eq!(chats.len(), 2);
        assert!(chats.iter().any(|c| c.id == second.id));
    }

    #[tokio::test]
    async fn chat_delete_cascades_interactions() {
        let db = setup_db().await;
        let store = ChatStore::new(db.clone());
        let chat = store.create().await.unwrap();
        store
            .append_interaction(&chat.id, "hello", false, None)
            .await
            .unwrap();

        db.execute({
            let chat_id = chat.id.clone();
            move |conn| {
                conn.execute("DELETE FROM chats WHERE id = ?1", rusqlite::params![chat_id])?;
                Ok(())
            }
        })
        .await
        .unwrap();

        let remaining = store.find_interactions_by_chat_id(&chat.id).await.unwrap();
        assert!(remaining.is_empty());
    }
}
