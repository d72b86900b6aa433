//! Schema migration system.
//!
//! Migrations are stored as static SQL strings keyed by version number.
//! The current version is tracked in a `_migrations` table so migrations
//! are idempotent and only run once.

use rusqlite::Connection;
use tracing::{debug, info, warn};

use crate::error::{StoreError, StoreResult};

/// A single migration definition.
struct Migration {
    /// Monotonically increasing version number (1, 2, 3, ...).
    version: u32,
    /// Human-readable description.
    description: &'static str,
    /// Raw SQL to execute. May contain multiple statements separated by `;`.
    sql: &'static str,
}

/// All migrations in order. Add new migrations to the end of this array.
static MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "initial schema — agents, tools, policies, chats, interactions",
        sql: r#"
            CREATE TABLE agents (
                id         TEXT PRIMARY KEY,
                name       TEXT NOT NULL UNIQUE,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );

            CREATE TABLE tools (
                id          TEXT PRIMARY KEY,
                agent_id    TEXT NOT NULL REFERENCES agents(id) ON DELETE CASCADE,
                name        TEXT NOT NULL UNIQUE,
                description TEXT,
                parameters  TEXT NOT NULL DEFAULT '{}'
            );
            CREATE INDEX idx_tools_agent ON tools(agent_id);

            CREATE TABLE tool_invocation_policies (
                id            TEXT PRIMARY KEY,
                tool_id       TEXT NOT NULL REFERENCES tools(id) ON DELETE CASCADE,
                description   TEXT NOT NULL,
                argument_name TEXT NOT NULL,
                operator      TEXT NOT NULL CHECK(operator IN ('equal','notEqual','contains','notContains','startsWith','endsWith','regex')),
                value         TEXT NOT NULL,
                action        TEXT NOT NULL CHECK(action IN ('allow','block')),
                block_prompt  TEXT,
                created_at    INTEGER NOT NULL
            );
            CREATE INDEX idx_tool_invocation_policies_tool ON tool_invocation_policies(tool_id);

            CREATE TABLE trusted_data_policies (
                id             TEXT PRIMARY KEY,
                tool_id        TEXT NOT NULL REFERENCES tools(id) ON DELETE CASCADE,
                description    TEXT NOT NULL,
                attribute_path TEXT NOT NULL,
                operator       TEXT NOT NULL CHECK(operator IN ('equal','notEqual','contains','notContains','startsWith','endsWith','regex')),
                value          TEXT NOT NULL,
                created_at     INTEGER NOT NULL
            );
            CREATE INDEX idx_trusted_data_policies_tool ON trusted_data_policies(tool_id);

            CREATE TABLE agent_tool_invocation_policies (
                agent_id  TEXT NOT NULL REFERENCES agents(id) ON DELETE CASCADE,
                policy_id TEXT NOT NULL REFERENCES tool_invocation_policies(id) ON DELETE CASCADE,
                PRIMARY KEY (agent_id, policy_id)
            );

            CREATE TABLE agent_trusted_data_policies (
                agent_id  TEXT NOT NULL REFERENCES agents(id) ON DELETE CASCADE,
                policy_id TEXT NOT NULL REFERENCES trusted_data_policies(id) ON DELETE CASCADE,
                PRIMARY KEY (agent_id, policy_id)
            );

            CREATE TABLE chats (
                id         TEXT PRIMARY KEY,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );

            CREATE TABLE interactions (
                id           TEXT PRIMARY KEY,
                chat_id      TEXT NOT NULL REFERENCES chats(id) ON DELETE CASCADE,
                content      TEXT NOT NULL,
                tainted      BOOLEAN NOT NULL DEFAULT 0,
                taint_reason TEXT,
                created_at   INTEGER NOT NULL
            );
            CREATE INDEX idx_interactions_chat ON interactions(chat_id);

            CREATE TABLE dual_llm_config (
                id                      TEXT PRIMARY KEY CHECK(id = 'default'),
                main_agent_prompt       TEXT NOT NULL,
                quarantined_agent_prompt TEXT NOT NULL,
                summary_prompt          TEXT NOT NULL,
                max_rounds              INTEGER NOT NULL CHECK(max_rounds >= 1)
            );

            CREATE TABLE dual_llm_results (
                agent_id      TEXT NOT NULL REFERENCES agents(id) ON DELETE CASCADE,
                tool_call_id  TEXT PRIMARY KEY,
                conversations TEXT NOT NULL,
                result        TEXT NOT NULL,
                created_at    INTEGER NOT NULL
            );
        "#,
    },
];

// ── public API ───────────────────────────────────────────────────────

/// Run all pending migrations against `conn`.
///
/// This is a **synchronous** function — call it from `spawn_blocking`.
pub fn run_all(conn: &Connection) -> StoreResult<()> {
    ensure_migrations_table(conn)?;

    let current = current_version(conn)?;
    let pending: Vec<&Migration> = MIGRATIONS.iter().filter(|m| m.version > current).collect();

    if pending.is_empty() {
        debug!(current_version = current, "database schema is up to date");
        return Ok(());
    }

    info!(
        current_version = current,
        pending = pending.len(),
        "running pending migrations"
    );

    for migration in pending {
        apply(conn, migration)?;
    }

    info!(
        new_version = MIGRATIONS.last().map(|m| m.version).unwrap_or(0),
        "all migrations applied"
    );
    Ok(())
}

/// Return the latest applied migration version, or 0 if none.
pub fn current_version(conn: &Connection) -> StoreResult<u32> {
    let version: u32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM _migrations",
            [],
            |row| row.get(0),
        )
        .map_err(|e| StoreError::Migration {
            version: 0,
            message: format!("failed to read current version: {e}"),
        })?;
    Ok(version)
}

// ── internals ────────────────────────────────────────────────────────

/// Create the `_migrations` bookkeeping table if it does not exist.
fn ensure_migrations_table(conn: &Connection) -> StoreResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version     INTEGER PRIMARY KEY,
            description TEXT NOT NULL,
            applied_at  INTEGER NOT NULL
        );",
    )
    .map_err(|e| StoreError::Migration {
        version: 0,
        message: format!("failed to create _migrations table: {e}"),
    })?;
    Ok(())
}

/// Apply a single migration inside a transaction.
fn apply(conn: &Connection, migration: &Migration) -> StoreResult<()> {
    info!(
        version = migration.version,
        description = migration.description,
        "applying migration"
    );

    // We cannot use `conn.transaction()` because that requires `&mut Connection`,
    // so we manage the transaction manually with SAVEPOINT.
    conn.execute_batch("BEGIN IMMEDIATE;")
        .map_err(|e| StoreError::Migration {
            version: migration.version,
            message: format!("failed to begin transaction: {e}"),
        })?;

    let result = (|| -> StoreResult<()> {
        conn.execute_batch(migration.sql)
            .map_err(|e| StoreError::Migration {
                version: migration.version,
                message: format!("SQL execution failed: {e}"),
            })?;

        let now = chrono::Utc::now().timestamp();
        conn.execute(
            "INSERT INTO _migrations (version, description, applied_at) VALUES (?1, ?2, ?3)",
            rusqlite::params![migration.version, migration.description, now],
        )
        .map_err(|e| StoreError::Migration {
            version: migration.version,
            message: format!("failed to record migration: {e}"),
        })?;

        Ok(())
    })();

    match &result {
        Ok(()) => {
            conn.execute_batch("COMMIT;")
                .map_err(|e| StoreError::Migration {
                    version: migration.version,
                    message: format!("failed to commit: {e}"),
                })?;
            info!(
                version = migration.version,
                "migration applied successfully"
            );
        }
        Err(err) => {
            warn!(version = migration.version, %err, "migration failed, rolling back");
            let _ = conn.execute_batch("ROLLBACK;");
        }
    }

    result
}

// ── tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn setup_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.pragma_update(None, "foreign_keys", "ON").unwrap();
        conn
    }

    #[test]
    fn migrations_are_ordered() {
        for window in MIGRATIONS.windows(2) {
            assert!(
                window[1].version > window[0].version,
                "migration versions must be strictly increasing: {} >= {}",
                window[0].version,
                window[1].version,
            );
        }
    }

    const LATEST_VERSION: u32 = 1;

    #[test]
    fn run_all_on_fresh_db() {
        let conn = setup_conn();
        run_all(&conn).unwrap();
        assert_eq!(current_version(&conn).unwrap(), LATEST_VERSION);
    }

    #[test]
    fn run_all_is_idempotent() {
        let conn = setup_conn();
        run_all(&conn).unwrap();
        run_all(&conn).unwrap();
        assert_eq!(current_version(&conn).unwrap(), LATEST_VERSION);
    }

    #[test]
    fn migrations_create_all_tables() {
        let conn = setup_conn();
        run_all(&conn).unwrap();

        let tables: Vec<String> = {
            let mut stmt = conn
                .prepare(
                    "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE '\\_%' ESCAPE '\\' ORDER BY name",
                )
                .unwrap();
            stmt.query_map([], |row| row.get(0))
                .unwrap()
                .map(|r| r.unwrap())
                .collect()
        };

        for expected in [
            "agents",
            "tools",
            "tool_invocation_policies",
            "trusted_data_policies",
            "agent_tool_invocation_policies",
            "agent_trusted_data_policies",
            "chats",
            "interactions",
            "dual_llm_config",
            "dual_llm_results",
        ] {
            assert!(tables.contains(&expected.to_string()), "missing table {expected}");
        }
    }

    #[test]
    fn tool_cascade_deletes_with_agent() {
        let conn = setup_conn();
        run_all(&conn).unwrap();

        conn.execute(
            "INSERT INTO agents (id, name, created_at, updated_at) VALUES ('a1','agent-1',0,0)",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO tools (id, agent_id, name, parameters) VALUES ('t1','a1','sendEmail','{}')",
            [],
        )
        .unwrap();

        conn.execute("DELETE FROM agents WHERE id = 'a1'", []).unwrap();

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM tools", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn invalid_operator_is_rejected_by_check_constraint() {
        let conn = setup_conn();
        run_all(&conn).unwrap();

        conn.execute(
            "INSERT INTO agents (id, name, created_at, updated_at) VALUES ('a1','agent-1',0,0)",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO tools (id, agent_id, name, parameters) VALUES ('t1','a1','sendEmail','{}')",
            [],
        )
        .unwrap();

        let result = conn.execute(
            "INSERT INTO tool_invocation_policies (id, tool_id, description, argument_name, operator, value, action, created_at) \
             VALUES ('p1','t1','d','to','bogus','x','block',0)",
            [],
        );
        assert!(result.is_err());
    }
}
