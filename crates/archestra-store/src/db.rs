//! Connection ownership and pragma tuning for the guard proxy's SQLite store.
//!
//! The proxy is a single process fronting one SQLite file shared by the
//! chat, agent, policy, and dual-LLM tables, so the pragmas below favor a
//! lone writer with many concurrent async readers over multi-process
//! write concurrency.

use std::path::Path;
use std::sync::{Arc, Mutex};

use rusqlite::Connection;
use tracing::{debug, info};

use crate::error::{StoreError, StoreResult};
use crate::migration;

/// Shared handle to the proxy's SQLite connection.
///
/// `rusqlite::Connection` is `!Sync`, so it lives behind a `Mutex`; every
/// query is dispatched through [`Database::execute`]/[`Database::execute_mut`]
/// onto `tokio::task::spawn_blocking` rather than held across an `.await`.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (or create) the database file at `path`, tuned for proxy workloads.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "opening store database");
        Self::from_connection(Connection::open(path)?)
    }

    /// Open an in-memory database. The proxy's test suite uses this
    /// exclusively; a real deployment always opens a file via [`Database::open`].
    pub fn open_in_memory() -> StoreResult<Self> {
        debug!("opening in-memory store database");
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> StoreResult<Self> {
        Self::apply_pragmas(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open the database and bring its schema up to date in one call — the
    /// path the CLI's `serve`/`migrate` commands and the HTTP server both take.
    pub async fn open_and_migrate(path: impl AsRef<Path> + Send + 'static) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        let db = tokio::task::spawn_blocking(move || Self::open(&path)).await??;
        db.run_migrations().await?;
        Ok(db)
    }

    /// Apply every pending schema migration in order. Safe to call repeatedly.
    pub async fn run_migrations(&self) -> StoreResult<()> {
        self.with_locked(migration::run_all).await
    }

    /// Run a read query or a small write against the connection.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let count: i64 = db.execute(|conn| {
    ///     let mut stmt = conn.prepare("SELECT count(*) FROM agents")?;
    ///     let count = stmt.query_row([], |row| row.get(0))?;
    ///     Ok(count)
    /// }).await?;
    /// ```
    pub async fn execute<F, T>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&Connection) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        self.with_locked(f).await
    }

    /// Run a closure needing `&mut Connection` — transactions and anything
    /// else `rusqlite` requires exclusive access for.
    pub async fn execute_mut<F, T>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&mut Connection) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut conn = lock_or_err(&conn)?;
            f(&mut conn)
        })
        .await?
    }

    async fn with_locked<F, T>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&Connection) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = lock_or_err(&conn)?;
            f(&conn)
        })
        .await?
    }

    /// Tune a fresh connection for a single writer with many async readers:
    /// WAL journaling, a 256 MiB mmap/cache budget, in-memory temp storage,
    /// enforced foreign keys (agents/tools/policies/chats all reference each
    /// other), and a busy timeout so a lock contested by `spawn_blocking`
    /// tasks waits instead of erroring.
    fn apply_pragmas(conn: &Connection) -> StoreResult<()> {
        debug!("applying SQLite pragmas");
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.pragma_update(None, "mmap_size", 268_435_456_i64)?;
        conn.pragma_update(None, "cache_size", -64_000_i32)?;
        conn.pragma_update(None, "temp_store", "MEMORY")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.pragma_update(None, "busy_timeout", 5_000_i32)?;
        info!("store pragmas applied (WAL, mmap 256MiB, cache 62MiB, fk enforcement on)");
        Ok(())
    }
}

fn lock_or_err(
    conn: &Arc<Mutex<Connection>>,
) -> StoreResult<std::sync::MutexGuard<'_, Connection>> {
    conn.lock()
        .map_err(|e| StoreError::TaskJoin(format!("store mutex poisoned: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn open_in_memory_works() {
        let db = Database::open_in_memory().unwrap();
        let version: String = db
            .execute(|conn| {
                let v: String = conn.query_row("SELECT sqlite_version()", [], |row| row.get(0))?;
                Ok(v)
            })
            .await
            .unwrap();
        assert!(!version.is_empty());
    }

    #[tokio::test]
    async fn foreign_keys_are_enforced() {
        let db = Database::open_in_memory().unwrap();
        let enforced: i64 = db
            .execute(|conn| {
                let v: i64 = conn.query_row("PRAGMA foreign_keys", [], |row| row.get(0))?;
                Ok(v)
            })
            .await
            .unwrap();
        assert_eq!(enforced, 1);
    }

    #[tokio::test]
    async fn migrations_run_on_fresh_db() {
        let db = Database::open_in_memory().unwrap();
        db.run_migrations().await.unwrap();

        let count: i64 = db
            .execute(|conn| {
                let c: i64 = conn.query_row("SELECT count(*) FROM agents", [], |row| row.get(0))?;
                Ok(c)
            })
            .await
            .unwrap();
        assert_eq!(count, 0);
    }
}
