//! # archestra-store
//!
//! Storage engine for the Archestra security proxy.
//!
//! Provides SQLite-backed persistence with WAL mode and mmap for the
//! proxy's policy configuration and conversation log:
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │  AgentStore   (agents, tools)            │
//! │  PolicyStore  (invocation/trusted-data)  │
//! │  ChatStore    (chats, interactions)      │
//! │  DualLlmStore (quarantine config/cache)  │
//! ├─────────────────────────────────────────┤
//! │  Database (rusqlite WAL + mmap)          │
//! │  Migrations (versioned, transactional)   │
//! └─────────────────────────────────────────┘
//! ```
//!
//! ## Quick start
//!
//! ```ignore
//! use archestra_store::{Database, AgentStore, PolicyStore, ChatStore};
//!
//! let db = Database::open_and_migrate("data/archestra.db").await?;
//! let agents = AgentStore::new(db.clone());
//! let policies = PolicyStore::new(db.clone());
//! let chats = ChatStore::new(db.clone());
//! ```

pub mod agent;
pub mod chat;
pub mod db;
pub mod dual_llm;
pub mod error;
pub mod migration;
pub mod policy;

// ── re-exports ───────────────────────────────────────────────────────

pub use agent::{Agent, AgentStore, Tool};
pub use chat::{Chat, ChatStore, ChatWithInteractions, Interaction};
pub use db::Database;
pub use dual_llm::{DualLlmConfig, DualLlmResult, DualLlmStore};
pub use error::{StoreError, StoreResult};
pub use policy::{PolicyAction, PolicyStore, ToolInvocationPolicy, TrustedDataPolicy};
