//! The archestra guard proxy: a reverse proxy sitting between an
//! OpenAI-compatible client and an upstream LLM completion service,
//! enforcing tool-invocation policy, trusted-data taint analysis, and
//! dual-LLM quarantine sanitisation on every guarded turn.

pub mod agents_api;
pub mod api;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod server;
pub mod state;
pub mod wire;

pub use config::ProxyConfig;
pub use error::{ApiError, Result};
pub use server::ProxyServer;
pub use state::AppState;
