//! CLI argument definitions.
//!
//! All `clap` structures live here so that `main.rs` stays focused on
//! dispatching subcommands.

use clap::{Parser, Subcommand};

/// archestra-proxy -- a security-enforcing reverse proxy for LLM tool use.
#[derive(Parser)]
#[command(
    name = "archestra-proxy",
    version,
    about = "Tool-invocation, trusted-data, and dual-LLM quarantine proxy for LLM completion APIs"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP proxy server.
    Serve {
        /// Address to bind the HTTP server to.
        #[arg(long)]
        bind: Option<String>,

        /// Port to listen on.
        #[arg(long, short)]
        port: Option<u16>,
    },

    /// Run pending store migrations and exit.
    Migrate,

    /// Manage agents and their tools.
    Agents {
        #[command(subcommand)]
        action: AgentAction,
    },

    /// Manage tool-invocation and trusted-data policies.
    Policies {
        #[command(subcommand)]
        action: PolicyAction,
    },
}

#[derive(Subcommand)]
pub enum AgentAction {
    /// List all agents.
    List,
    /// Create a new agent.
    Create {
        /// The agent's unique name.
        name: String,
    },
    /// Delete an agent and everything scoped to it.
    Delete {
        /// The agent id.
        id: String,
    },
}

#[derive(Subcommand)]
pub enum PolicyAction {
    /// List tool-invocation policies assigned to an agent for a tool.
    ListInvocation {
        /// The agent id.
        #[arg(long)]
        agent: String,
        /// The tool name.
        #[arg(long)]
        tool: String,
    },
    /// List trusted-data policies assigned to an agent for a tool.
    ListTrustedData {
        /// The agent id.
        #[arg(long)]
        agent: String,
        /// The tool name.
        #[arg(long)]
        tool: String,
    },
}
