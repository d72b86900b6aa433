//! CLI entry point for the archestra guard proxy.
//!
//! `archestra-proxy serve` starts the HTTP proxy; `migrate`, `agents`, and
//! `policies` give local admin access to the store without the HTTP API.

mod cli;
mod helpers;

use clap::Parser;

use archestra_store::{AgentStore, ChatStore, Database, DualLlmStore, PolicyStore};
use cli::{AgentAction, Cli, Commands, PolicyAction};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    helpers::init_tracing("info");

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { bind, port } => cmd_serve(bind, port).await,
        Commands::Migrate => cmd_migrate().await,
        Commands::Agents { action } => cmd_agents(action).await,
        Commands::Policies { action } => cmd_policies(action).await,
    }
}

/// Resolve `ARCHESTRA_DATABASE_URL`/`DATABASE_URL` the same way
/// `ProxyConfig::from_env` does, so the CLI and server agree on where the
/// database lives.
fn database_url() -> anyhow::Result<String> {
    std::env::var("ARCHESTRA_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
        .map_err(|_| {
            anyhow::anyhow!(
                "Database URL is not set. Please set ARCHESTRA_DATABASE_URL or DATABASE_URL"
            )
        })
}

async fn open_database() -> anyhow::Result<Database> {
    let url = database_url()?;
    let db = Database::open_and_migrate(url).await?;
    Ok(db)
}

async fn cmd_serve(bind: Option<String>, port: Option<u16>) -> anyhow::Result<()> {
    let mut config = archestra_proxy::ProxyConfig::from_env().map_err(|e| anyhow::anyhow!(e))?;
    if let Some(bind) = bind {
        config.bind_addr = bind;
    }
    if let Some(port) = port {
        config.port = port;
    }

    let db = Database::open_and_migrate(config.database_url.clone()).await?;
    let chats = ChatStore::new(db.clone());
    let agents = AgentStore::new(db.clone());
    let policies = PolicyStore::new(db.clone());
    let dual_llm = DualLlmStore::new(db);

    let state = archestra_proxy::AppState::new(config, chats, agents, policies, dual_llm);
    let server = archestra_proxy::ProxyServer::new(state);

    server.start().await.map_err(|e| anyhow::anyhow!(e))?;
    Ok(())
}

async fn cmd_migrate() -> anyhow::Result<()> {
    let db = open_database().await?;
    db.run_migrations().await?;
    println!("migrations up to date");
    Ok(())
}

async fn cmd_agents(action: AgentAction) -> anyhow::Result<()> {
    let db = open_database().await?;
    let agents = AgentStore::new(db);

    match action {
        AgentAction::List => {
            for agent in agents.list_agents().await? {
                println!("{}\t{}", agent.id, agent.name);
            }
        }
        AgentAction::Create { name } => {
            let agent = agents.create_agent(&name).await?;
            println!("{}\t{}", agent.id, agent.name);
        }
        AgentAction::Delete { id } => {
            agents.delete_agent(&id).await?;
            println!("deleted {id}");
        }
    }
    Ok(())
}

async fn cmd_policies(action: PolicyAction) -> anyhow::Result<()> {
    let db = open_database().await?;
    let agents = AgentStore::new(db.clone());
    let policies = PolicyStore::new(db);

    match action {
        PolicyAction::ListInvocation { agent, tool } => {
            agents
                .get_tool_by_name(&tool)
                .await?
                .ok_or_else(|| anyhow::anyhow!("no such tool: {tool}"))?;
            for policy in policies
                .list_tool_invocation_policies_for_agent_and_tool(&agent, &tool)
                .await?
            {
                println!(
                    "{}\t{} {} {}\t{:?}",
                    policy.id, policy.argument_name, policy.operator, policy.value, policy.action
                );
            }
        }
        PolicyAction::ListTrustedData { agent, tool } => {
            agents
                .get_tool_by_name(&tool)
                .await?
                .ok_or_else(|| anyhow::anyhow!("no such tool: {tool}"))?;
            for policy in policies
                .list_trusted_data_policies_for_agent_and_tool(&agent, &tool)
                .await?
            {
                println!(
                    "{}\t{} {} {}",
                    policy.id, policy.attribute_path, policy.operator, policy.value
                );
            }
        }
    }
    Ok(())
}
