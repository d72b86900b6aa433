//! Shared application state for the proxy's Axum handlers.

use std::collections::HashMap;
use std::sync::Arc;

use archestra_llm::{LlmClient, LlmClientConfig, Provider};
use archestra_store::{AgentStore, ChatStore, DualLlmStore, PolicyStore};

use crate::config::ProxyConfig;

/// State accessible from every request handler.
#[derive(Clone)]
pub struct AppState {
    pub config: ProxyConfig,
    pub chats: Arc<ChatStore>,
    pub agents: Arc<AgentStore>,
    pub policies: Arc<PolicyStore>,
    pub dual_llm: Arc<DualLlmStore>,
    /// One configured client per supported upstream provider.
    pub llm_clients: Arc<HashMap<Provider, LlmClient>>,
}

impl AppState {
    pub fn new(
        config: ProxyConfig,
        chats: ChatStore,
        agents: AgentStore,
        policies: PolicyStore,
        dual_llm: DualLlmStore,
    ) -> Self {
        let mut llm_clients = HashMap::new();
        if let Some(key) = &config.openai_api_key {
            if let Ok(client) = LlmClient::new(LlmClientConfig::openai(
                key.clone(),
                config.openai_base_url.clone(),
                "gpt-4o",
            )) {
                llm_clients.insert(Provider::Openai, client);
            }
        }
        if let Some(key) = &config.anthropic_api_key {
            if let Ok(client) = LlmClient::new(LlmClientConfig::anthropic(
                key.clone(),
                "claude-sonnet-4-20250514",
            )) {
                llm_clients.insert(Provider::Anthropic, client);
            }
        }

        Self {
            config,
            chats: Arc::new(chats),
            agents: Arc::new(agents),
            policies: Arc::new(policies),
            dual_llm: Arc::new(dual_llm),
            llm_clients: Arc::new(llm_clients),
        }
    }

    pub fn llm_client(&self, provider: Provider) -> Option<&LlmClient> {
        self.llm_clients.get(&provider)
    }
}

pub fn parse_provider(raw: &str) -> Option<Provider> {
    match raw {
        "openai" => Some(Provider::Openai),
        "anthropic" => Some(Provider::Anthropic),
        _ => None,
    }
}
