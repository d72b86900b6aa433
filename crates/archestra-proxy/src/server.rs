//! Router assembly and HTTP listener startup.

use std::sync::Arc;

use axum::Router;
use axum::http::{HeaderValue, Method};
use axum::routing::{delete, get, post};
use tower_http::cors::CorsLayer;

use crate::agents_api;
use crate::api;
use crate::state::AppState;

/// The archestra guard proxy's HTTP server.
pub struct ProxyServer {
    state: Arc<AppState>,
}

impl ProxyServer {
    pub fn new(state: AppState) -> Self {
        Self {
            state: Arc::new(state),
        }
    }

    pub fn addr(&self) -> String {
        self.state.config.addr()
    }

    /// Build the request router. Exposed so integration tests can drive it
    /// with `tower::ServiceExt::oneshot` without binding a real socket.
    pub fn router(&self) -> Router {
        let cors = CorsLayer::new()
            .allow_origin("*".parse::<HeaderValue>().unwrap())
            .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
            .allow_headers(tower_http::cors::Any);

        Router::new()
            .route("/health", get(api::health))
            .route("/openapi.json", get(api::openapi))
            .route("/api/chats", get(api::list_chats).post(api::create_chat))
            .route("/api/chats/{id}", get(api::get_chat))
            .route(
                "/v1/{provider}/chat/completions",
                post(api::chat_completions),
            )
            .route("/v1/{provider}/models", get(api::list_models))
            .route(
                "/api/agents",
                get(agents_api::list_agents).post(agents_api::create_agent),
            )
            .route(
                "/api/agents/{id}",
                get(agents_api::get_agent)
                    .put(agents_api::update_agent)
                    .delete(agents_api::delete_agent),
            )
            .route(
                "/api/agents/{id}/tools",
                get(agents_api::list_tools).post(agents_api::create_tool),
            )
            .route("/api/tools/{id}", delete(agents_api::delete_tool))
            .route(
                "/api/policies/invocation",
                post(agents_api::create_invocation_policy),
            )
            .route(
                "/api/policies/invocation/{id}",
                delete(agents_api::delete_invocation_policy),
            )
            .route(
                "/api/agents/{id}/policies/invocation",
                post(agents_api::assign_invocation_policy),
            )
            .route(
                "/api/policies/trusted-data",
                post(agents_api::create_trusted_data_policy),
            )
            .route(
                "/api/policies/trusted-data/{id}",
                delete(agents_api::delete_trusted_data_policy),
            )
            .route(
                "/api/agents/{id}/policies/trusted-data",
                post(agents_api::assign_trusted_data_policy),
            )
            .layer(cors)
            .with_state(Arc::clone(&self.state))
    }

    /// Start the server and block until it is shut down.
    pub async fn start(self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let addr = self.addr();
        let router = self.router();

        tracing::info!(addr = %addr, "starting archestra proxy");

        let listener = tokio::net::TcpListener::bind(&addr).await?;
        axum::serve(listener, router).await?;

        Ok(())
    }
}
