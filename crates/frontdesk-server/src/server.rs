//! HTTP server assembly.

use axum::http::Method;
use axum::routing::{get, post};
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::api_admin;
use crate::api_audio;
use crate::api_webhooks;
use crate::media;
use crate::state::AppState;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub enable_cors: bool,
    pub enable_tracing: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            enable_cors: true,
            enable_tracing: true,
        }
    }
}

impl ServerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn socket_addr(&self) -> SocketAddr {
        format!("{}:{}", self.host, self.port)
            .parse()
            .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], self.port)))
    }
}

/// The reception agent's HTTP/websocket surface.
pub struct ReceptionServer {
    config: ServerConfig,
    state: Arc<AppState>,
}

impl ReceptionServer {
    pub fn new(config: ServerConfig, state: Arc<AppState>) -> Self {
        Self { config, state }
    }

    /// Build the router without binding. Integration tests drive this
    /// directly via `tower::ServiceExt`.
    pub fn build_router(&self) -> Router {
        let mut router = Router::new()
            // telephony surface
            .route("/incoming-call", post(api_webhooks::incoming_call))
            .route("/call-status", post(api_webhooks::call_status))
            .route("/media", get(media::media_stream))
            .route("/tts/{id}", get(api_audio::get_artifact))
            // admin surface
            .route("/health", get(api_admin::health))
            .route("/stats", get(api_admin::stats))
            .route(
                "/contacts",
                get(api_admin::list_contacts).post(api_admin::create_contact),
            )
            .route(
                "/contacts/{id}",
                get(api_admin::get_contact)
                    .put(api_admin::update_contact)
                    .delete(api_admin::delete_contact),
            )
            .route(
                "/emails",
                get(api_admin::list_emails).post(api_admin::create_email),
            )
            .route("/emails/import", post(api_admin::import_emails))
            .route(
                "/emails/{id}",
                get(api_admin::get_email).delete(api_admin::delete_email),
            )
            .route("/calls", get(api_admin::list_calls))
            .route("/calls/{id}", get(api_admin::get_call))
            .route(
                "/config/business",
                get(api_admin::get_business_identity).put(api_admin::put_business_identity),
            )
            .with_state(self.state.clone());

        if self.config.enable_tracing {
            router = router.layer(TraceLayer::new_for_http());
        }

        if self.config.enable_cors {
            let cors = CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
                .allow_headers(Any);
            router = router.layer(cors);
        }

        router
    }

    /// Bind and serve until the process exits.
    pub async fn start(self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let addr = self.config.socket_addr();
        info!("frontdesk listening on http://{}", addr);

        let router = self.build_router();
        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, router).await?;
        Ok(())
    }
}
