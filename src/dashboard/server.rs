//! Dashboard HTTP server with axum router and graceful shutdown.

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::error::DashboardError;
use super::handlers::{
    get_backends, get_events_sse, get_health, get_json_events_sse, get_search,
    get_session_export, get_session_messages, get_session_status, get_sessions, index,
    post_interrupt, post_resync, post_send,
};
use super::state::AppState;

/// Default port for the dashboard server.
pub const DEFAULT_PORT: u16 = 8765;

/// Configuration for the dashboard server.
#[derive(Debug, Clone)]
pub struct DashboardConfig {
    /// Port to listen on.
    pub port: u16,
    /// Host address to bind to.
    pub host: String,
    /// Whether to enable permissive CORS.
    pub cors_permissive: bool,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            host: "127.0.0.1".to_string(),
            cors_permissive: false,
        }
    }
}

/// Dashboard HTTP server.
#[derive(Debug)]
pub struct DashboardServer {
    config: DashboardConfig,
    state: AppState,
}

impl DashboardServer {
    /// Create a new dashboard server with default configuration.
    #[must_use]
    pub fn new(state: AppState) -> Self {
        Self {
            config: DashboardConfig::default(),
            state,
        }
    }

    /// Set the server configuration (builder pattern).
    #[must_use]
    pub fn with_config(mut self, config: DashboardConfig) -> Self {
        self.config = config;
        self
    }

    /// Get the server address as a string.
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.config.host, self.config.port)
    }

    /// Build the axum router with all routes.
    #[must_use]
    pub fn build_router(&self) -> Router {
        let router = Router::new()
            .route("/", get(index))
            .route("/events", get(get_events_sse))
            .route("/events/json", get(get_json_events_sse))
            .route("/sessions", get(get_sessions))
            .route("/sessions/:id/messages", get(get_session_messages))
            .route("/sessions/:id/status", get(get_session_status))
            .route("/sessions/:id/export", get(get_session_export))
            .route("/sessions/:id/send", post(post_send))
            .route("/sessions/:id/interrupt", post(post_interrupt))
            .route("/sessions/:id/resync", post(post_resync))
            .route("/search", get(get_search))
            .route("/backends", get(get_backends))
            .route("/health", get(get_health))
            .with_state(self.state.clone())
            .layer(TraceLayer::new_for_http());

        if self.config.cors_permissive {
            router.layer(CorsLayer::permissive())
        } else {
            router
        }
    }

    /// Run the server until the state's cancellation token fires.
    ///
    /// # Errors
    ///
    /// Returns [`DashboardError::BindError`] if the address is unavailable and
    /// [`DashboardError::ServerError`] if serving fails.
    pub async fn run(self) -> Result<(), DashboardError> {
        let address = self.address();
        let cancel = self.state.cancel.clone();
        let hub = Arc::clone(&self.state.hub);
        let app = self.build_router();

        let listener =
            TcpListener::bind(&address)
                .await
                .map_err(|source| DashboardError::BindError {
                    address: address.clone(),
                    source,
                })?;
        tracing::info!(address = %address, "Starting dashboard server");

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                cancel.cancelled().await;
                // Ends every open SSE stream so connections can drain.
                hub.clear();
                tracing::info!("Dashboard server shutting down gracefully");
            })
            .await
            .map_err(|e| DashboardError::ServerError(e.to_string()))
    }
}
