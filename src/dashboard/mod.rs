//! Web dashboard: REST endpoints and the two live SSE feeds.

mod api;
mod error;
mod handlers;
mod server;
mod state;

pub use api::{
    BackendInfo, BackendsResponse, CommandResponse, ExportQuery, HealthResponse, MessagesResponse,
    SearchQuery, SendRequest, SessionsResponse,
};
pub use error::DashboardError;
pub use handlers::live_feed;
pub use server::{DashboardConfig, DashboardServer, DEFAULT_PORT};
pub use state::AppState;
