//! REST + WebSocket surface for the UI. Handlers write through the store,
//! let the status service recompute and publish, then broadcast a change
//! event to WebSocket subscribers — in that order, so events never precede
//! the commit.

mod connections;
mod error;
mod logs;
mod members;
mod runtime;
mod trade_groups;
mod vlogs;
mod websocket;

pub use error::ProblemDetails;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    routing::{get, post},
    Router,
};
use tokio::sync::broadcast;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::config_feed::ConfigFeed;
use crate::connection_manager::ConnectionManager;
use crate::db::Database;
use crate::log_buffer::LogBuffer;
use crate::port_resolver::ResolvedPorts;
use crate::status::{RuntimeStatusMetrics, StatusService};

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
    pub connections: Arc<ConnectionManager>,
    pub status: Arc<StatusService>,
    pub feed: Arc<ConfigFeed>,
    pub events: broadcast::Sender<String>,
    pub log_buffer: LogBuffer,
    pub metrics: Arc<RuntimeStatusMetrics>,
    pub resolved_ports: Arc<ResolvedPorts>,
    pub config: Arc<Config>,
}

pub fn create_router(state: AppState) -> Router {
    let cors = if state.config.cors.disable {
        tracing::warn!("CORS restrictions are disabled; every origin is allowed");
        CorsLayer::permissive()
    } else {
        let origins: Vec<axum::http::HeaderValue> = state
            .config
            .cors
            .allowed_origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods([
                axum::http::Method::GET,
                axum::http::Method::POST,
                axum::http::Method::PUT,
                axum::http::Method::DELETE,
                axum::http::Method::OPTIONS,
            ])
            .allow_headers([axum::http::header::CONTENT_TYPE])
    };

    let timeout = TimeoutLayer::new(Duration::from_secs(
        state.config.server.request_timeout_secs,
    ));

    Router::new()
        .route("/api/connections", get(connections::list_connections))
        .route("/api/connections/:id", get(connections::get_connection))
        .route("/api/trade-groups", get(trade_groups::list_trade_groups))
        .route(
            "/api/trade-groups/:id",
            get(trade_groups::get_trade_group)
                .put(trade_groups::update_master_settings)
                .delete(trade_groups::delete_trade_group),
        )
        .route(
            "/api/trade-groups/:id/toggle",
            post(trade_groups::toggle_trade_group),
        )
        .route(
            "/api/trade-groups/:id/members",
            get(members::list_members).post(members::add_member),
        )
        .route(
            "/api/trade-groups/:id/members/:slave",
            get(members::get_member)
                .put(members::update_member)
                .delete(members::delete_member),
        )
        .route(
            "/api/trade-groups/:id/members/:slave/toggle",
            post(members::toggle_member),
        )
        .route(
            "/api/runtime-status-metrics",
            get(runtime::get_runtime_metrics),
        )
        .route("/api/runtime-ports", get(runtime::get_runtime_ports))
        .route("/api/logs", get(logs::get_logs))
        .route(
            "/api/vlogs-settings",
            get(vlogs::get_vlogs_settings).put(vlogs::update_vlogs_settings),
        )
        .route("/ws", get(websocket::websocket_handler))
        .layer(TraceLayer::new_for_http())
        .layer(timeout)
        .layer(cors)
        .with_state(state)
}
