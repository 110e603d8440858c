use axum::{
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use opfeed_core::config::OpfeedConfig;
use opfeed_fanout::{Ingress, Registry};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Central shared state: passed as Arc<AppState> to all Axum handlers.
pub struct AppState {
    pub config: OpfeedConfig,
    /// Live viewer queues, shared with the broadcaster task.
    pub registry: Arc<Registry>,
    pub ingress: Ingress,
    /// Cancelled once on shutdown; every WS session watches a child token.
    pub shutdown: CancellationToken,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(
        config: OpfeedConfig,
        registry: Arc<Registry>,
        ingress: Ingress,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            config,
            registry,
            ingress,
            shutdown,
            started_at: Utc::now(),
        }
    }
}

/// Assemble the full Axum router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(crate::http::ui::ui_handler))
        .route("/health", get(crate::http::health::health_handler))
        .route("/ws", get(crate::ws::connection::ws_handler))
        .route("/post", post(crate::http::ingest::post_event))
        .route("/v1/events", post(crate::http::ingest::post_event))
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
