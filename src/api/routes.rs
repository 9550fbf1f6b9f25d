use axum::{
    routing::{get, post},
    Router,
};

use crate::server::AppState;

use super::events::publish_event;
use super::health::{health, sessions, stats};
use super::metrics::prometheus_metrics;

pub fn api_routes() -> Router<AppState> {
    Router::new()
        // Health & Stats
        .route("/health", get(health))
        .route("/stats", get(stats))
        .route("/sessions", get(sessions))
        .route("/metrics", get(prometheus_metrics))
        // Publish surface for record mutation handlers
        .nest(
            "/api/v1",
            Router::new().route("/events", post(publish_event)),
        )
}
