use axum::{extract::State, Json};
use serde::Serialize;

use crate::error::Result;
use crate::hub::{HubStatsSnapshot, SessionId};
use crate::server::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub hub: HubStatsSnapshot,
    pub session_queue_capacity: usize,
    pub router_queue_capacity: usize,
}

#[derive(Debug, Serialize)]
pub struct SessionsResponse {
    pub count: usize,
    pub sessions: Vec<SessionId>,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

pub async fn stats(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(StatsResponse {
        hub: state.hub.stats(),
        session_queue_capacity: state.settings.hub.session_queue_capacity,
        router_queue_capacity: state.settings.hub.router_queue_capacity,
    })
}

/// Ids of the sessions currently registered with the router.
/// Fails with 503 once the hub has shut down.
pub async fn sessions(State(state): State<AppState>) -> Result<Json<SessionsResponse>> {
    let sessions = state.hub.sessions().await?;
    Ok(Json(SessionsResponse {
        count: sessions.len(),
        sessions,
    }))
}
