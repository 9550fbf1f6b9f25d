//! API layer - HTTP endpoint handlers.

mod events;
mod health;
mod metrics;
mod routes;

pub use events::{publish_event, PublishEventRequest, PublishEventResponse};
pub use health::{health, sessions, stats, HealthResponse, SessionsResponse, StatsResponse};
pub use metrics::prometheus_metrics;
pub use routes::api_routes;
