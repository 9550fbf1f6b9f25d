// Shared infrastructure
pub mod config;
pub mod error;
pub mod metrics;
pub mod telemetry;

// Broadcast core
pub mod hub;

// Application layer
pub mod api;
pub mod server;
pub mod websocket;
