//! Prometheus metrics for the broadcast hub.
//!
//! - Session metrics (active sessions, opened/closed, lifetime)
//! - Event metrics (published, dropped by reason, frames delivered)
//! - Fan-out latency and evictions

mod helpers;

pub use helpers::{encode_metrics, HubMetrics, SessionMetrics};

use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_histogram_vec, register_int_counter, register_int_counter_vec,
    register_int_gauge, Histogram, HistogramVec, IntCounter, IntCounterVec, IntGauge,
};

/// Prefix for all metrics
const METRIC_PREFIX: &str = "taskboard_hub";

lazy_static! {
    // ============================================================================
    // Session Metrics
    // ============================================================================

    /// Sessions currently in the registry
    pub static ref SESSIONS_ACTIVE: IntGauge = register_int_gauge!(
        format!("{}_sessions_active", METRIC_PREFIX),
        "Number of sessions currently registered with the hub"
    ).unwrap();

    /// WebSocket sessions opened
    pub static ref SESSIONS_OPENED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_sessions_opened_total", METRIC_PREFIX),
        "Total sessions opened"
    ).unwrap();

    /// WebSocket sessions closed, by reason
    pub static ref SESSIONS_CLOSED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_sessions_closed_total", METRIC_PREFIX),
        "Total sessions closed",
        &["reason"]
    ).unwrap();

    /// Session lifetime
    pub static ref SESSION_DURATION: HistogramVec = register_histogram_vec!(
        format!("{}_session_duration_seconds", METRIC_PREFIX),
        "Session lifetime in seconds",
        &["reason"],
        vec![1.0, 10.0, 60.0, 300.0, 900.0, 3600.0, 14400.0]
    ).unwrap();

    /// Sessions evicted because their outbound queue was full
    pub static ref SESSIONS_EVICTED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_sessions_evicted_total", METRIC_PREFIX),
        "Total sessions evicted for falling behind"
    ).unwrap();

    /// Client control frames received, by kind
    pub static ref CONTROL_FRAMES_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_control_frames_total", METRIC_PREFIX),
        "Total client control frames received",
        &["kind"]
    ).unwrap();

    /// Liveness pings written
    pub static ref PINGS_SENT_TOTAL: IntCounter = register_int_counter!(
        format!("{}_pings_sent_total", METRIC_PREFIX),
        "Total liveness pings sent to clients"
    ).unwrap();

    // ============================================================================
    // Event Metrics
    // ============================================================================

    /// Events accepted by the router queue
    pub static ref EVENTS_PUBLISHED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_events_published_total", METRIC_PREFIX),
        "Total events accepted for fan-out"
    ).unwrap();

    /// Events dropped before fan-out, by reason
    pub static ref EVENTS_DROPPED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_events_dropped_total", METRIC_PREFIX),
        "Total events dropped before fan-out",
        &["reason"]
    ).unwrap();

    /// Frames enqueued onto session queues
    pub static ref FRAMES_DELIVERED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_frames_delivered_total", METRIC_PREFIX),
        "Total frames enqueued onto session queues"
    ).unwrap();

    /// Time spent fanning out one event
    pub static ref FAN_OUT_LATENCY: Histogram = register_histogram!(
        format!("{}_fan_out_latency_seconds", METRIC_PREFIX),
        "Fan-out latency in seconds",
        vec![0.00001, 0.00005, 0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05]
    ).unwrap();
}
