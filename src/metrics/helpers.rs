//! Metrics helper structs for convenient metric recording

use prometheus::{Encoder, TextEncoder};

use super::{
    CONTROL_FRAMES_TOTAL, EVENTS_DROPPED_TOTAL, EVENTS_PUBLISHED_TOTAL, FAN_OUT_LATENCY,
    FRAMES_DELIVERED_TOTAL, PINGS_SENT_TOTAL, SESSIONS_ACTIVE, SESSIONS_CLOSED_TOTAL,
    SESSIONS_EVICTED_TOTAL, SESSIONS_OPENED_TOTAL, SESSION_DURATION,
};

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer).unwrap_or_default())
}

/// Metrics recorded by the hub handle and router
pub struct HubMetrics;

impl HubMetrics {
    pub fn record_published() {
        EVENTS_PUBLISHED_TOTAL.inc();
    }

    /// Record an event dropped before fan-out (`overload`, `serialization`, `closed`)
    pub fn record_dropped(reason: &str) {
        EVENTS_DROPPED_TOTAL.with_label_values(&[reason]).inc();
    }

    pub fn record_delivered(count: u64) {
        FRAMES_DELIVERED_TOTAL.inc_by(count);
    }

    pub fn record_evicted() {
        SESSIONS_EVICTED_TOTAL.inc();
    }

    pub fn observe_fan_out(seconds: f64) {
        FAN_OUT_LATENCY.observe(seconds);
    }

    pub fn set_active_sessions(count: i64) {
        SESSIONS_ACTIVE.set(count);
    }
}

/// Metrics recorded by session reader and writer loops
pub struct SessionMetrics;

impl SessionMetrics {
    pub fn record_opened() {
        SESSIONS_OPENED_TOTAL.inc();
    }

    pub fn record_closed(reason: &str, duration_secs: f64) {
        SESSIONS_CLOSED_TOTAL.with_label_values(&[reason]).inc();
        SESSION_DURATION
            .with_label_values(&[reason])
            .observe(duration_secs);
    }

    /// Record a client control frame (`subscribe`, `unsubscribe`, `unknown`)
    pub fn record_control(kind: &str) {
        CONTROL_FRAMES_TOTAL.with_label_values(&[kind]).inc();
    }

    pub fn record_ping() {
        PINGS_SENT_TOTAL.inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_includes_recorded_metrics() {
        HubMetrics::record_published();
        HubMetrics::record_dropped("overload");
        SessionMetrics::record_control("subscribe");

        let output = encode_metrics().unwrap();
        assert!(output.contains("taskboard_hub_events_published_total"));
        assert!(output.contains("taskboard_hub_events_dropped_total"));
        assert!(output.contains("reason=\"overload\""));
        assert!(output.contains("kind=\"subscribe\""));
    }
}
