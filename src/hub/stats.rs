use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use serde::Serialize;

/// Counters shared between the hub handle and the router task
#[derive(Debug, Default)]
pub struct HubStats {
    /// Events accepted onto the router queue
    pub published: AtomicU64,
    /// Events dropped because the router queue was full
    pub dropped_overload: AtomicU64,
    /// Events dropped because they could not be serialized
    pub dropped_serialization: AtomicU64,
    /// Frames enqueued onto session queues
    pub frames_delivered: AtomicU64,
    /// Sessions disconnected because their queue was full
    pub sessions_evicted: AtomicU64,
    pub sessions_registered: AtomicU64,
    pub sessions_deregistered: AtomicU64,
    pub active_sessions: AtomicUsize,
}

impl HubStats {
    pub fn snapshot(&self) -> HubStatsSnapshot {
        HubStatsSnapshot {
            published: self.published.load(Ordering::Relaxed),
            dropped_overload: self.dropped_overload.load(Ordering::Relaxed),
            dropped_serialization: self.dropped_serialization.load(Ordering::Relaxed),
            frames_delivered: self.frames_delivered.load(Ordering::Relaxed),
            sessions_evicted: self.sessions_evicted.load(Ordering::Relaxed),
            sessions_registered: self.sessions_registered.load(Ordering::Relaxed),
            sessions_deregistered: self.sessions_deregistered.load(Ordering::Relaxed),
            active_sessions: self.active_sessions.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`HubStats`]
#[derive(Debug, Clone, Serialize)]
pub struct HubStatsSnapshot {
    pub published: u64,
    pub dropped_overload: u64,
    pub dropped_serialization: u64,
    pub frames_delivered: u64,
    pub sessions_evicted: u64,
    pub sessions_registered: u64,
    pub sessions_deregistered: u64,
    pub active_sessions: usize,
}
