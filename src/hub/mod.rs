//! Real-time broadcast hub
//!
//! This module provides:
//! - The [`Hub`] handle used to publish events and manage sessions
//! - The [`HubRouter`] task, sole owner of the session registry
//! - The wire [`Envelope`] and session identities

mod envelope;
mod registry;
mod router;
mod stats;

use thiserror::Error;
use tokio::sync::mpsc;

pub use envelope::{Envelope, EventType, SessionId};
pub use router::{Hub, HubRouter};
pub use stats::{HubStats, HubStatsSnapshot};

/// Serialized envelope shared by every session receiving it
pub type Frame = axum::extract::ws::Utf8Bytes;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HubError {
    #[error("Hub is shut down")]
    Closed,
}

/// A freshly registered session: its identity plus the receiving end of its
/// outbound queue, drained by the session's writer loop.
#[derive(Debug)]
pub struct SessionRegistration {
    pub id: SessionId,
    pub receiver: mpsc::Receiver<Frame>,
}
