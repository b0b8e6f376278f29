//! Monitor identity and lifecycle state.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for an event monitor, used in log fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MonitorId(Uuid);

impl MonitorId {
    /// Create a new random monitor id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for MonitorId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MonitorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Lifecycle of one monitoring run.
///
/// `Idle -> Subscribed -> Polling -> (Stopping | Failed) -> TornDown`.
/// A run that fails to subscribe goes from `Idle` to `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitorState {
    /// Constructed, not yet subscribed.
    Idle,
    /// Collector and filter installed.
    Subscribed,
    /// Inside the wait loop.
    Polling,
    /// A stop was requested.
    Stopping,
    /// The loop ended with an error.
    Failed,
    /// Filter destroyed and session disconnected.
    TornDown,
}

impl MonitorState {
    /// True while the monitor holds a subscription or is acquiring one.
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Subscribed | Self::Polling | Self::Stopping)
    }
}
