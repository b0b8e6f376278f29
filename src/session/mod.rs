//! Remote session contract.
//!
//! A session owns the connection to the management service: transport,
//! authentication and encoding live behind this trait. The monitor issues
//! calls from its polling thread and `cancel_wait_for_updates` from whatever
//! thread requests a stop, so implementations must be `Sync`.

mod scripted;

use std::time::Duration;

use crate::error::SessionError;
use crate::protocol::{EventFilterSpec, MoRef, PropertyFilterSpec, UpdateSet};

pub use scripted::{Script, ScriptStep, ScriptedSession, SessionCall};

/// Options for a single bounded wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitOptions {
    /// Longest time the server may hold the call open without new data.
    pub max_wait: Duration,
}

impl WaitOptions {
    /// Options bounding the wait to `max_wait`.
    #[must_use]
    pub const fn with_max_wait(max_wait: Duration) -> Self {
        Self { max_wait }
    }
}

/// Operations the event monitor needs from a management-service session.
pub trait RemoteSession: Send + Sync {
    /// Reference to the service's event manager.
    fn event_manager(&self) -> MoRef;

    /// Reference to the service's property collector.
    fn property_collector(&self) -> MoRef;

    /// Create an event history collector for events matching `filter`.
    fn create_event_collector(&self, event_manager: &MoRef, filter: &EventFilterSpec) -> Result<MoRef, SessionError>;

    /// Set how many events the collector's latest page holds.
    fn set_collector_page_size(&self, collector: &MoRef, page_size: u32) -> Result<(), SessionError>;

    /// Install a property filter, returning its handle.
    fn create_filter(
        &self,
        property_collector: &MoRef,
        spec: &PropertyFilterSpec,
        partial_updates: bool,
    ) -> Result<MoRef, SessionError>;

    /// Wait for changes newer than `version`.
    ///
    /// Returns `Ok(None)` when `options.max_wait` elapses without changes.
    /// A dropped connection surfaces as [`SessionError::ReceiveTimeout`].
    fn wait_for_updates(
        &self,
        property_collector: &MoRef,
        version: Option<&str>,
        options: &WaitOptions,
    ) -> Result<Option<UpdateSet>, SessionError>;

    /// Unblock an in-flight `wait_for_updates`.
    fn cancel_wait_for_updates(&self, property_collector: &MoRef) -> Result<(), SessionError>;

    /// Remove a filter installed with `create_filter`.
    fn destroy_filter(&self, filter: &MoRef) -> Result<(), SessionError>;

    /// Whether the session still has a live connection.
    fn is_alive(&self) -> bool;

    /// Close the connection.
    fn disconnect(&self) -> Result<(), SessionError>;
}
