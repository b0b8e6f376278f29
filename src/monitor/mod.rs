//! Event monitor subsystem.
//!
//! Subscribes to the event collector of a remote session and turns each new
//! page of raw events into enriched [`Event`] batches. Enrichment consults
//! and updates an [`InventoryCache`](crate::inventory::InventoryCache).

/// Raw event enrichment.
pub mod enricher;
/// Enriched event records.
pub mod event;
/// The polling loop.
pub mod poller;
/// Monitor identity and lifecycle state.
pub mod state;
mod subscription;

pub use enricher::EventEnricher;
pub use event::Event;
pub use poller::EventMonitor;
pub use state::{MonitorId, MonitorState};
