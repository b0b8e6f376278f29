//! # vimevents - event monitoring for virtualization management services
//!
//! vimevents subscribes to the event stream of a management service,
//! long-polls for new pages of events and hands them to a consumer enriched
//! with inventory data (VM configuration path and UUID), keeping a local
//! inventory cache in step with VM lifecycle events as they arrive.
//!
//! ## Core Concepts
//!
//! - **RemoteSession**: connection to the service (collector, filter, wait, cancel)
//! - **InventoryCache**: VM lookup plus add/remove, held for a whole per-event pass
//! - **EventEnricher**: classifies events and applies cache side effects
//! - **EventMonitor**: subscription lifecycle and the polling loop
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use vimevents::{EventMonitor, Inventory, MonitorConfig};
//!
//! let inventory = Arc::new(Inventory::load(source)?);
//! let monitor = Arc::new(EventMonitor::new(MonitorConfig::default(), session, inventory)?);
//!
//! // From another thread: monitor.stop();
//! monitor.monitor_events(|batch| {
//!     for event in batch {
//!         println!("{}", event.event_type().unwrap_or("?"));
//!     }
//!     Ok::<_, std::convert::Infallible>(())
//! })?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod inventory;
pub mod monitor;
pub mod protocol;
pub mod session;

// Re-export primary types at crate root for convenience
pub use config::MonitorConfig;
pub use error::{
    BoxError, ConfigError, EnrichError, InventoryError, MonitorError, SessionError, VimError, VimResult,
};
pub use inventory::{HostRecord, Inventory, InventoryCache, InventorySource, VmCacheOps, VmRecord};
pub use monitor::{Event, EventEnricher, EventMonitor, MonitorId, MonitorState};
pub use protocol::{EventFilterSpec, MoRef, PropertyFilterSpec, UpdateSet};
pub use session::{RemoteSession, Script, ScriptStep, ScriptedSession, WaitOptions};
