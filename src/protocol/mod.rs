//! Data shapes of the property-subscription protocol.
//!
//! These mirror what a management service exchanges with a subscriber: object
//! references, filter specifications and the incremental update sets returned
//! by a wait call. Encoding on the wire is the session's concern.

/// Event and property filter specifications.
pub mod filter;
/// Managed object references.
pub mod moref;
/// Update sets returned by wait calls.
pub mod update;

pub use filter::{EventFilterSpec, EntityFilter, ObjectSpec, PropertyFilterSpec, PropertySpec, Recursion};
pub use moref::MoRef;
pub use update::{ObjectUpdate, ObjectUpdateKind, PropertyChange, PropertyChangeOp, PropertyFilterUpdate, UpdateSet};

/// Name of the event collector property carrying the newest page of events.
pub const LATEST_PAGE: &str = "latestPage";
