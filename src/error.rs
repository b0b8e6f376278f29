//! Error types for vimevents.
//!
//! All errors are strongly typed using thiserror so the monitor loop can
//! dispatch on specific conditions (a receive timeout is not a fault, a fault
//! is not a malformed event) instead of unwinding through a generic error.

use thiserror::Error;

/// Boxed error produced by an event consumer.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors reported by a remote session.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    /// The connection stopped delivering data before the wait completed.
    #[error("Timed out receiving response from the management service")]
    ReceiveTimeout,

    /// An in-flight wait was cancelled.
    #[error("Wait for updates was cancelled")]
    Cancelled,

    /// The service rejected a call.
    #[error("{method} failed: {message}")]
    Fault {
        /// Remote method that failed.
        method: String,
        /// Fault text reported by the service.
        message: String,
    },

    /// The session is not connected.
    #[error("Session is not connected")]
    NotConnected,
}

impl SessionError {
    /// Creates a fault error for the named remote method.
    #[must_use]
    pub fn fault(method: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Fault {
            method: method.into(),
            message: message.into(),
        }
    }

    /// Returns true for the connection-timeout condition.
    #[must_use]
    pub const fn is_receive_timeout(&self) -> bool {
        matches!(self, Self::ReceiveTimeout)
    }
}

/// Errors raised by an inventory cache.
#[derive(Debug, Error)]
pub enum InventoryError {
    /// A thread panicked while holding the inventory lock.
    #[error("Inventory lock poisoned: {context}")]
    PoisonedLock {
        /// Operation that found the lock poisoned.
        context: &'static str,
    },

    /// The inventory source failed to deliver object state.
    #[error("Inventory source error: {message}")]
    Source {
        /// Description of the failure.
        message: String,
    },
}

/// Errors raised while enriching a raw event.
#[derive(Debug, Error)]
pub enum EnrichError {
    /// The value is not a structured event record.
    #[error("Unexpected event shape: expecting a record, got {found}")]
    UnexpectedShape {
        /// Kind of value found instead.
        found: &'static str,
    },

    /// The record carries no server-side type tag.
    #[error("Event record has no type tag")]
    MissingTypeTag,

    /// A cache operation failed.
    #[error("Inventory error: {0}")]
    Inventory(#[from] InventoryError),
}

/// Errors terminating an event monitoring session.
#[derive(Debug, Error)]
pub enum MonitorError {
    /// Collector or filter creation failed.
    #[error("Failed to establish event subscription: {0}")]
    Subscribe(#[source] SessionError),

    /// A receive timeout occurred and the session is no longer alive.
    #[error("Connection to the management service lost: {0}")]
    ConnectionLost(#[source] SessionError),

    /// Any other session failure while polling.
    #[error("Wait for updates failed: {0}")]
    Session(#[source] SessionError),

    /// A raw event could not be enriched.
    #[error("Event enrichment failed: {0}")]
    Enrich(#[from] EnrichError),

    /// The batch consumer returned an error.
    #[error("Event consumer failed: {0}")]
    Consumer(#[source] BoxError),

    /// `monitor_events` was called on a monitor that already ran.
    #[error("Event monitor already started")]
    AlreadyStarted,
}

impl MonitorError {
    /// Returns true if the session dropped its connection.
    #[must_use]
    pub const fn is_connection_lost(&self) -> bool {
        matches!(self, Self::ConnectionLost(_))
    }

    /// Returns true if the error came from the consumer callback.
    #[must_use]
    pub const fn is_consumer(&self) -> bool {
        matches!(self, Self::Consumer(_))
    }

    /// Returns true if a malformed event terminated the session.
    #[must_use]
    pub const fn is_malformed_event(&self) -> bool {
        matches!(
            self,
            Self::Enrich(EnrichError::UnexpectedShape { .. } | EnrichError::MissingTypeTag)
        )
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("Failed to read config file {path}: {source}")]
    Read {
        /// Path of the file.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The document is not valid TOML for this config.
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is out of range.
    #[error("Invalid value for '{field}': {reason}")]
    Invalid {
        /// Offending key.
        field: &'static str,
        /// Why it was rejected.
        reason: String,
    },
}

/// Top-level error type for vimevents.
#[derive(Debug, Error)]
pub enum VimError {
    /// Session error.
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// Inventory error.
    #[error("Inventory error: {0}")]
    Inventory(#[from] InventoryError),

    /// Monitor error.
    #[error("Monitor error: {0}")]
    Monitor(#[from] MonitorError),

    /// Configuration error.
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

impl VimError {
    /// Returns true if this is a configuration error.
    #[must_use]
    pub const fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }

    /// Returns true if retrying the operation may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Session(e) => e.is_receive_timeout(),
            _ => false,
        }
    }
}

/// Result type alias for vimevents operations.
pub type VimResult<T> = Result<T, VimError>;
