//! Monitor configuration.
//!
//! Configuration is accepted at construction time. It can be built in code or
//! loaded from a TOML document:
//!
//! ```toml
//! page_size = 250
//! max_wait_secs = 30
//!
//! [event_filter]
//! event_type_ids = ["VmCreatedEvent", "VmRemovedEvent"]
//! ```

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::protocol::EventFilterSpec;

/// Default number of events in the collector's latest page.
pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// Default upper bound, in seconds, for one wait call.
pub const DEFAULT_MAX_WAIT_SECS: u64 = 60;

/// Configuration for an [`EventMonitor`](crate::monitor::EventMonitor).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorConfig {
    /// Server-side event filter. Defaults to all events.
    pub event_filter: EventFilterSpec,
    /// Collector page size.
    pub page_size: u32,
    /// Maximum time one wait call may block without changes.
    pub max_wait: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            event_filter: EventFilterSpec::default(),
            page_size: DEFAULT_PAGE_SIZE,
            max_wait: Duration::from_secs(DEFAULT_MAX_WAIT_SECS),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ConfigFile {
    event_filter: EventFilterSpec,
    page_size: u32,
    max_wait_secs: u64,
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            event_filter: EventFilterSpec::default(),
            page_size: DEFAULT_PAGE_SIZE,
            max_wait_secs: DEFAULT_MAX_WAIT_SECS,
        }
    }
}

impl MonitorConfig {
    /// Replace the server-side event filter.
    #[must_use]
    pub fn with_event_filter(mut self, event_filter: EventFilterSpec) -> Self {
        self.event_filter = event_filter;
        self
    }

    /// Set the collector page size.
    #[must_use]
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    /// Set the per-wait time budget.
    #[must_use]
    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait;
        self
    }

    /// Parse and validate a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile = toml::from_str(s)?;
        let config = Self {
            event_filter: file.event_filter,
            page_size: file.page_size,
            max_wait: Duration::from_secs(file.max_wait_secs),
        };
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    /// Reject values the session cannot honor.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.page_size == 0 {
            return Err(ConfigError::Invalid {
                field: "page_size",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.max_wait < Duration::from_secs(1) {
            return Err(ConfigError::Invalid {
                field: "max_wait_secs",
                reason: "must be at least 1 second".to_string(),
            });
        }
        Ok(())
    }
}
