//! Enriched event records.
//!
//! Events stay schemaless: the server defines hundreds of event types and the
//! monitor only touches a handful of fields. An [`Event`] is the server's
//! record after enrichment, with typed accessors for the fields consumers
//! commonly read.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::protocol::MoRef;

/// Field holding the server-side, possibly qualified, type tag.
pub const TYPE_TAG_FIELD: &str = "_typeName";

/// Field the enricher fills with the short event type name.
pub const EVENT_TYPE_FIELD: &str = "eventType";

/// Short event type for a type tag: its final path segment.
///
/// `vim.event.VmCreatedEvent` and `Vim::VmCreatedEvent` both map to
/// `VmCreatedEvent`.
#[must_use]
pub fn event_type_from_tag(tag: &str) -> &str {
    tag.rsplit([':', '.']).next().filter(|s| !s.is_empty()).unwrap_or(tag)
}

/// An event record delivered to consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Event(Map<String, Value>);

impl Event {
    pub(crate) fn from_map(map: Map<String, Value>) -> Self {
        Self(map)
    }

    /// Short event type, e.g. `VmPoweredOnEvent`.
    #[must_use]
    pub fn event_type(&self) -> Option<&str> {
        self.0.get(EVENT_TYPE_FIELD).and_then(Value::as_str)
    }

    /// Type tag as reported by the server.
    #[must_use]
    pub fn type_tag(&self) -> Option<&str> {
        self.0.get(TYPE_TAG_FIELD).and_then(Value::as_str)
    }

    /// Server-assigned event key.
    #[must_use]
    pub fn key(&self) -> Option<i64> {
        self.0.get("key").and_then(Value::as_i64)
    }

    /// Human-readable message, preferring the fully formatted one.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.0
            .get("fullFormattedMessage")
            .or_else(|| self.0.get("message"))
            .and_then(Value::as_str)
    }

    /// Server timestamp of the event.
    #[must_use]
    pub fn created_time(&self) -> Option<DateTime<Utc>> {
        let raw = self.0.get("createdTime")?.as_str()?;
        DateTime::parse_from_rfc3339(raw).ok().map(|t| t.with_timezone(&Utc))
    }

    /// The VM argument stored under `field` (`vm`, `sourceVm`, `srcTemplate`).
    #[must_use]
    pub fn vm_argument(&self, field: &str) -> Option<&Map<String, Value>> {
        self.0.get(field).and_then(Value::as_object)
    }

    /// Reference of the VM stored under `field`.
    #[must_use]
    pub fn vm_ref(&self, field: &str) -> Option<MoRef> {
        self.vm_argument(field)?.get("vm").and_then(MoRef::from_json)
    }

    /// Configured path of the VM under `field`, as annotated by enrichment.
    #[must_use]
    pub fn vm_path(&self, field: &str) -> Option<&str> {
        self.vm_argument(field)?.get("path").and_then(Value::as_str)
    }

    /// Configured UUID of the VM under `field`, as annotated by enrichment.
    #[must_use]
    pub fn vm_uuid(&self, field: &str) -> Option<&str> {
        self.vm_argument(field)?.get("uuid").and_then(Value::as_str)
    }

    /// Task name (`info.name`) of task events.
    #[must_use]
    pub fn task_name(&self) -> Option<&str> {
        self.0.get("info")?.get("name")?.as_str()
    }

    /// Task reference (`info.task`) of task events.
    #[must_use]
    pub fn task_ref(&self) -> Option<MoRef> {
        MoRef::from_json(self.0.get("info")?.get("task")?)
    }

    /// Raw field access.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// The underlying record.
    #[must_use]
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Consume the event, returning the record.
    #[must_use]
    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }
}
