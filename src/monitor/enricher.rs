//! Event enrichment.
//!
//! Turns a raw event value from a latest-page change into an [`Event`]:
//! normalizes the type name, annotates VM arguments with their configured
//! path and UUID from the inventory cache, and keeps the cache in step with
//! VM lifecycle events.

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{error, warn};

use crate::error::{EnrichError, InventoryError};
use crate::inventory::{InventoryCache, VmCacheOps};
use crate::protocol::MoRef;

use super::event::{event_type_from_tag, Event, EVENT_TYPE_FIELD, TYPE_TAG_FIELD};

/// Event fields that may carry a VM argument.
pub const VM_FIELDS: [&str; 3] = ["vm", "sourceVm", "srcTemplate"];

/// Events after which the referenced VMs are added to the cache.
pub const CREATION_EVENTS: [&str; 4] = ["VmCreatedEvent", "VmClonedEvent", "VmDeployedEvent", "VmRegisteredEvent"];

/// Events after which the primary VM's cached snapshot is stale.
pub const RELOCATION_EVENTS: [&str; 4] = [
    "VmRelocatedEvent",
    "VmMigratedEvent",
    "DrsVmMigratedEvent",
    "VmResourcePoolMovedEvent",
];

const REMOVAL_EVENT: &str = "VmRemovedEvent";
const TASK_EVENT: &str = "TaskEvent";
const MARK_AS_VM_TASK: &str = "MarkAsVirtualMachine";

/// Short name of a JSON value's kind, for diagnostics.
fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn log_unexpected_shape(value: &Value) {
    error!(found = kind_name(value), "expecting an event record");
    if let Value::Array(items) = value {
        for (index, item) in items.iter().enumerate() {
            error!(index, kind = kind_name(item), value = %item, "unexpected event element");
        }
    } else {
        error!(value = %value, "unexpected event value");
    }
}

fn needs_refresh(event_type: &str, record: &Map<String, Value>) -> bool {
    if RELOCATION_EVENTS.contains(&event_type) {
        return true;
    }
    event_type == TASK_EVENT
        && record
            .get("info")
            .and_then(|info| info.get("name"))
            .and_then(Value::as_str)
            == Some(MARK_AS_VM_TASK)
}

/// Annotate each VM argument of `record` from the cache, adding VMs first
/// for creation events and removing them afterwards for removal events.
fn annotate_vm_arguments(
    record: &mut Map<String, Value>,
    vms: &mut dyn VmCacheOps,
    creates: bool,
    removes: bool,
) -> Result<(), InventoryError> {
    for field in VM_FIELDS {
        let Some(Value::Object(arg)) = record.get_mut(field) else {
            continue;
        };
        let Some(vm) = arg.get("vm").and_then(MoRef::from_json) else {
            continue;
        };

        if creates {
            vms.add(&vm)?;
        }
        let Some(cached) = vms.get(&vm)? else {
            continue;
        };

        let uuid = cached.uuid().map(str::to_string);
        arg.insert("path".to_string(), cached.path_name.map_or(Value::Null, Value::String));
        arg.insert("uuid".to_string(), uuid.map_or(Value::Null, Value::String));

        if removes {
            vms.remove(&vm)?;
        }
    }
    Ok(())
}

/// Enriches raw events against an inventory cache.
pub struct EventEnricher {
    cache: Arc<dyn InventoryCache>,
}

impl std::fmt::Debug for EventEnricher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventEnricher").finish_non_exhaustive()
    }
}

impl EventEnricher {
    /// Create an enricher over `cache`.
    #[must_use]
    pub fn new(cache: Arc<dyn InventoryCache>) -> Self {
        Self { cache }
    }

    /// Enrich one raw event.
    ///
    /// For each VM argument: creation events add the VM to the cache before
    /// the lookup, cached VMs get `path` and `uuid` set, and a removal event
    /// drops the VM only after it was annotated. That pass runs under one
    /// cache acquisition. Relocation-class events and the
    /// `MarkAsVirtualMachine` task then re-add the primary VM, in a second
    /// acquisition, so the cache reflects its new placement.
    ///
    /// # Errors
    /// - `UnexpectedShape` if `raw` is not a record
    /// - `MissingTypeTag` if the record has no string type tag
    /// - `Inventory` if a cache call fails
    pub fn enrich(&self, raw: Value) -> Result<Event, EnrichError> {
        let mut record = match raw {
            Value::Object(map) => map,
            other => {
                log_unexpected_shape(&other);
                return Err(EnrichError::UnexpectedShape {
                    found: kind_name(&other),
                });
            }
        };

        let Some(tag) = record.get(TYPE_TAG_FIELD).and_then(Value::as_str) else {
            error!(record = ?record, "event record has no type tag");
            return Err(EnrichError::MissingTypeTag);
        };
        let event_type = event_type_from_tag(tag).to_string();
        record.insert(EVENT_TYPE_FIELD.to_string(), Value::String(event_type.clone()));

        let creates = CREATION_EVENTS.contains(&event_type.as_str());
        let removes = event_type == REMOVAL_EVENT;

        self.cache
            .with_vms(&mut |vms: &mut dyn VmCacheOps| annotate_vm_arguments(&mut record, vms, creates, removes))?;

        if needs_refresh(&event_type, &record) {
            let primary = record
                .get("vm")
                .and_then(|arg| arg.get("vm"))
                .and_then(MoRef::from_json);
            match primary {
                Some(vm) => self.cache.with_vms(&mut |vms: &mut dyn VmCacheOps| {
                    vms.remove(&vm)?;
                    vms.add(&vm)
                })?,
                None => warn!(event_type = %event_type, "relocation event without a vm reference"),
            }
        }

        Ok(Event::from_map(record))
    }
}
