use serde::{Deserialize, Serialize};

use super::moref::MoRef;
use super::LATEST_PAGE;

/// Kind of change an object update describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectUpdateKind {
    /// The object entered the filter's scope.
    Enter,
    /// Properties of an object already in scope changed.
    Modify,
    /// The object left the filter's scope.
    Leave,
}

/// Operation applied to a property.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyChangeOp {
    /// An element was added to a collection property.
    Add,
    /// An element was removed from a collection property.
    Remove,
    /// The property was set to `val`.
    #[default]
    Assign,
    /// The property became unreachable through a removed parent.
    IndirectRemove,
}

/// A single changed property of an object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyChange {
    /// Property path, possibly indexed (`latestPage[3]`).
    pub name: String,
    /// How the property changed.
    #[serde(default)]
    pub op: PropertyChangeOp,
    /// New value, absent for removals.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub val: Option<serde_json::Value>,
}

impl PropertyChange {
    /// Creates an `assign` change.
    #[must_use]
    pub fn assign(name: impl Into<String>, val: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            op: PropertyChangeOp::Assign,
            val: Some(val),
        }
    }

    /// The event payload carried by this change, if it is a latest-page change.
    ///
    /// Names match by prefix since the server may report indexed sub-paths
    /// (`latestPage[12]`). A null value carries nothing.
    #[must_use]
    pub fn latest_page_value(&self) -> Option<&serde_json::Value> {
        if !self.name.starts_with(LATEST_PAGE) {
            return None;
        }
        self.val.as_ref().filter(|v| !v.is_null())
    }
}

/// Changes to one object covered by a filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectUpdate {
    /// Kind of update.
    pub kind: ObjectUpdateKind,
    /// The object that changed.
    pub obj: MoRef,
    /// Changed properties, in server order.
    #[serde(default)]
    pub change_set: Vec<PropertyChange>,
}

/// Updates reported for one installed filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyFilterUpdate {
    /// The filter these updates were reported for.
    pub filter: MoRef,
    /// Per-object updates.
    #[serde(default)]
    pub object_set: Vec<ObjectUpdate>,
}

/// Response of one wait call.
///
/// `version` is the cursor to pass to the next wait.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateSet {
    /// Cursor for the next wait.
    pub version: String,
    /// Per-filter updates.
    #[serde(default)]
    pub filter_set: Vec<PropertyFilterUpdate>,
}

impl UpdateSet {
    /// The object update carrying event data for `filter`, if any.
    ///
    /// Only the first filter update and its first object update are
    /// consulted. Sets reporting another filter, a non-`modify` kind or an
    /// empty change set yield nothing.
    #[must_use]
    pub fn event_update_for(&self, filter: &MoRef) -> Option<&ObjectUpdate> {
        let fu = self.filter_set.first()?;
        if &fu.filter != filter {
            return None;
        }
        let obj_update = fu.object_set.first()?;
        if obj_update.kind != ObjectUpdateKind::Modify || obj_update.change_set.is_empty() {
            return None;
        }
        Some(obj_update)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn filter() -> MoRef {
        MoRef::new("PropertyFilter", "session[1]filter-1")
    }

    fn update_set(filter: MoRef, kind: ObjectUpdateKind, changes: Vec<PropertyChange>) -> UpdateSet {
        UpdateSet {
            version: "1".to_string(),
            filter_set: vec![PropertyFilterUpdate {
                filter,
                object_set: vec![ObjectUpdate {
                    kind,
                    obj: MoRef::new("EventHistoryCollector", "c-1"),
                    change_set: changes,
                }],
            }],
        }
    }

    #[test]
    fn latest_page_value_matches_prefix() {
        let change = PropertyChange::assign("latestPage[3]", json!({ "key": 3 }));
        assert!(change.latest_page_value().is_some());

        let other = PropertyChange::assign("maxCount", json!(10));
        assert!(other.latest_page_value().is_none());
    }

    #[test]
    fn latest_page_value_skips_null_and_missing() {
        let null = PropertyChange::assign("latestPage", serde_json::Value::Null);
        assert!(null.latest_page_value().is_none());

        let missing = PropertyChange {
            name: "latestPage".to_string(),
            op: PropertyChangeOp::Remove,
            val: None,
        };
        assert!(missing.latest_page_value().is_none());
    }

    #[test]
    fn event_update_requires_matching_filter() {
        let set = update_set(
            MoRef::new("PropertyFilter", "someone-else"),
            ObjectUpdateKind::Modify,
            vec![PropertyChange::assign("latestPage", json!([]))],
        );
        assert!(set.event_update_for(&filter()).is_none());
    }

    #[test]
    fn event_update_requires_modify_kind() {
        for kind in [ObjectUpdateKind::Enter, ObjectUpdateKind::Leave] {
            let set = update_set(filter(), kind, vec![PropertyChange::assign("latestPage", json!([]))]);
            assert!(set.event_update_for(&filter()).is_none());
        }
    }

    #[test]
    fn event_update_requires_changes() {
        let set = update_set(filter(), ObjectUpdateKind::Modify, Vec::new());
        assert!(set.event_update_for(&filter()).is_none());

        let empty = UpdateSet {
            version: "2".to_string(),
            filter_set: Vec::new(),
        };
        assert!(empty.event_update_for(&filter()).is_none());
    }

    #[test]
    fn event_update_found_for_modify() {
        let set = update_set(
            filter(),
            ObjectUpdateKind::Modify,
            vec![PropertyChange::assign("latestPage", json!({ "key": 1 }))],
        );
        let update = set.event_update_for(&filter()).unwrap();
        assert_eq!(update.change_set.len(), 1);
    }

    #[test]
    fn update_set_deserializes_with_defaults() {
        let set: UpdateSet = serde_json::from_value(json!({
            "version": "7",
            "filter_set": [{
                "filter": { "type": "PropertyFilter", "value": "f" },
                "object_set": [{
                    "kind": "modify",
                    "obj": { "type": "EventHistoryCollector", "value": "c" },
                    "change_set": [{ "name": "latestPage", "val": { "key": 1 } }]
                }]
            }]
        }))
        .unwrap();
        let change = &set.filter_set[0].object_set[0].change_set[0];
        assert_eq!(change.op, PropertyChangeOp::Assign);
    }
}
