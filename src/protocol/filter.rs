use serde::{Deserialize, Serialize};

use super::moref::MoRef;
use super::LATEST_PAGE;

/// How far below the filter entity events are collected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recursion {
    /// The entity and everything below it.
    #[default]
    All,
    /// Direct children of the entity only.
    Children,
    /// The entity itself only.
    SelfOnly,
}

/// Restricts collected events to those about one entity (and optionally its subtree).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityFilter {
    /// Entity the events must be about.
    pub entity: MoRef,
    /// How far below `entity` to look.
    #[serde(default)]
    pub recursion: Recursion,
}

/// Server-side filter for the event collector.
///
/// The default value matches every event. The monitor passes it through to
/// the session untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventFilterSpec {
    /// Event type names to collect (`VmCreatedEvent`, ...). Empty means all.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub event_type_ids: Vec<String>,
    /// Event categories (`info`, `warning`, `error`, `user`). Empty means all.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<String>,
    /// Entity restriction. `None` means events about any entity.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity: Option<EntityFilter>,
}

impl EventFilterSpec {
    /// Returns true if the filter places no restriction on collected events.
    #[must_use]
    pub fn is_all_events(&self) -> bool {
        self.event_type_ids.is_empty() && self.categories.is_empty() && self.entity.is_none()
    }
}

/// Which properties of an object type to watch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertySpec {
    /// Object type whose properties are watched.
    #[serde(rename = "type")]
    pub type_name: String,
    /// Watch every property, ignoring `path_set`.
    pub all: bool,
    /// Property paths to watch.
    pub path_set: Vec<String>,
}

/// An object the filter is anchored on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectSpec {
    /// The anchor object.
    pub obj: MoRef,
}

/// A property-subscription specification installed as a server-side filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyFilterSpec {
    /// Properties to watch, per object type.
    pub prop_set: Vec<PropertySpec>,
    /// Objects to watch them on.
    pub object_set: Vec<ObjectSpec>,
}

impl PropertyFilterSpec {
    /// Watches only the newest page of events on `collector`.
    #[must_use]
    pub fn latest_page(collector: &MoRef) -> Self {
        Self {
            prop_set: vec![PropertySpec {
                type_name: collector.kind.clone(),
                all: false,
                path_set: vec![LATEST_PAGE.to_string()],
            }],
            object_set: vec![ObjectSpec { obj: collector.clone() }],
        }
    }
}
