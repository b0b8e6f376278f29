use std::fmt;

use serde::{Deserialize, Serialize};

/// Reference to a managed object on the server.
///
/// `kind` is the server-side object type (`VirtualMachine`, `HostSystem`,
/// `PropertyFilter`, ...) and `value` the server-assigned identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MoRef {
    /// Server-side object type.
    #[serde(rename = "type")]
    pub kind: String,
    /// Server-assigned identifier.
    pub value: String,
}

impl MoRef {
    /// Reference to the object `value` of type `kind`.
    #[must_use]
    pub fn new(kind: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            value: value.into(),
        }
    }

    /// Shorthand for a `VirtualMachine` reference.
    #[must_use]
    pub fn vm(value: impl Into<String>) -> Self {
        Self::new("VirtualMachine", value)
    }

    /// Shorthand for a `HostSystem` reference.
    #[must_use]
    pub fn host(value: impl Into<String>) -> Self {
        Self::new("HostSystem", value)
    }

    /// Parses a reference out of a JSON value shaped `{"type": .., "value": ..}`.
    #[must_use]
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        let obj = value.as_object()?;
        let kind = obj.get("type")?.as_str()?;
        let value = obj.get("value")?.as_str()?;
        Some(Self::new(kind, value))
    }

    /// Inverse of [`MoRef::from_json`].
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({ "type": self.kind, "value": self.value })
    }
}

impl fmt::Display for MoRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_joins_kind_and_value() {
        assert_eq!(MoRef::vm("vm-42").to_string(), "VirtualMachine:vm-42");
    }

    #[test]
    fn from_json_requires_both_fields() {
        let ok = serde_json::json!({ "type": "HostSystem", "value": "host-7" });
        assert_eq!(MoRef::from_json(&ok), Some(MoRef::host("host-7")));

        let missing = serde_json::json!({ "type": "HostSystem" });
        assert_eq!(MoRef::from_json(&missing), None);
        assert_eq!(MoRef::from_json(&serde_json::json!("vm-1")), None);
    }

    #[test]
    fn serde_uses_type_key() {
        let json = serde_json::to_value(MoRef::vm("vm-1")).unwrap();
        assert_eq!(json, MoRef::vm("vm-1").to_json());
    }
}
