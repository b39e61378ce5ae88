//! Type-safe device identifier.
//!
//! [`DeviceId`] is a newtype around the string the registering party
//! chooses for itself. The hub never generates device ids.

use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of a registered device.
///
/// Used as the key in [`super::DeviceRegistry`] and carried in every
/// device-scoped message and transition event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    /// Creates a `DeviceId` from any string-like value.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for DeviceId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for DeviceId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl Borrow<str> for DeviceId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn serializes_as_plain_string() {
        let id = DeviceId::from("thermostat-3");
        let Ok(json) = serde_json::to_string(&id) else {
            panic!("serialization failed");
        };
        assert_eq!(json, "\"thermostat-3\"");
    }

    #[test]
    fn hashmap_lookup_by_str() {
        use std::collections::HashMap;
        let mut map = HashMap::new();
        map.insert(DeviceId::from("a"), 1);
        assert_eq!(map.get("a"), Some(&1));
    }
}
