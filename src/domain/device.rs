//! Device entity and its wire representation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use utoipa::ToSchema;

use super::DeviceId;

/// Default port assumed when a registration omits one.
pub const DEFAULT_DEVICE_PORT: u16 = 80;

/// Liveness state of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceState {
    /// Seen within the offline threshold.
    Online,
    /// Silent for longer than the offline threshold, not yet evicted.
    Offline,
}

impl DeviceState {
    /// Returns `true` for [`DeviceState::Online`].
    #[must_use]
    pub const fn is_online(self) -> bool {
        matches!(self, Self::Online)
    }
}

/// Network location of a device, used only for command delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceAddress {
    /// Host name or IP address.
    pub host: String,
    /// TCP port.
    pub port: u16,
}

impl DeviceAddress {
    /// Creates a new address.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl std::fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// A named value exposed by a device.
///
/// Only `id` and `value` carry meaning for the hub. Any other attributes a
/// device declares (display name, type, range, unit) are kept verbatim and
/// echoed back to observers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Control {
    /// Control identifier, unique within its device. Numeric ids are
    /// accepted and kept in decimal form.
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    /// Current value.
    #[serde(default)]
    pub value: Value,
    /// Additional descriptive attributes.
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

impl Control {
    /// Creates a control with no extra attributes.
    #[must_use]
    pub fn new(id: impl Into<String>, value: Value) -> Self {
        Self {
            id: id.into(),
            value,
            attributes: Map::new(),
        }
    }
}

/// One registered endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct Device {
    /// Identifier chosen by the device.
    pub id: DeviceId,
    /// Display name.
    pub name: String,
    /// Where commands for this device are delivered.
    pub address: DeviceAddress,
    /// Ordered controls; ids are unique.
    pub controls: Vec<Control>,
    /// Most recent registration or heartbeat.
    pub last_seen: DateTime<Utc>,
    /// Current liveness state.
    pub state: DeviceState,
}

impl Device {
    /// Returns the control with the given id, if any.
    #[must_use]
    pub fn control(&self, control_id: &str) -> Option<&Control> {
        self.controls.iter().find(|c| c.id == control_id)
    }

    /// Builds the serialized form sent to observers.
    #[must_use]
    pub fn view(&self) -> DeviceView {
        DeviceView {
            device_id: self.id.clone(),
            name: self.name.clone(),
            ip_address: self.address.host.clone(),
            port: self.address.port,
            last_seen: unix_seconds(self.last_seen),
            controls: self.controls.clone(),
            vertices: Vec::new(),
            online: self.state.is_online(),
        }
    }
}

/// Wire representation of a device inside `device_list` messages and
/// REST responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct DeviceView {
    /// Device identifier.
    #[schema(value_type = String)]
    pub device_id: DeviceId,
    /// Display name.
    pub name: String,
    /// Host of the device.
    pub ip_address: String,
    /// Port of the device.
    pub port: u16,
    /// Last registration or heartbeat, in fractional unix seconds.
    pub last_seen: f64,
    /// Controls in declaration order.
    #[schema(value_type = Vec<Object>)]
    pub controls: Vec<Control>,
    /// Control links drawn by observers. The hub does not track links, so
    /// this is always empty.
    #[serde(default)]
    #[schema(value_type = Vec<Object>)]
    pub vertices: Vec<Value>,
    /// Whether the device is currently online.
    pub online: bool,
}

/// Deserializes an identifier sent either as a JSON string or a number.
pub(crate) fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected a string or number, got {other}"
        ))),
    }
}

/// Converts a timestamp to fractional unix seconds with millisecond precision.
#[must_use]
pub fn unix_seconds(at: DateTime<Utc>) -> f64 {
    at.timestamp_millis() as f64 / 1000.0
}

#[cfg(test)]
#[allow(clippy::panic, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn control_keeps_extra_attributes() {
        let raw = json!({"id": "power", "value": true, "type": "toggle", "name": "Power"});
        let Ok(control) = serde_json::from_value::<Control>(raw.clone()) else {
            panic!("control should deserialize");
        };
        assert_eq!(control.id, "power");
        assert_eq!(control.value, json!(true));
        assert_eq!(control.attributes.get("type"), Some(&json!("toggle")));

        let Ok(back) = serde_json::to_value(&control) else {
            panic!("control should serialize");
        };
        assert_eq!(back, raw);
    }

    #[test]
    fn numeric_control_id_is_accepted() {
        let Ok(control) = serde_json::from_value::<Control>(json!({"id": 7, "value": 1})) else {
            panic!("numeric id should deserialize");
        };
        assert_eq!(control.id, "7");
        assert!(serde_json::from_value::<Control>(json!({"id": [1]})).is_err());
    }

    #[test]
    fn control_value_defaults_to_null() {
        let Ok(control) = serde_json::from_value::<Control>(json!({"id": "knob"})) else {
            panic!("control should deserialize");
        };
        assert_eq!(control.value, Value::Null);
    }

    #[test]
    fn view_uses_wire_field_names() {
        let Some(at) = DateTime::from_timestamp(1_700_000_000, 500_000_000) else {
            panic!("valid timestamp");
        };
        let device = Device {
            id: DeviceId::from("d1"),
            name: "Lamp".to_string(),
            address: DeviceAddress::new("10.0.0.7", 8080),
            controls: vec![Control::new("power", json!(false))],
            last_seen: at,
            state: DeviceState::Offline,
        };
        let Ok(value) = serde_json::to_value(device.view()) else {
            panic!("view should serialize");
        };
        assert_eq!(value["device_id"], "d1");
        assert_eq!(value["ip_address"], "10.0.0.7");
        assert_eq!(value["port"], 8080);
        assert_eq!(value["last_seen"], json!(1_700_000_000.5));
        assert_eq!(value["online"], false);
        assert_eq!(value["controls"][0]["id"], "power");
        assert_eq!(value["vertices"], json!([]));
    }
}
