//! Wire messages: inbound decoding, validation, and outbound shapes.
//!
//! Every message is one flat JSON object discriminated by its
//! `message_type` field. Inbound frames are decoded leniently into
//! [`InboundMessage`] (every field optional) and then validated into a
//! typed [`Request`]; a message that fails validation never reaches the
//! registry.

use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::domain::device::string_or_number;
use crate::domain::{Control, DeviceId, DeviceView};
use crate::error::HubError;

/// One serialized outbound message, shared between all recipients.
pub type Frame = Arc<str>;

/// Loosely-typed inbound message as it arrives on the wire.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InboundMessage {
    /// Message type discriminator.
    #[serde(default)]
    pub message_type: Option<String>,
    /// Target or originating device. Numbers are accepted.
    #[serde(default, deserialize_with = "optional_id")]
    pub device_id: Option<String>,
    /// Display name (`register_device`).
    #[serde(default)]
    pub name: Option<String>,
    /// Device host (`register_device`).
    #[serde(default)]
    pub ip_address: Option<String>,
    /// Device port (`register_device`), as a number or numeric string.
    /// Checked during validation.
    #[serde(default)]
    pub port: Option<Value>,
    /// Declared controls (`register_device`).
    #[serde(default)]
    pub controls: Option<Vec<Control>>,
    /// Control to update (`control_update`). Numbers are accepted.
    #[serde(default, deserialize_with = "optional_id")]
    pub control_id: Option<String>,
    /// New control value (`control_update`).
    #[serde(default)]
    pub value: Option<Value>,
    /// Opaque command payload (`send_command`).
    #[serde(default)]
    pub command: Option<Value>,
}

/// Validated inbound request.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    /// Register or re-register a device.
    RegisterDevice {
        /// Device id.
        device_id: DeviceId,
        /// Display name, if provided.
        name: Option<String>,
        /// Device host.
        ip_address: String,
        /// Device port, if provided.
        port: Option<u16>,
        /// Declared controls.
        controls: Vec<Control>,
    },
    /// Liveness signal.
    Heartbeat {
        /// Device id.
        device_id: DeviceId,
    },
    /// Single control value write.
    ControlUpdate {
        /// Device id.
        device_id: DeviceId,
        /// Control id.
        control_id: String,
        /// New value.
        value: Value,
    },
    /// Ask for the full device list.
    GetDevices,
    /// Forward a command to a device.
    SendCommand {
        /// Device id.
        device_id: DeviceId,
        /// Opaque command payload.
        command: Value,
    },
}

impl Request {
    /// Returns the wire name of this request type.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::RegisterDevice { .. } => "register_device",
            Self::Heartbeat { .. } => "heartbeat",
            Self::ControlUpdate { .. } => "control_update",
            Self::GetDevices => "get_devices",
            Self::SendCommand { .. } => "send_command",
        }
    }
}

impl TryFrom<InboundMessage> for Request {
    type Error = HubError;

    fn try_from(msg: InboundMessage) -> Result<Self, Self::Error> {
        let kind = non_empty(msg.message_type)
            .ok_or_else(|| HubError::InvalidMessage("missing message_type".to_string()))?;

        match kind.as_str() {
            "register_device" => Ok(Self::RegisterDevice {
                device_id: required_id(msg.device_id, &kind)?,
                ip_address: required(msg.ip_address, "ip_address", &kind)?,
                name: non_empty(msg.name),
                port: port(msg.port, &kind)?,
                controls: msg.controls.unwrap_or_default(),
            }),
            "heartbeat" => Ok(Self::Heartbeat {
                device_id: required_id(msg.device_id, &kind)?,
            }),
            "control_update" => Ok(Self::ControlUpdate {
                device_id: required_id(msg.device_id, &kind)?,
                control_id: required(msg.control_id, "control_id", &kind)?,
                value: msg.value.ok_or_else(|| missing("value", &kind))?,
            }),
            "get_devices" => Ok(Self::GetDevices),
            "send_command" => Ok(Self::SendCommand {
                device_id: required_id(msg.device_id, &kind)?,
                command: msg
                    .command
                    .filter(|c| !c.is_null())
                    .ok_or_else(|| missing("command", &kind))?,
            }),
            other => Err(HubError::InvalidMessage(format!(
                "unknown message_type {other}"
            ))),
        }
    }
}

/// Decodes one frame into an [`InboundMessage`].
///
/// # Errors
///
/// Returns [`HubError::Parse`] if the frame is not a JSON object of the
/// expected shape.
pub fn decode_frame(text: &str) -> Result<InboundMessage, HubError> {
    Ok(serde_json::from_str(text)?)
}

/// Messages the hub sends to observers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "message_type", rename_all = "snake_case")]
pub enum OutboundMessage {
    /// Full device list.
    DeviceList {
        /// Devices in registration order.
        devices: Vec<DeviceView>,
    },
    /// Single device online/offline status.
    DeviceStatus {
        /// Device id.
        device_id: DeviceId,
        /// Whether the device is online.
        online: bool,
    },
    /// Single control value change.
    ControlUpdate {
        /// Device id.
        device_id: DeviceId,
        /// Control id.
        control_id: String,
        /// New value.
        value: Value,
    },
    /// Rejection notice, only sent when rejection replies are enabled.
    Error {
        /// Human-readable reason.
        error: String,
        /// Numeric error code.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        code: Option<u32>,
    },
}

impl OutboundMessage {
    /// Builds a rejection notice for `err`.
    #[must_use]
    pub fn rejection(err: &HubError) -> Self {
        Self::Error {
            error: err.to_string(),
            code: Some(err.error_code()),
        }
    }

    /// Serializes the message into a shareable frame.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Internal`] if serialization fails.
    pub fn encode(&self) -> Result<Frame, HubError> {
        serde_json::to_string(self)
            .map(Frame::from)
            .map_err(|e| HubError::Internal(format!("failed to encode outbound message: {e}")))
    }
}

fn optional_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(value) => string_or_number(value)
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

fn port(field: Option<Value>, kind: &str) -> Result<Option<u16>, HubError> {
    let parsed = match field {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Number(n)) => n.as_u64().and_then(|p| u16::try_from(p).ok()),
        Some(Value::String(s)) => s.trim().parse().ok(),
        Some(_) => None,
    };
    parsed
        .map(Some)
        .ok_or_else(|| HubError::InvalidMessage(format!("{kind} has an invalid port")))
}

fn non_empty(field: Option<String>) -> Option<String> {
    field.filter(|s| !s.is_empty())
}

fn missing(field: &str, kind: &str) -> HubError {
    HubError::InvalidMessage(format!("{kind} is missing {field}"))
}

fn required(field: Option<String>, name: &str, kind: &str) -> Result<String, HubError> {
    non_empty(field).ok_or_else(|| missing(name, kind))
}

fn required_id(field: Option<String>, kind: &str) -> Result<DeviceId, HubError> {
    required(field, "device_id", kind).map(DeviceId::from)
}
