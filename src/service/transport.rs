//! Command delivery to physical devices.
//!
//! The hub never talks to devices itself; forwarded commands are handed to
//! a [`DeviceTransport`]. [`LoggingTransport`] only records the request,
//! [`TcpDeviceTransport`] writes the command as one JSON line to the
//! device's registered address.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use crate::domain::DeviceAddress;
use crate::error::HubError;

/// Delivers a command payload to a device address.
#[async_trait]
pub trait DeviceTransport: Send + Sync + std::fmt::Debug {
    /// Pushes `command` to the device at `address`.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Delivery`] if the device could not be reached or
    /// the write failed.
    async fn push(&self, address: &DeviceAddress, command: &Value) -> Result<(), HubError>;
}

/// Transport that only logs forwarded commands.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingTransport;

#[async_trait]
impl DeviceTransport for LoggingTransport {
    async fn push(&self, address: &DeviceAddress, command: &Value) -> Result<(), HubError> {
        tracing::info!(%address, %command, "command accepted for delivery");
        Ok(())
    }
}

/// Transport that opens a TCP connection per command and writes it as a
/// single newline-terminated JSON document.
#[derive(Debug, Clone, Copy)]
pub struct TcpDeviceTransport {
    timeout: Duration,
}

impl TcpDeviceTransport {
    /// Creates a transport whose connect and write each time out after
    /// `timeout`.
    #[must_use]
    pub const fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl DeviceTransport for TcpDeviceTransport {
    async fn push(&self, address: &DeviceAddress, command: &Value) -> Result<(), HubError> {
        let mut payload = serde_json::to_vec(command)
            .map_err(|e| HubError::Delivery(format!("unencodable command: {e}")))?;
        payload.push(b'\n');

        let target = (address.host.as_str(), address.port);
        let mut stream = tokio::time::timeout(self.timeout, TcpStream::connect(target))
            .await
            .map_err(|_| HubError::Delivery(format!("connect to {address} timed out")))?
            .map_err(|e| HubError::Delivery(format!("connect to {address} failed: {e}")))?;

        tokio::time::timeout(self.timeout, async {
            stream.write_all(&payload).await?;
            stream.shutdown().await
        })
        .await
        .map_err(|_| HubError::Delivery(format!("write to {address} timed out")))?
        .map_err(|e| HubError::Delivery(format!("write to {address} failed: {e}")))?;

        tracing::info!(%address, bytes = payload.len(), "command delivered");
        Ok(())
    }
}

/// Which [`DeviceTransport`] the hub uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportKind {
    /// [`LoggingTransport`].
    #[default]
    Log,
    /// [`TcpDeviceTransport`].
    Tcp,
}

impl FromStr for TransportKind {
    type Err = HubError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "log" => Ok(Self::Log),
            "tcp" => Ok(Self::Tcp),
            other => Err(HubError::Config(format!(
                "unknown command transport {other:?} (expected \"log\" or \"tcp\")"
            ))),
        }
    }
}
