//! Device command service capability.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::protocol::DeviceProtocol;

/// Target of a device query command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceQuery {
    /// Device identifier
    pub device_id: String,
    /// Channel identifier, when the command targets one channel
    #[serde(default)]
    pub channel_id: Option<String>,
}

impl DeviceQuery {
    /// Query addressed to a whole device.
    pub fn device(device_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            channel_id: None,
        }
    }
}

/// Errors reported by a command service.
#[derive(Debug, Error)]
pub enum CommandError {
    /// The device is not known to the protocol stack.
    #[error("device '{0}' not found")]
    DeviceNotFound(String),

    /// The command could not be sent.
    #[error("command failed: {0}")]
    Failed(String),
}

/// Protocol-specific implementation of device commands.
///
/// The shape of each command belongs to the protocol collaborator; the
/// core only selects which implementation to use.
#[async_trait]
pub trait CommandService: Send + Sync {
    /// Protocol this service speaks.
    fn protocol(&self) -> DeviceProtocol;

    /// Ask the device to report its information.
    async fn query_device(&self, query: &DeviceQuery) -> Result<(), CommandError>;

    /// Ask the device to report its channel catalog.
    async fn query_channel(&self, query: &DeviceQuery) -> Result<(), CommandError>;
}
