//! Command service resolution by protocol type.

use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use super::bindings::ProtocolBindingRegistry;
use super::protocol::DeviceProtocol;
use super::service::CommandService;

/// Errors raised when resolving a command service.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// The caller did not supply a usable protocol type.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// No command service handles this protocol type.
    #[error("protocol type {0} has no command service")]
    UnsupportedProtocol(i32),
}

/// Looks up the command service bound to a device's protocol.
///
/// Cheap to clone; clones share the same bindings.
#[derive(Clone)]
pub struct CommandServiceResolver {
    bindings: Arc<ProtocolBindingRegistry>,
}

impl CommandServiceResolver {
    /// Create a resolver over built bindings.
    pub fn new(bindings: Arc<ProtocolBindingRegistry>) -> Self {
        Self { bindings }
    }

    /// Resolve the service for a raw protocol type, as stored on a device record.
    pub fn resolve(
        &self,
        protocol_type: Option<i32>,
    ) -> Result<Arc<dyn CommandService>, ResolveError> {
        let protocol_type = protocol_type.ok_or_else(|| {
            ResolveError::InvalidArgument("protocol type must not be empty".to_string())
        })?;

        let protocol = DeviceProtocol::from_type(protocol_type).ok_or_else(|| {
            warn!(protocol_type, "Unknown device protocol type");
            ResolveError::UnsupportedProtocol(protocol_type)
        })?;

        self.resolve_protocol(protocol)
    }

    /// Resolve the service for a known protocol.
    pub fn resolve_protocol(
        &self,
        protocol: DeviceProtocol,
    ) -> Result<Arc<dyn CommandService>, ResolveError> {
        match self.bindings.get(protocol) {
            Some(service) => {
                debug!(protocol = %protocol, "Resolved command service");
                Ok(Arc::clone(service))
            }
            None => {
                warn!(protocol = %protocol, "No command service bound for protocol");
                Err(ResolveError::UnsupportedProtocol(protocol.type_id()))
            }
        }
    }
}
