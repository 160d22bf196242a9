//! Protocol binding registry.

use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

use super::protocol::DeviceProtocol;
use super::service::CommandService;

/// Startup configuration errors while binding command services.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BindingError {
    /// A second service was bound to the same protocol.
    #[error("protocol {0} already has a command service bound")]
    Duplicate(DeviceProtocol),

    /// The service speaks a different protocol than it was bound to.
    #[error("command service for {actual} cannot be bound to {bound}")]
    Mismatch {
        bound: DeviceProtocol,
        actual: DeviceProtocol,
    },
}

/// Collects protocol bindings during startup.
#[derive(Default)]
pub struct ProtocolBindingRegistryBuilder {
    bindings: HashMap<DeviceProtocol, Arc<dyn CommandService>>,
}

impl ProtocolBindingRegistryBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `service` to `protocol`.
    pub fn bind(
        &mut self,
        protocol: DeviceProtocol,
        service: Arc<dyn CommandService>,
    ) -> Result<&mut Self, BindingError> {
        if service.protocol() != protocol {
            return Err(BindingError::Mismatch {
                bound: protocol,
                actual: service.protocol(),
            });
        }
        if self.bindings.contains_key(&protocol) {
            return Err(BindingError::Duplicate(protocol));
        }

        debug!(protocol = %protocol, "Binding command service");
        self.bindings.insert(protocol, service);
        Ok(self)
    }

    /// Freeze the bindings.
    pub fn build(self) -> ProtocolBindingRegistry {
        let mut bound: Vec<DeviceProtocol> = self.bindings.keys().copied().collect();
        bound.sort();
        info!(protocols = ?bound, "Protocol binding registry built");

        ProtocolBindingRegistry {
            bindings: self.bindings,
        }
    }
}

/// Immutable map from protocol to its command service.
#[derive(Default)]
pub struct ProtocolBindingRegistry {
    bindings: HashMap<DeviceProtocol, Arc<dyn CommandService>>,
}

impl ProtocolBindingRegistry {
    /// Start collecting bindings.
    pub fn builder() -> ProtocolBindingRegistryBuilder {
        ProtocolBindingRegistryBuilder::new()
    }

    /// The service bound to `protocol`.
    pub fn get(&self, protocol: DeviceProtocol) -> Option<&Arc<dyn CommandService>> {
        self.bindings.get(&protocol)
    }

    /// Whether `protocol` has a service.
    pub fn contains(&self, protocol: DeviceProtocol) -> bool {
        self.bindings.contains_key(&protocol)
    }

    /// Number of bound protocols.
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Check whether nothing is bound.
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::testing::StubService;

    #[test]
    fn test_bind_and_get() {
        let mut builder = ProtocolBindingRegistry::builder();
        builder
            .bind(DeviceProtocol::Gb28181, StubService::new(DeviceProtocol::Gb28181))
            .unwrap()
            .bind(DeviceProtocol::Onvif, StubService::new(DeviceProtocol::Onvif))
            .unwrap();
        let registry = builder.build();

        assert_eq!(registry.len(), 2);
        assert!(registry.contains(DeviceProtocol::Onvif));
        assert!(!registry.contains(DeviceProtocol::Rtsp));
        assert_eq!(
            registry.get(DeviceProtocol::Gb28181).unwrap().protocol(),
            DeviceProtocol::Gb28181
        );
    }

    #[test]
    fn test_duplicate_binding_is_rejected() {
        let mut builder = ProtocolBindingRegistry::builder();
        builder
            .bind(DeviceProtocol::Gb28181, StubService::new(DeviceProtocol::Gb28181))
            .unwrap();

        let result = builder
            .bind(DeviceProtocol::Gb28181, StubService::new(DeviceProtocol::Gb28181))
            .map(|_| ());
        assert_eq!(result, Err(BindingError::Duplicate(DeviceProtocol::Gb28181)));
    }

    #[test]
    fn test_mismatched_binding_is_rejected() {
        let mut builder = ProtocolBindingRegistry::builder();
        let result = builder
            .bind(DeviceProtocol::Rtsp, StubService::new(DeviceProtocol::Rtmp))
            .map(|_| ());
        assert_eq!(
            result,
            Err(BindingError::Mismatch {
                bound: DeviceProtocol::Rtsp,
                actual: DeviceProtocol::Rtmp,
            })
        );
    }
}
