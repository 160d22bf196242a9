//! Protocol-keyed selection of device command services.

mod bindings;
mod protocol;
mod resolver;
mod service;

pub use bindings::{BindingError, ProtocolBindingRegistry, ProtocolBindingRegistryBuilder};
pub use protocol::DeviceProtocol;
pub use resolver::{CommandServiceResolver, ResolveError};
pub use service::{CommandError, CommandService, DeviceQuery};

#[cfg(test)]
pub(crate) mod testing {
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::{CommandError, CommandService, DeviceProtocol, DeviceQuery};

    /// Command service that only counts calls.
    pub struct StubService {
        protocol: DeviceProtocol,
        device_queries: AtomicUsize,
        channel_queries: AtomicUsize,
    }

    impl StubService {
        pub fn new(protocol: DeviceProtocol) -> Arc<Self> {
            Arc::new(Self {
                protocol,
                device_queries: AtomicUsize::new(0),
                channel_queries: AtomicUsize::new(0),
            })
        }

        pub fn device_queries(&self) -> usize {
            self.device_queries.load(Ordering::SeqCst)
        }

        pub fn channel_queries(&self) -> usize {
            self.channel_queries.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CommandService for StubService {
        fn protocol(&self) -> DeviceProtocol {
            self.protocol
        }

        async fn query_device(&self, _query: &DeviceQuery) -> Result<(), CommandError> {
            self.device_queries.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn query_channel(&self, _query: &DeviceQuery) -> Result<(), CommandError> {
            self.channel_queries.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }
}
