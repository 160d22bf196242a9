//! Message routing from transport consumers to handlers.

mod dispatcher;
mod envelope;
mod registry;
mod transport;

pub use dispatcher::{DispatchError, DispatchOutcome, Dispatcher};
pub use envelope::{MessageEnvelope, Transport};
pub use registry::{HandlerRegistration, HandlerRegistry, HandlerRegistryBuilder, MessageHandler};
pub use transport::{
    delivery_channel, Acknowledgement, ConsumerStats, Delivery, TransportConsumer,
};

#[cfg(test)]
pub(crate) mod testing {
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::MessageHandler;

    enum Accepts {
        Always(bool),
        Topic(String),
    }

    /// Handler that records how often it ran.
    pub struct RecordingHandler {
        name: String,
        accepts: Accepts,
        fail: bool,
        calls: AtomicUsize,
        last_payload: Mutex<Option<String>>,
    }

    impl RecordingHandler {
        pub fn new(name: &str, accept: bool) -> Arc<Self> {
            Self::build(name, Accepts::Always(accept), false)
        }

        pub fn for_topic(name: &str, topic: &str) -> Arc<Self> {
            Self::build(name, Accepts::Topic(topic.to_string()), false)
        }

        pub fn failing(name: &str) -> Arc<Self> {
            Self::build(name, Accepts::Always(true), true)
        }

        fn build(name: &str, accepts: Accepts, fail: bool) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                accepts,
                fail,
                calls: AtomicUsize::new(0),
                last_payload: Mutex::new(None),
            })
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        pub fn last_payload(&self) -> Option<String> {
            self.last_payload.lock().clone()
        }
    }

    #[async_trait]
    impl MessageHandler for RecordingHandler {
        fn name(&self) -> &str {
            &self.name
        }

        fn accept(&self, topic: &str, _payload: &str) -> bool {
            match &self.accepts {
                Accepts::Always(accept) => *accept,
                Accepts::Topic(wanted) => wanted == topic,
            }
        }

        async fn handle(&self, payload: &str) -> anyhow::Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_payload.lock() = Some(payload.to_string());
            if self.fail {
                anyhow::bail!("{} failed on purpose", self.name);
            }
            Ok(())
        }
    }
}
