//! Envelope dispatcher.

use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, warn};

use super::envelope::MessageEnvelope;
use super::registry::HandlerRegistry;

/// Terminal result of dispatching one envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The handler at this registry index processed the message
    Handled(usize),
    /// No handler accepted the message
    Unhandled,
}

/// Errors raised while dispatching.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The selected handler failed. It is not retried here.
    #[error("handler '{handler}' (index {index}) failed: {source}")]
    HandlerFailed {
        handler: String,
        index: usize,
        #[source]
        source: anyhow::Error,
    },
}

/// Routes envelopes to at most one handler.
///
/// Cheap to clone; clones share the same registry.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    registry: Arc<HandlerRegistry>,
}

impl Dispatcher {
    /// Create a dispatcher over a built registry.
    pub fn new(registry: Arc<HandlerRegistry>) -> Self {
        Self { registry }
    }

    /// The registry this dispatcher reads.
    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.registry
    }

    /// Invoke the first handler accepting the envelope.
    ///
    /// An unmatched envelope is logged and reported as `Unhandled`; it is not
    /// an error and is not retried or dead-lettered.
    pub async fn dispatch(
        &self,
        envelope: &MessageEnvelope,
    ) -> Result<DispatchOutcome, DispatchError> {
        let Some((index, registration)) = self.registry.find(envelope.topic(), envelope.payload())
        else {
            warn!(
                message_id = %envelope.id(),
                transport = %envelope.transport(),
                topic = %envelope.topic(),
                "No handler accepted message"
            );
            return Ok(DispatchOutcome::Unhandled);
        };

        let handler = registration.handler();
        debug!(
            message_id = %envelope.id(),
            topic = %envelope.topic(),
            handler = handler.name(),
            index,
            "Dispatching message"
        );

        handler.handle(envelope.payload()).await.map_err(|source| {
            error!(
                message_id = %envelope.id(),
                topic = %envelope.topic(),
                handler = handler.name(),
                error = %source,
                "Message handler failed"
            );
            DispatchError::HandlerFailed {
                handler: handler.name().to_string(),
                index,
                source,
            }
        })?;

        Ok(DispatchOutcome::Handled(index))
    }
}
