//! Handler registry.
//!
//! Handlers are registered during startup through [`HandlerRegistryBuilder`];
//! the built [`HandlerRegistry`] is immutable and shared without locking.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

/// A message processor guarded by a predicate.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Name used in logs and errors.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Whether this handler wants the message.
    fn accept(&self, topic: &str, payload: &str) -> bool;

    /// Process an accepted message.
    ///
    /// May block on I/O. Must tolerate concurrent calls for independent
    /// messages and redelivery of the same message.
    async fn handle(&self, payload: &str) -> anyhow::Result<()>;
}

/// A handler with its dispatch order.
#[derive(Clone)]
pub struct HandlerRegistration {
    handler: Arc<dyn MessageHandler>,
    order: i32,
}

impl HandlerRegistration {
    /// The registered handler.
    pub fn handler(&self) -> &Arc<dyn MessageHandler> {
        &self.handler
    }

    /// Dispatch order; lower runs first.
    pub fn order(&self) -> i32 {
        self.order
    }
}

impl std::fmt::Debug for HandlerRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistration")
            .field("handler", &self.handler.name())
            .field("order", &self.order)
            .finish()
    }
}

/// Collects registrations during startup.
#[derive(Debug, Default)]
pub struct HandlerRegistryBuilder {
    registrations: Vec<HandlerRegistration>,
}

impl HandlerRegistryBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler after every handler registered so far.
    ///
    /// The handler takes one past the highest order seen, saturating at
    /// `i32::MAX` where ties keep registration order.
    pub fn register(&mut self, handler: Arc<dyn MessageHandler>) -> &mut Self {
        let order = self
            .registrations
            .iter()
            .map(|registration| registration.order)
            .max()
            .map_or(0, |highest| highest.saturating_add(1));
        self.register_with_order(handler, order)
    }

    /// Register a handler at an explicit order.
    ///
    /// Registering the same handler instance again is a no-op.
    pub fn register_with_order(
        &mut self,
        handler: Arc<dyn MessageHandler>,
        order: i32,
    ) -> &mut Self {
        if self
            .registrations
            .iter()
            .any(|existing| same_handler(&existing.handler, &handler))
        {
            debug!(handler = handler.name(), "Handler already registered, ignoring");
            return self;
        }

        debug!(handler = handler.name(), order, "Registering message handler");
        self.registrations.push(HandlerRegistration { handler, order });
        self
    }

    /// Freeze the registrations into a registry.
    pub fn build(self) -> HandlerRegistry {
        let mut registrations = self.registrations;
        // Stable: equal orders keep registration order.
        registrations.sort_by_key(|registration| registration.order);

        info!(handlers = registrations.len(), "Message handler registry built");
        HandlerRegistry { registrations }
    }
}

fn same_handler(a: &Arc<dyn MessageHandler>, b: &Arc<dyn MessageHandler>) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}

/// Registrations in dispatch order. Read-only.
#[derive(Debug, Default)]
pub struct HandlerRegistry {
    registrations: Vec<HandlerRegistration>,
}

impl HandlerRegistry {
    /// Start collecting registrations.
    pub fn builder() -> HandlerRegistryBuilder {
        HandlerRegistryBuilder::new()
    }

    /// First registration accepting the message, with its index.
    pub fn find(&self, topic: &str, payload: &str) -> Option<(usize, &HandlerRegistration)> {
        self.registrations
            .iter()
            .enumerate()
            .find(|(_, registration)| registration.handler.accept(topic, payload))
    }

    /// Registrations in dispatch order.
    pub fn registrations(&self) -> &[HandlerRegistration] {
        &self.registrations
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    /// Check whether no handler is registered.
    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }
}
