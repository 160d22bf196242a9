//! Transport consumers.
//!
//! Each consumer owns one inbound channel (a direct queue or a topic
//! subscription), turns native deliveries into [`MessageEnvelope`]s, hands
//! them to the shared [`Dispatcher`] and settles the delivery.

use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, info, warn};

use super::dispatcher::{DispatchOutcome, Dispatcher};
use super::envelope::{MessageEnvelope, Transport};

/// How a delivery is settled with its transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acknowledgement {
    /// Processed (or deliberately unrouted); remove it
    Ack,
    /// Put it back for redelivery
    Requeue,
    /// Drop it for good
    Reject,
}

/// A message as delivered by a transport, before normalization.
#[derive(Debug)]
pub struct Delivery {
    topic: Option<String>,
    payload: String,
    redelivered: bool,
    settlement: Option<oneshot::Sender<Acknowledgement>>,
}

impl Delivery {
    /// A first delivery of `payload`.
    pub fn new(payload: impl Into<String>) -> Self {
        Self {
            topic: None,
            payload: payload.into(),
            redelivered: false,
            settlement: None,
        }
    }

    /// Set the routing topic carried by the delivery.
    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    /// Mark the delivery as a redelivery.
    pub fn redelivered(mut self) -> Self {
        self.redelivered = true;
        self
    }

    /// Ask to be told how the delivery was settled.
    pub fn with_settlement(mut self) -> (Self, oneshot::Receiver<Acknowledgement>) {
        let (tx, rx) = oneshot::channel();
        self.settlement = Some(tx);
        (self, rx)
    }

    /// Whether the transport already delivered this message before.
    pub fn is_redelivered(&self) -> bool {
        self.redelivered
    }

    fn settle(self, ack: Acknowledgement) {
        if let Some(tx) = self.settlement {
            // The producer may have stopped listening.
            let _ = tx.send(ack);
        }
    }
}

/// Counts kept by a consumer over its lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumerStats {
    pub handled: u64,
    pub unhandled: u64,
    pub failed: u64,
    pub skipped: u64,
}

/// Create the channel feeding a consumer.
pub fn delivery_channel(capacity: usize) -> (mpsc::Sender<Delivery>, mpsc::Receiver<Delivery>) {
    mpsc::channel(capacity)
}

/// Consumes one transport source and dispatches its deliveries.
pub struct TransportConsumer {
    transport: Transport,
    source: String,
    dispatcher: Dispatcher,
    receiver: mpsc::Receiver<Delivery>,
    stats: ConsumerStats,
}

impl TransportConsumer {
    /// Consumer for a direct queue; the queue name is the topic of every message.
    pub fn direct_queue(
        queue: impl Into<String>,
        dispatcher: Dispatcher,
        receiver: mpsc::Receiver<Delivery>,
    ) -> Self {
        Self::new(Transport::DirectQueue, queue.into(), dispatcher, receiver)
    }

    /// Consumer for a topic subscription.
    pub fn topic(
        subscription: impl Into<String>,
        dispatcher: Dispatcher,
        receiver: mpsc::Receiver<Delivery>,
    ) -> Self {
        Self::new(Transport::Topic, subscription.into(), dispatcher, receiver)
    }

    fn new(
        transport: Transport,
        source: String,
        dispatcher: Dispatcher,
        receiver: mpsc::Receiver<Delivery>,
    ) -> Self {
        Self {
            transport,
            source,
            dispatcher,
            receiver,
            stats: ConsumerStats::default(),
        }
    }

    /// Name of the queue or subscription consumed.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Build the envelope for a delivery.
    pub fn normalize(&self, delivery: &Delivery) -> MessageEnvelope {
        let topic = match self.transport {
            Transport::DirectQueue => self.source.as_str(),
            Transport::Topic => delivery.topic.as_deref().unwrap_or(&self.source),
        };
        MessageEnvelope::new(self.transport, topic, delivery.payload.as_str())
    }

    /// Dispatch one delivery and settle it.
    pub async fn process(&mut self, delivery: Delivery) -> Acknowledgement {
        if delivery.payload.is_empty() {
            debug!(source = %self.source, "Skipping empty delivery");
            self.stats.skipped += 1;
            delivery.settle(Acknowledgement::Ack);
            return Acknowledgement::Ack;
        }

        let envelope = self.normalize(&delivery);
        debug!(
            message_id = %envelope.id(),
            transport = %self.transport,
            topic = %envelope.topic(),
            redelivered = delivery.is_redelivered(),
            "Received message"
        );

        let ack = match self.dispatcher.dispatch(&envelope).await {
            Ok(DispatchOutcome::Handled(_)) => {
                self.stats.handled += 1;
                Acknowledgement::Ack
            }
            Ok(DispatchOutcome::Unhandled) => {
                self.stats.unhandled += 1;
                Acknowledgement::Ack
            }
            Err(_) if delivery.is_redelivered() => {
                self.stats.failed += 1;
                error!(message_id = %envelope.id(), "Redelivered message failed again, rejecting");
                Acknowledgement::Reject
            }
            Err(_) => {
                self.stats.failed += 1;
                warn!(message_id = %envelope.id(), "Message failed, requeueing for redelivery");
                Acknowledgement::Requeue
            }
        };

        delivery.settle(ack);
        ack
    }

    /// Consume until the channel closes or shutdown is signalled.
    ///
    /// A message already being dispatched is finished before stopping.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> ConsumerStats {
        info!(transport = %self.transport, source = %self.source, "Transport consumer started");

        loop {
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                delivery = self.receiver.recv() => match delivery {
                    Some(delivery) => {
                        self.process(delivery).await;
                    }
                    None => break,
                },
            }
        }

        info!(
            transport = %self.transport,
            source = %self.source,
            handled = self.stats.handled,
            unhandled = self.stats.unhandled,
            failed = self.stats.failed,
            "Transport consumer stopped"
        );
        self.stats
    }
}
