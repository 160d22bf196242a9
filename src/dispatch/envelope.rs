//! Transport-neutral message envelope.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// The kind of transport a message arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Transport {
    /// Point-to-point queue; the queue name serves as topic
    DirectQueue,
    /// Topic broker; each delivery carries its own topic
    Topic,
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transport::DirectQueue => f.write_str("direct_queue"),
            Transport::Topic => f.write_str("topic"),
        }
    }
}

/// A message normalized by a transport adapter, ready for dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageEnvelope {
    id: Uuid,
    transport: Transport,
    topic: String,
    payload: String,
}

impl MessageEnvelope {
    /// Wrap a delivery, assigning it a fresh message id.
    pub fn new(transport: Transport, topic: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            transport,
            topic: topic.into(),
            payload: payload.into(),
        }
    }

    /// Id assigned by the adapter, used to correlate log lines.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Transport the message arrived on.
    pub fn transport(&self) -> Transport {
        self.transport
    }

    /// Normalized topic.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Message body.
    pub fn payload(&self) -> &str {
        &self.payload
    }
}
