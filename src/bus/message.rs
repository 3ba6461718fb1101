//! Inbound message types delivered by the broker.

use std::fmt;

use super::channel::{BrokerError, Channel};

/// Broker-assigned handle identifying one delivery on a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeliveryTag(pub u64);

impl fmt::Display for DeliveryTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "delivery:{}", self.0)
    }
}

/// Routing metadata that travels with an inbound message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageFields {
    /// Exchange the message was published to (empty for the default exchange)
    pub exchange: String,
    /// Routing key used at publish time
    pub routing_key: String,
    /// Set when the broker has delivered this message before
    pub redelivered: bool,
}

/// A message consumed from a queue.
///
/// The broker owns the delivery until it is acked or nacked; the pipeline
/// only borrows it for one processing cycle.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    /// Raw payload bytes
    pub content: Vec<u8>,
    /// Exchange / routing metadata
    pub fields: MessageFields,
    /// Handle used to settle the delivery
    pub delivery_tag: DeliveryTag,
}

impl InboundMessage {
    pub fn new(
        delivery_tag: DeliveryTag,
        exchange: impl Into<String>,
        routing_key: impl Into<String>,
        content: Vec<u8>,
    ) -> Self {
        Self {
            content,
            fields: MessageFields {
                exchange: exchange.into(),
                routing_key: routing_key.into(),
                redelivered: false,
            },
            delivery_tag,
        }
    }

    /// Get the payload as a string (if valid UTF-8).
    pub fn content_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.content).ok()
    }

    pub fn routing_key(&self) -> &str {
        &self.fields.routing_key
    }

    pub fn exchange(&self) -> &str {
        &self.fields.exchange
    }

    /// Payload size in bytes.
    pub fn len(&self) -> usize {
        self.content.len()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}

/// A group of messages delivered together by a batching consumer.
///
/// Order is the broker's delivery order.
#[derive(Debug, Clone, Default)]
pub struct InboundBatch {
    pub messages: Vec<InboundMessage>,
}

impl InboundBatch {
    pub fn new(messages: Vec<InboundMessage>) -> Self {
        Self { messages }
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Total payload bytes across all messages.
    pub fn size_in_bytes(&self) -> usize {
        self.messages.iter().map(InboundMessage::len).sum()
    }

    /// Acknowledge every message in the batch.
    ///
    /// Keeps going after a failed ack so one bad tag does not strand the
    /// rest; the first error is returned.
    pub fn ack_all<C: Channel + ?Sized>(&self, channel: &C) -> Result<(), BrokerError> {
        settle_all(&self.messages, |tag| channel.ack(tag))
    }

    /// Negative-acknowledge every message in the batch, requeueing them.
    pub fn nack_all<C: Channel + ?Sized>(&self, channel: &C) -> Result<(), BrokerError> {
        settle_all(&self.messages, |tag| channel.nack(tag, true))
    }
}

fn settle_all(
    messages: &[InboundMessage],
    mut settle: impl FnMut(DeliveryTag) -> Result<(), BrokerError>,
) -> Result<(), BrokerError> {
    let mut first_err = None;
    for msg in messages {
        if let Err(err) = settle(msg.delivery_tag) {
            first_err.get_or_insert(err);
        }
    }
    match first_err {
        Some(err) => Err(err),
        None => Ok(()),
    }
}
