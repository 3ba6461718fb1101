//! Consumer channel trait and broker errors.

use thiserror::Error;

use super::message::DeliveryTag;

/// Error type for broker operations.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// Connection to the broker failed
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Post-connect channel setup (topology assertion, prefetch) failed
    #[error("channel setup failed: {0}")]
    ChannelSetup(String),

    /// The channel is closed
    #[error("channel closed")]
    ChannelClosed,

    /// Ack/nack for a delivery the channel does not know about
    #[error("unknown delivery: {0}")]
    UnknownDelivery(DeliveryTag),

    /// A consumer is already registered on this queue
    #[error("consumer already registered on queue {0}")]
    ConsumerExists(String),

    /// Lock poisoned inside an in-process broker
    #[error("broker lock poisoned during {0}")]
    LockPoisoned(&'static str),

    /// Other error
    #[error("broker error: {0}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// Consumer channel: settles deliveries and carries flow-control settings.
///
/// One channel is shared by every invocation of a registered consumer; the
/// pipeline never uses it from two threads at once.
pub trait Channel: Send + Sync {
    /// Acknowledge a delivery, removing it from the broker.
    fn ack(&self, tag: DeliveryTag) -> Result<(), BrokerError>;

    /// Reject a delivery. With `requeue` the broker will redeliver it.
    fn nack(&self, tag: DeliveryTag, requeue: bool) -> Result<(), BrokerError>;

    /// Cap the number of unacknowledged deliveries the broker sends ahead.
    fn prefetch(&self, count: u16) -> Result<(), BrokerError>;
}

impl<C: Channel + ?Sized> Channel for std::sync::Arc<C> {
    fn ack(&self, tag: DeliveryTag) -> Result<(), BrokerError> {
        (**self).ack(tag)
    }

    fn nack(&self, tag: DeliveryTag, requeue: bool) -> Result<(), BrokerError> {
        (**self).nack(tag, requeue)
    }

    fn prefetch(&self, count: u16) -> Result<(), BrokerError> {
        (**self).prefetch(count)
    }
}
