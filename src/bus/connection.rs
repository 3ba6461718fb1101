//! Connection manager contract: how consumers are registered with a broker.

use std::time::Duration;

use super::channel::{BrokerError, Channel};
use super::message::{InboundBatch, InboundMessage};

/// Bounds for batched delivery. Whichever limit is hit first releases the
/// batch to the handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchingOptions {
    /// Release once the accumulated payload bytes reach this size
    pub max_size_bytes: usize,
    /// Release once this much time has passed since the first message
    pub max_time: Duration,
}

impl Default for BatchingOptions {
    fn default() -> Self {
        Self {
            max_size_bytes: 10_000,
            max_time: Duration::from_millis(5_000),
        }
    }
}

/// Callback for single-message consumers.
///
/// Invocations for one registration are serialised: the handler is never
/// called again before the previous call returns.
pub trait MessageHandler<C: Channel>: Send + 'static {
    fn handle_message(&mut self, channel: &C, message: InboundMessage);
}

/// Callback for batching consumers.
pub trait BatchHandler<C: Channel>: Send + 'static {
    fn handle_batch(&mut self, channel: &C, batch: InboundBatch);
}

/// A broker connection that hands out consumer channels and drives
/// registered handlers.
///
/// Implementations own reconnects, heartbeats and TLS; callers only see
/// channels and handler invocations.
pub trait ConnectionManager {
    /// Channel type passed to handlers
    type Channel: Channel + Clone + 'static;
    /// Handle returned for a registered consumer
    type Consumer;

    /// Connect (if needed) and return the consumer channel, running any
    /// channel setup. A setup failure is reported as
    /// [`BrokerError::ChannelSetup`].
    fn consumer_channel(&self) -> Result<Self::Channel, BrokerError>;

    /// Register a handler invoked once per message on `queue`.
    fn register_consumer<H>(&self, queue: &str, handler: H) -> Result<Self::Consumer, BrokerError>
    where
        H: MessageHandler<Self::Channel>;

    /// Register a handler invoked once per batch of messages on `queue`.
    fn register_consumer_batch<H>(
        &self,
        queue: &str,
        handler: H,
        options: BatchingOptions,
    ) -> Result<Self::Consumer, BrokerError>
    where
        H: BatchHandler<Self::Channel>;
}
