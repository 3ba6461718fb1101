//! Broker side - inbound messages, consumer channels and connection managers
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 ConnectionManager (per broker)              │
//! │  consumer_channel() / register_consumer[_batch]()           │
//! └─────────────────────────────────────────────────────────────┘
//!                            │ one ConsumerThread per registration
//!                            ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │        MessageHandler / BatchHandler (the pipeline)         │
//! │  handle_message(&channel, msg) / handle_batch(&channel, b)  │
//! └─────────────────────────────────────────────────────────────┘
//!                            │
//!                            ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Channel: ack(tag) / nack(tag, requeue) / prefetch(n)       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! `InMemoryBroker` is the included implementation. A networked AMQP client
//! plugs in by implementing `ConnectionManager` and `Channel`.

mod channel;
mod connection;
mod consumer_thread;
mod in_memory_broker;
mod message;

pub use channel::{BrokerError, Channel};
pub use connection::{BatchHandler, BatchingOptions, ConnectionManager, MessageHandler};
pub use consumer_thread::{ConsumerStats, ConsumerThread, StopSignal};
pub use in_memory_broker::{InMemoryBroker, InMemoryChannel};
pub use message::{DeliveryTag, InboundBatch, InboundMessage, MessageFields};
