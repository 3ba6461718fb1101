//! queue_shovel - relay messages from a queue broker into a batched
//! event-stream sink.
//!
//! The broker side ([`bus`]) delivers messages one at a time or in size/time
//! bounded batches. The [`pipeline`] translates them into sink records,
//! sends them as one batch, and acks or nacks the inbound deliveries based
//! on the outcome and the configured policy. The [`sink`] side defines the
//! batch contract and ships in-memory and JSON-lines sinks.
//!
//! Delivery is at-least-once (nack → redelivery) or at-most-one-attempt
//! (ack after send), never exactly-once.

pub mod bus;
pub mod config;
mod error;
pub mod pipeline;
pub mod sink;

pub use config::{ConsumeMode, PipelineConfig, ShovelConfig};
pub use error::{CapacityExceeded, ConfigError, ProcessError, Result, ShovelError};
pub use pipeline::{AckDecision, MessageProcessor, PipelineDriver};
