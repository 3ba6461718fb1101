//! Sink side - outbound records, batches and the sink client contract
//!
//! A sink hands out empty batches sized to its own limit, the pipeline
//! fills them, and `send_batch` consumes the batch whether or not the send
//! succeeds.

mod batch;
mod in_memory;
mod log;
mod record;

use thiserror::Error;

pub use batch::{OutboundBatch, DEFAULT_MAX_BATCH_BYTES, RECORD_OVERHEAD_BYTES};
pub use in_memory::InMemorySink;
pub use log::LogSink;
pub use record::{OutboundRecord, RecordBody, RecordProperties};

/// Error type for sink operations.
#[derive(Debug, Error)]
pub enum SinkError {
    /// The sink could not be reached
    #[error("sink unavailable: {0}")]
    Unavailable(String),

    /// The sink refused the batch
    #[error("batch rejected: {0}")]
    Rejected(String),

    /// The sink connection string is not understood
    #[error("unsupported sink connection string: {0}")]
    UnsupportedConnection(String),

    /// Writing the batch failed
    #[error("sink I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Encoding a record failed
    #[error("record serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal buffer lock poisoned
    #[error("sink buffer poisoned")]
    BufferPoisoned,
}

/// Client for a batched event-stream destination.
pub trait Sink: Send {
    /// Name of the destination stream, for logging.
    fn name(&self) -> &str;

    /// Start a new, empty batch bounded by the sink's maximum batch size.
    fn create_batch(&self) -> Result<OutboundBatch, SinkError>;

    /// Send a batch. The batch is consumed either way.
    fn send_batch(&mut self, batch: OutboundBatch) -> Result<(), SinkError>;
}

impl<S: Sink + ?Sized> Sink for Box<S> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn create_batch(&self) -> Result<OutboundBatch, SinkError> {
        (**self).create_batch()
    }

    fn send_batch(&mut self, batch: OutboundBatch) -> Result<(), SinkError> {
        (**self).send_batch(batch)
    }
}
