//! Error types for the shovel.
//!
//! Per-message errors (`ProcessError`) never leave the pipeline driver: they
//! are logged and turned into a nack. Start-up errors (`ConfigError`, channel
//! setup failures) surface through `ShovelError` to the caller.

use thiserror::Error;

use crate::bus::BrokerError;
use crate::sink::SinkError;

/// Top-level error for start-up and wiring.
#[derive(Debug, Error)]
pub enum ShovelError {
    /// No usable configuration could be located.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The broker rejected channel setup or consumer registration.
    #[error("broker error: {0}")]
    Broker(#[from] BrokerError),

    /// The sink could not be created.
    #[error("sink error: {0}")]
    Sink(#[from] SinkError),
}

/// Configuration errors. All of them are fatal at start-up.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required setting is absent.
    #[error("missing configuration: {0}")]
    Missing(&'static str),

    /// A setting is present but unusable.
    #[error("invalid configuration for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },

    /// The CA certificate could not be read.
    #[error("failed to read CA certificate {path}: {source}")]
    CaCertificate {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Failure while handling one inbound message or batch.
///
/// Every variant maps to a nack of the affected delivery.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// The sink could not create or send the batch.
    #[error("sink failure: {0}")]
    Sink(#[from] SinkError),

    /// A lone record does not fit an empty sink batch.
    #[error(transparent)]
    Capacity(#[from] CapacityExceeded),

    /// Every record of an inbound batch was dropped, nothing was forwarded.
    #[error("no records forwarded ({dropped} dropped)")]
    NothingForwarded { dropped: usize },

    /// The driver already terminated and refuses further work.
    #[error("driver terminated")]
    Terminated,
}

/// A record would push the outbound batch past the sink's byte limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("record of {record_bytes} bytes does not fit batch ({current_bytes}/{max_bytes} bytes used)")]
pub struct CapacityExceeded {
    pub record_bytes: usize,
    pub current_bytes: usize,
    pub max_bytes: usize,
}

/// Result type for shovel start-up operations.
pub type Result<T> = std::result::Result<T, ShovelError>;
