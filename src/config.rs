//! Configuration for the shovel.
//!
//! Every setting is read from the environment (after an optional `.env`
//! file) and may be overridden on the command line. Environment keys keep
//! the camelCase names operators already use in their `.env` files.

use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Args, Parser, ValueEnum};

use crate::bus::BatchingOptions;
use crate::error::ConfigError;
use crate::sink::DEFAULT_MAX_BATCH_BYTES;

/// How the consumer receives messages. Fixed for the life of the process.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum ConsumeMode {
    /// Broker hands over size/time bounded batches
    #[default]
    Batch,
    /// Broker hands over one message at a time
    #[value(alias = "oneeach")]
    Single,
}

impl ConsumeMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Batch => "batch",
            Self::Single => "single",
        }
    }
}

/// Broker transport.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum AmqpProtocol {
    Amqp,
    #[default]
    Amqps,
}

impl AmqpProtocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Amqp => "amqp",
            Self::Amqps => "amqps",
        }
    }

    pub fn default_port(&self) -> u16 {
        match self {
            Self::Amqp => 5672,
            Self::Amqps => 5671,
        }
    }
}

/// CA certificate read for amqps when `amqpCACertName` is unset.
pub const DEFAULT_CA_CERT: &str = "cert/ca_certificate.pem";

/// Only the exact string `true` enables a flag; anything else reads as false.
fn parse_true_flag(value: &str) -> Result<bool, String> {
    Ok(value == "true")
}

/// Broker connection settings.
#[derive(Debug, Clone, Args)]
pub struct BrokerConfig {
    /// Broker protocol (amqp, amqps)
    #[arg(long = "amqp-protocol", env = "amqpProtocol", value_enum, default_value = "amqps", ignore_case = true)]
    pub protocol: AmqpProtocol,

    /// Broker host
    #[arg(long = "amqp-host", env = "amqpHost", default_value = "localhost")]
    pub host: String,

    /// Broker port. Defaults to 5671 for amqps and 5672 for amqp
    #[arg(long = "amqp-port", env = "amqpPort")]
    pub port: Option<u16>,

    /// Virtual host
    #[arg(long = "amqp-vhost", env = "amqpVhost", default_value = "")]
    pub vhost: String,

    #[arg(long = "amqp-username", env = "amqpUsername")]
    pub username: Option<String>,

    #[arg(long = "amqp-password", env = "amqpPassword", hide_env_values = true)]
    pub password: Option<String>,

    /// CA certificate (PEM) used for amqps connections
    /// (unset = cert/ca_certificate.pem, empty = none)
    #[arg(long = "amqp-ca-cert", env = "amqpCACertName")]
    pub ca_cert: Option<PathBuf>,

    /// Queue to consume from
    #[arg(long = "amqp-consume-queue", env = "amqpConsumeQueue", default_value = "example-queue")]
    pub consume_queue: String,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            protocol: AmqpProtocol::default(),
            host: "localhost".into(),
            port: None,
            vhost: String::new(),
            username: None,
            password: None,
            ca_cert: None,
            consume_queue: "example-queue".into(),
        }
    }
}

impl BrokerConfig {
    /// Explicit port, or the protocol default.
    pub fn port(&self) -> u16 {
        self.port.unwrap_or_else(|| self.protocol.default_port())
    }

    /// Connection URL including credentials.
    pub fn url(&self) -> String {
        self.build_url(self.password.as_deref())
    }

    /// Connection URL safe for logs: the password is masked.
    pub fn redacted_url(&self) -> String {
        self.build_url(self.password.as_ref().map(|_| "****"))
    }

    fn build_url(&self, password: Option<&str>) -> String {
        let userinfo = match (&self.username, password) {
            (Some(user), Some(pass)) => format!("{user}:{pass}@"),
            (Some(user), None) => format!("{user}@"),
            _ => String::new(),
        };
        let vhost = match self.vhost.as_str() {
            "/" => "%2F",
            other => other,
        };
        format!(
            "{}://{}{}:{}/{}",
            self.protocol.as_str(),
            userinfo,
            self.host,
            self.port(),
            vhost
        )
    }

    /// CA certificate path for amqps connections.
    ///
    /// Unset falls back to [`DEFAULT_CA_CERT`]; an empty value disables the
    /// certificate. Always `None` for plain amqp.
    pub fn ca_cert_path(&self) -> Option<PathBuf> {
        if self.protocol != AmqpProtocol::Amqps {
            return None;
        }
        match &self.ca_cert {
            None => Some(PathBuf::from(DEFAULT_CA_CERT)),
            Some(path) if path.as_os_str().is_empty() => None,
            Some(path) => Some(path.clone()),
        }
    }

    /// Load the CA certificate named by [`ca_cert_path`](Self::ca_cert_path).
    pub fn ca_certificate(&self) -> Result<Option<Vec<u8>>, ConfigError> {
        let Some(path) = self.ca_cert_path() else {
            return Ok(None);
        };
        std::fs::read(&path)
            .map(Some)
            .map_err(|source| ConfigError::CaCertificate {
                path: path.display().to_string(),
                source,
            })
    }
}

/// Sink connection settings.
#[derive(Debug, Clone, Args)]
pub struct SinkConfig {
    /// Sink connection string (stdout://, stderr://, file://<path>)
    #[arg(long = "sink-connection-string", env = "sinkConnectionString", hide_env_values = true)]
    pub connection_string: Option<String>,

    /// Destination stream name
    #[arg(long = "sink-stream-name", env = "sinkStreamName", default_value = "example-stream")]
    pub stream_name: String,

    /// Maximum outbound batch size accepted by the sink
    #[arg(long = "sink-max-batch-bytes", env = "sinkMaxBatchBytes", default_value_t = DEFAULT_MAX_BATCH_BYTES)]
    pub max_batch_bytes: usize,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            connection_string: None,
            stream_name: "example-stream".into(),
            max_batch_bytes: DEFAULT_MAX_BATCH_BYTES,
        }
    }
}

/// Pipeline behaviour. Read once at start-up.
#[derive(Debug, Clone, Args)]
pub struct PipelineConfig {
    /// Consume mode (batch, single)
    #[arg(long = "consume-mode", env = "consumeMode", value_enum, default_value = "batch", ignore_case = true)]
    pub consume_mode: ConsumeMode,

    /// Inbound batch size that releases a batch
    #[arg(long = "batch-max-size-bytes", env = "batchMaxSizeBytes", default_value_t = 10_000)]
    pub batch_max_size_bytes: usize,

    /// Time after the first message that releases a batch
    #[arg(long = "batch-max-time-ms", env = "batchMaxTimeMs", default_value_t = 5_000)]
    pub batch_max_time_ms: u64,

    /// Maximum unacknowledged deliveries the broker sends ahead (unset = no cap)
    #[arg(long = "amqp-prefetch", env = "amqpPrefetch")]
    pub prefetch: Option<u16>,

    /// Ack after a successful send. When false, successfully forwarded
    /// messages are still nacked and the broker redelivers them.
    #[arg(
        long = "ack-after-consume",
        env = "ackAfterConsume",
        default_value = "false",
        action = ArgAction::Set,
        value_parser = parse_true_flag
    )]
    pub ack_after_consume: bool,

    /// Stop after this many messages in single mode (0 = unlimited)
    #[arg(long = "consume-limit", env = "consumeLimit", default_value_t = 0)]
    pub consume_limit: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            consume_mode: ConsumeMode::Batch,
            batch_max_size_bytes: 10_000,
            batch_max_time_ms: 5_000,
            prefetch: None,
            ack_after_consume: false,
            consume_limit: 0,
        }
    }
}

impl PipelineConfig {
    pub fn batch_max_time(&self) -> Duration {
        Duration::from_millis(self.batch_max_time_ms)
    }

    /// Bounds handed to the broker for batched delivery.
    pub fn batching_options(&self) -> BatchingOptions {
        BatchingOptions {
            max_size_bytes: self.batch_max_size_bytes,
            max_time: self.batch_max_time(),
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable console output (default)
    #[default]
    Console,
    /// JSON structured logging
    Json,
}

/// Logging settings.
#[derive(Debug, Clone, Args)]
pub struct LogConfig {
    /// Log filter (trace, debug, info, warn, error, or an EnvFilter directive)
    #[arg(long = "log-level", env = "logLevel", default_value = "info")]
    pub level: String,

    /// Log format (console, json)
    #[arg(long = "log-format", env = "logFormat", value_enum, default_value = "console", ignore_case = true)]
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: LogFormat::Console,
        }
    }
}

/// Complete shovel configuration.
#[derive(Debug, Clone, Default, Parser)]
#[command(name = "queue-shovel")]
#[command(version, about = "Relay messages from a queue into a batched event-stream sink", long_about = None)]
pub struct ShovelConfig {
    #[command(flatten)]
    pub broker: BrokerConfig,

    #[command(flatten)]
    pub sink: SinkConfig,

    #[command(flatten)]
    pub pipeline: PipelineConfig,

    #[command(flatten)]
    pub log: LogConfig,
}

impl ShovelConfig {
    /// Check that the configuration is usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.sink.connection_string.as_deref() {
            None => return Err(ConfigError::Missing("sinkConnectionString")),
            Some(conn) if conn.trim().is_empty() => {
                return Err(ConfigError::Missing("sinkConnectionString"))
            }
            Some(_) => {}
        }
        if self.broker.consume_queue.trim().is_empty() {
            return Err(ConfigError::Missing("amqpConsumeQueue"));
        }
        if self.pipeline.batch_max_size_bytes == 0 {
            return Err(ConfigError::Invalid {
                key: "batchMaxSizeBytes",
                reason: "must be greater than zero".into(),
            });
        }
        if self.sink.max_batch_bytes == 0 {
            return Err(ConfigError::Invalid {
                key: "sinkMaxBatchBytes",
                reason: "must be greater than zero".into(),
            });
        }
        Ok(())
    }
}
