//! Start-up: open the consumer channel and register the driver.

use tracing::info;

use crate::bus::{Channel, ConnectionManager};
use crate::config::{ConsumeMode, PipelineConfig};
use crate::error::Result;
use crate::sink::Sink;

use super::driver::{DriverStatsHandle, PipelineDriver};
use super::guard::{ProcessExit, Terminator};

/// A registered consumer together with its driver's counters.
pub struct RunningPipeline<K> {
    pub consumer: K,
    pub stats: DriverStatsHandle,
}

/// Wires a sink and a pipeline configuration onto a broker queue.
///
/// ## Example
///
/// ```
/// use queue_shovel::bus::InMemoryBroker;
/// use queue_shovel::config::PipelineConfig;
/// use queue_shovel::pipeline::MessageProcessor;
/// use queue_shovel::sink::InMemorySink;
///
/// let broker = InMemoryBroker::new();
/// let sink = InMemorySink::new("events");
///
/// let running = MessageProcessor::new(broker.clone(), sink, "orders", PipelineConfig::default())
///     .start()
///     .unwrap();
///
/// running.consumer.stop();
/// ```
pub struct MessageProcessor<B, S> {
    broker: B,
    sink: S,
    queue: String,
    config: PipelineConfig,
}

impl<B, S> MessageProcessor<B, S>
where
    B: ConnectionManager,
    S: Sink + 'static,
{
    pub fn new(broker: B, sink: S, queue: impl Into<String>, config: PipelineConfig) -> Self {
        Self {
            broker,
            sink,
            queue: queue.into(),
            config,
        }
    }

    /// Start consuming. Reaching the consume limit exits the process.
    pub fn start(self) -> Result<RunningPipeline<B::Consumer>> {
        self.start_with_terminator(ProcessExit)
    }

    /// Start consuming with a custom consume-limit terminator.
    pub fn start_with_terminator<T>(self, terminator: T) -> Result<RunningPipeline<B::Consumer>>
    where
        T: Terminator + 'static,
    {
        info!(stream = %self.sink.name(), "sink output");
        info!(
            "after messages are processed, the consumer will {} them",
            if self.config.ack_after_consume { "ACK" } else { "NACK" }
        );

        let channel = self.broker.consumer_channel()?;
        if let Some(prefetch) = self.config.prefetch {
            channel.prefetch(prefetch)?;
            info!(prefetch, "prefetch applied to consumer channel");
        }

        let driver = PipelineDriver::new(self.sink, &self.config).with_terminator(terminator);
        let stats = driver.stats_handle();

        let consumer = match self.config.consume_mode {
            ConsumeMode::Batch => {
                let options = self.config.batching_options();
                info!(
                    consume_mode = ConsumeMode::Batch.as_str(),
                    bytes = options.max_size_bytes,
                    time_ms = self.config.batch_max_time_ms,
                    queue = %self.queue,
                    "registering batch consumer"
                );
                self.broker
                    .register_consumer_batch(&self.queue, driver, options)?
            }
            ConsumeMode::Single => {
                info!(
                    consume_mode = ConsumeMode::Single.as_str(),
                    consume_limit = self.config.consume_limit,
                    queue = %self.queue,
                    "registering single-message consumer"
                );
                self.broker.register_consumer(&self.queue, driver)?
            }
        };

        Ok(RunningPipeline { consumer, stats })
    }
}
