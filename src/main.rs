//! queue-shovel - relay queue messages into a batched event-stream sink
//!
//! # Usage
//!
//! ```bash
//! # Settings come from the environment (or a .env file)
//! amqpProtocol=amqp sinkConnectionString=stdout:// consumeMode=batch \
//!     ackAfterConsume=true queue-shovel < messages.txt
//!
//! # Single-message mode, stop after 100 messages
//! queue-shovel --amqp-protocol amqp --sink-connection-string file:///tmp/out.jsonl \
//!     --consume-mode single --consume-limit 100 < messages.txt
//! ```
//!
//! Each stdin line is published onto the consume queue of the in-process
//! broker. A line of the form `routing.key<TAB>payload` sets the routing key;
//! otherwise the queue name is used.

use std::io::{self, BufRead};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use queue_shovel::bus::InMemoryBroker;
use queue_shovel::config::{LogConfig, LogFormat};
use queue_shovel::sink::LogSink;
use queue_shovel::{MessageProcessor, ShovelConfig};

const STDIN_EXCHANGE: &str = "stdin";

fn main() -> Result<()> {
    load_dotenv();

    let config = match ShovelConfig::try_parse() {
        Ok(config) => config,
        // --help / --version
        Err(e) if !e.use_stderr() => e.exit(),
        Err(e) => {
            let _ = e.print();
            std::process::exit(1);
        }
    };

    init_logging(&config.log)?;

    if let Err(e) = config.validate() {
        error!(error = %e, "no usable configuration found");
        std::process::exit(1);
    }

    run(config)
}

fn run(config: ShovelConfig) -> Result<()> {
    let queue = config.broker.consume_queue.clone();
    info!(
        broker = %config.broker.redacted_url(),
        queue = %queue,
        "registering a consumer"
    );
    if let Some(ca) = config
        .broker
        .ca_certificate()
        .context("loading broker CA certificate")?
    {
        info!(
            path = ?config.broker.ca_cert_path(),
            bytes = ca.len(),
            "CA certificate loaded"
        );
    }

    let connection = config
        .sink
        .connection_string
        .as_deref()
        .context("sinkConnectionString is not set")?;
    let sink = LogSink::from_connection_string(
        connection,
        config.sink.stream_name.clone(),
        config.sink.max_batch_bytes,
    )
    .context("opening sink")?;

    let broker = InMemoryBroker::new().with_channel_setup(|_| {
        info!("consumer channel connected");
        Ok(())
    });

    let running = MessageProcessor::new(broker.clone(), sink, queue.clone(), config.pipeline.clone())
        .start()
        .inspect_err(|e| error!(error = %e, "consumer start-up failed"))?;

    let published = feed_stdin(&broker, &queue)?;
    info!(published, "stdin closed");

    let drain_timeout = config.pipeline.batch_max_time() * 2 + Duration::from_secs(1);
    if !wait_for_drain(&broker, &queue, drain_timeout) {
        warn!(
            ready = broker.ready(&queue),
            unacked = broker.unacked(),
            "messages still pending at shutdown"
        );
    }

    let consumer_stats = running.consumer.stop();
    let stats = running.stats.snapshot();
    info!(
        deliveries = consumer_stats.deliveries,
        records_sent = stats.records_sent,
        records_dropped = stats.records_dropped,
        acked = stats.acked,
        nacked = stats.nacked,
        broker_nacks = broker.nacked_count(),
        "shovel stopped"
    );
    Ok(())
}

/// Publish every stdin line onto `queue`. Returns how many were published.
fn feed_stdin(broker: &InMemoryBroker, queue: &str) -> Result<usize> {
    let mut published = 0;
    for line in io::stdin().lock().lines() {
        let line = line.context("reading stdin")?;
        if line.is_empty() {
            continue;
        }
        let (routing_key, payload) = match line.split_once('\t') {
            Some((key, payload)) => (key, payload),
            None => (queue, line.as_str()),
        };
        broker
            .publish(queue, STDIN_EXCHANGE, routing_key, payload.as_bytes().to_vec())
            .context("publishing stdin line")?;
        published += 1;
    }
    Ok(published)
}

fn wait_for_drain(broker: &InMemoryBroker, queue: &str, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if broker.ready(queue) == 0 && broker.unacked() == 0 {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    false
}

fn load_dotenv() {
    match dotenvy::dotenv() {
        Ok(_) => {}
        Err(dotenvy::Error::Io(err)) if err.kind() == io::ErrorKind::NotFound => {
            // Ignore this - a missing env file is not an error, defaults will be applied.
        }
        Err(e) => {
            eprintln!("FATAL Error loading config from: {e}");
            eprintln!("Aborting");
            std::process::exit(1);
        }
    }
}

/// Initialize the tracing subscriber for logging
fn init_logging(log: &LogConfig) -> Result<()> {
    let filter = EnvFilter::try_new(&log.level)
        .or_else(|_| EnvFilter::try_new("info"))
        .map_err(|e| anyhow::anyhow!("invalid log level: {}", e))?;

    let registry = tracing_subscriber::registry().with(filter);
    match log.format {
        LogFormat::Console => registry
            .with(fmt::layer().with_target(true).with_thread_names(true))
            .init(),
        LogFormat::Json => registry.with(fmt::layer().json().with_target(true)).init(),
    }

    Ok(())
}
