//! Shared fixtures for pipeline tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use queue_shovel::bus::InMemoryBroker;
use queue_shovel::config::{ConsumeMode, PipelineConfig};
use queue_shovel::pipeline::Terminator;

pub const QUEUE: &str = "orders";
pub const WAIT: Duration = Duration::from_secs(5);

/// Terminator that records the count instead of exiting.
#[derive(Clone, Default)]
pub struct RecordingTerminator {
    calls: Arc<Mutex<Vec<u64>>>,
}

impl RecordingTerminator {
    pub fn calls(&self) -> Vec<u64> {
        self.calls.lock().unwrap().clone()
    }

    /// Poll until the terminator has fired or the timeout expires.
    pub fn wait(&self, timeout: Duration) -> bool {
        let deadline = std::time::Instant::now() + timeout;
        while std::time::Instant::now() < deadline {
            if !self.calls().is_empty() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        false
    }
}

impl Terminator for RecordingTerminator {
    fn terminate(&mut self, consumed: u64) {
        self.calls.lock().unwrap().push(consumed);
    }
}

/// Broker that keeps settled messages for inspection.
pub fn logged_broker() -> InMemoryBroker {
    InMemoryBroker::new().with_settlement_log()
}

pub fn batch_config(ack_after_consume: bool) -> PipelineConfig {
    PipelineConfig {
        consume_mode: ConsumeMode::Batch,
        batch_max_size_bytes: 10_000,
        batch_max_time_ms: 30,
        ack_after_consume,
        ..PipelineConfig::default()
    }
}

pub fn single_config(ack_after_consume: bool, consume_limit: u64) -> PipelineConfig {
    PipelineConfig {
        consume_mode: ConsumeMode::Single,
        ack_after_consume,
        consume_limit,
        ..PipelineConfig::default()
    }
}

pub fn publish_all(broker: &InMemoryBroker, messages: &[(&str, &str)]) {
    for (routing_key, body) in messages {
        broker
            .publish(QUEUE, "events", routing_key, body.as_bytes().to_vec())
            .unwrap();
    }
}
