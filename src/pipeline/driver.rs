//! Pipeline driver: receive → translate → accumulate → flush → settle.
//!
//! The driver is registered with the broker as the message (or batch)
//! handler. Every failure inside one invocation is logged and turned into a
//! nack; nothing is raised back into the broker.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{debug, error, info, trace, warn};

use crate::bus::{BatchHandler, Channel, InboundBatch, InboundMessage, MessageHandler};
use crate::config::PipelineConfig;
use crate::error::ProcessError;
use crate::sink::{OutboundBatch, Sink};

use super::ack::{apply_to_batch, apply_to_message, resolve_batch, resolve_single, AckDecision};
use super::guard::{ConsumeState, ProcessExit, Terminator};
use super::translator::translate;

/// Where the driver is within one invocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DriverState {
    #[default]
    Idle,
    /// Batch mode: translating an inbound batch
    Receiving,
    /// Single mode: translating one message
    Processing,
    Flushing,
    Acking,
    /// Consume limit reached; further input is nacked
    Terminated,
}

/// Point-in-time copy of the driver counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DriverStats {
    pub batches_received: u64,
    pub messages_received: u64,
    pub records_sent: u64,
    pub records_dropped: u64,
    pub sends_failed: u64,
    pub acked: u64,
    pub nacked: u64,
}

#[derive(Debug, Default)]
struct DriverMetrics {
    batches_received: AtomicU64,
    messages_received: AtomicU64,
    records_sent: AtomicU64,
    records_dropped: AtomicU64,
    sends_failed: AtomicU64,
    acked: AtomicU64,
    nacked: AtomicU64,
}

impl DriverMetrics {
    fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    fn settled(&self, decision: AckDecision, count: u64) {
        if decision.is_ack() {
            Self::add(&self.acked, count);
        } else {
            Self::add(&self.nacked, count);
        }
    }

    fn snapshot(&self) -> DriverStats {
        DriverStats {
            batches_received: self.batches_received.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            records_sent: self.records_sent.load(Ordering::Relaxed),
            records_dropped: self.records_dropped.load(Ordering::Relaxed),
            sends_failed: self.sends_failed.load(Ordering::Relaxed),
            acked: self.acked.load(Ordering::Relaxed),
            nacked: self.nacked.load(Ordering::Relaxed),
        }
    }
}

/// Read-only view of a driver's counters, usable after the driver has been
/// moved into its consumer thread.
#[derive(Debug, Clone)]
pub struct DriverStatsHandle(Arc<DriverMetrics>);

impl DriverStatsHandle {
    pub fn snapshot(&self) -> DriverStats {
        self.0.snapshot()
    }
}

/// The consume-batch-acknowledge pipeline for one consumer registration.
pub struct PipelineDriver<S, T = ProcessExit> {
    sink: S,
    ack_after_consume: bool,
    consume: ConsumeState,
    terminator: T,
    state: DriverState,
    metrics: Arc<DriverMetrics>,
}

impl<S: Sink> PipelineDriver<S, ProcessExit> {
    /// Create a driver that exits the process when the consume limit is hit.
    pub fn new(sink: S, config: &PipelineConfig) -> Self {
        Self {
            sink,
            ack_after_consume: config.ack_after_consume,
            consume: ConsumeState::new(config.consume_limit),
            terminator: ProcessExit,
            state: DriverState::Idle,
            metrics: Arc::new(DriverMetrics::default()),
        }
    }
}

impl<S: Sink, T: Terminator> PipelineDriver<S, T> {
    /// Replace how the driver halts at the consume limit.
    pub fn with_terminator<U: Terminator>(self, terminator: U) -> PipelineDriver<S, U> {
        PipelineDriver {
            sink: self.sink,
            ack_after_consume: self.ack_after_consume,
            consume: self.consume,
            terminator,
            state: self.state,
            metrics: self.metrics,
        }
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    pub fn consume_state(&self) -> ConsumeState {
        self.consume
    }

    pub fn stats(&self) -> DriverStats {
        self.metrics.snapshot()
    }

    pub fn stats_handle(&self) -> DriverStatsHandle {
        DriverStatsHandle(Arc::clone(&self.metrics))
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Forward an inbound batch and settle it as a whole.
    pub fn process_batch<C: Channel + ?Sized>(
        &mut self,
        channel: &C,
        batch: &InboundBatch,
    ) -> AckDecision {
        let count = batch.len() as u64;
        if self.state == DriverState::Terminated {
            return self.reject_batch(channel, batch);
        }

        self.state = DriverState::Receiving;
        DriverMetrics::add(&self.metrics.batches_received, 1);
        DriverMetrics::add(&self.metrics.messages_received, count);
        info!(count, "received message batch");

        let outcome = self.forward_batch(batch);

        self.state = DriverState::Acking;
        let decision = resolve_batch(self.ack_after_consume, &outcome);
        if let Err(err) = &outcome {
            error!(count, error = %err, "batch processing failed, nacking batch");
        }
        let _ = apply_to_batch(decision, channel, batch);
        self.metrics.settled(decision, count);

        self.state = DriverState::Idle;
        decision
    }

    /// Forward one inbound message, settle it, then apply the consume limit.
    pub fn process_message<C: Channel + ?Sized>(
        &mut self,
        channel: &C,
        message: &InboundMessage,
    ) -> AckDecision {
        let tag = message.delivery_tag;
        if self.state == DriverState::Terminated {
            let decision = AckDecision::NackOne(tag);
            let _ = apply_to_message(decision, channel);
            self.metrics.settled(decision, 1);
            return decision;
        }

        self.state = DriverState::Processing;
        DriverMetrics::add(&self.metrics.messages_received, 1);
        info!(%tag, "received message");

        let outcome = self.forward_message(message);

        self.state = DriverState::Acking;
        let decision = resolve_single(self.ack_after_consume, tag, &outcome);
        if let Err(err) = &outcome {
            error!(%tag, error = %err, "message processing failed, nacking message");
        }
        let _ = apply_to_message(decision, channel);
        self.metrics.settled(decision, 1);

        if self.consume.on_processed() {
            let consumed = self.consume.count();
            info!(
                consumed,
                limit = self.consume.limit(),
                "consume limit reached, consumer stopping after {consumed} messages"
            );
            self.state = DriverState::Terminated;
            self.terminator.terminate(consumed);
            return decision;
        }

        self.state = DriverState::Idle;
        decision
    }

    fn forward_batch(&mut self, batch: &InboundBatch) -> Result<(), ProcessError> {
        let mut outbound = self.sink.create_batch()?;
        let mut dropped = 0usize;

        for message in &batch.messages {
            log_message(message);
            if let Err(err) = outbound.try_add(translate(message)) {
                warn!(
                    tag = %message.delivery_tag,
                    routing_key = %message.routing_key(),
                    error = %err,
                    "record does not fit outbound batch, dropped from this flush"
                );
                dropped += 1;
            }
        }
        DriverMetrics::add(&self.metrics.records_dropped, dropped as u64);

        if outbound.is_empty() {
            return Err(ProcessError::NothingForwarded { dropped });
        }
        self.flush(outbound)
    }

    fn forward_message(&mut self, message: &InboundMessage) -> Result<(), ProcessError> {
        let mut outbound = self.sink.create_batch()?;
        log_message(message);
        outbound.try_add(translate(message))?;
        self.flush(outbound)
    }

    fn flush(&mut self, outbound: OutboundBatch) -> Result<(), ProcessError> {
        self.state = DriverState::Flushing;
        let records = outbound.count() as u64;
        info!(
            stream = %self.sink.name(),
            records,
            bytes = outbound.size_in_bytes(),
            "sending batch to sink"
        );

        match self.sink.send_batch(outbound) {
            Ok(()) => {
                DriverMetrics::add(&self.metrics.records_sent, records);
                Ok(())
            }
            Err(err) => {
                DriverMetrics::add(&self.metrics.sends_failed, 1);
                Err(err.into())
            }
        }
    }

    fn reject_batch<C: Channel + ?Sized>(&self, channel: &C, batch: &InboundBatch) -> AckDecision {
        let decision = AckDecision::NackAll;
        warn!(count = batch.len(), "driver terminated, nacking batch");
        let _ = apply_to_batch(decision, channel, batch);
        self.metrics.settled(decision, batch.len() as u64);
        decision
    }
}

fn log_message(message: &InboundMessage) {
    debug!(
        exchange = %message.exchange(),
        routing_key = %message.routing_key(),
        redelivered = message.fields.redelivered,
        "message received"
    );
    trace!(payload = %String::from_utf8_lossy(&message.content), "message payload");
}

impl<C, S, T> MessageHandler<C> for PipelineDriver<S, T>
where
    C: Channel,
    S: Sink + 'static,
    T: Terminator + 'static,
{
    fn handle_message(&mut self, channel: &C, message: InboundMessage) {
        self.process_message(channel, &message);
    }
}

impl<C, S, T> BatchHandler<C> for PipelineDriver<S, T>
where
    C: Channel,
    S: Sink + 'static,
    T: Terminator + 'static,
{
    fn handle_batch(&mut self, channel: &C, batch: InboundBatch) {
        self.process_batch(channel, &batch);
    }
}
