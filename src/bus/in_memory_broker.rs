//! In-process broker for testing and single-process scenarios.
//!
//! `InMemoryBroker` implements the [`ConnectionManager`] contract with
//! queue semantics close enough to AMQP for the pipeline to rely on:
//! - deliveries get a fresh [`DeliveryTag`] and stay unacked until settled
//! - `nack(tag, true)` requeues at the message's original position, flagged
//!   redelivered
//! - `prefetch(n)` caps unacked deliveries; nothing more is handed out until
//!   something is settled
//! - batching consumers release a batch on size or elapsed time

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use super::channel::{BrokerError, Channel};
use super::connection::{BatchHandler, BatchingOptions, ConnectionManager, MessageHandler};
use super::consumer_thread::{ConsumerStats, ConsumerThread, StopSignal};
use super::message::{DeliveryTag, InboundBatch, InboundMessage, MessageFields};

/// How long consumer threads sleep when the queue is empty.
const POLL_INTERVAL: Duration = Duration::from_millis(1);

type ChannelSetup = dyn Fn(&InMemoryChannel) -> Result<(), String> + Send + Sync;

#[derive(Debug, Clone)]
struct Queued {
    seq: u64,
    fields: MessageFields,
    content: Vec<u8>,
}

#[derive(Debug, Clone)]
struct Unacked {
    seq: u64,
    queue: String,
    message: InboundMessage,
}

/// Copies of settled messages, kept only when enabled.
#[derive(Default)]
struct SettlementLog {
    acked: Vec<InboundMessage>,
    nacked: Vec<InboundMessage>,
}

#[derive(Default)]
struct BrokerState {
    queues: HashMap<String, VecDeque<Queued>>,
    unacked: HashMap<DeliveryTag, Unacked>,
    acked: usize,
    nacked: usize,
    log: Option<SettlementLog>,
    consumers: HashSet<String>,
    next_tag: u64,
    next_seq: u64,
    prefetch: Option<u16>,
    closed: bool,
}

impl BrokerState {
    fn prefetch_exhausted(&self) -> bool {
        self.prefetch
            .is_some_and(|limit| self.unacked.len() >= usize::from(limit))
    }

    fn take(&mut self, queue: &str) -> Option<InboundMessage> {
        if self.closed || self.prefetch_exhausted() {
            return None;
        }
        let queued = self.queues.get_mut(queue)?.pop_front()?;
        let seq = queued.seq;
        self.next_tag += 1;
        let tag = DeliveryTag(self.next_tag);
        let message = InboundMessage {
            content: queued.content,
            fields: queued.fields,
            delivery_tag: tag,
        };
        self.unacked.insert(
            tag,
            Unacked {
                seq,
                queue: queue.to_string(),
                message: message.clone(),
            },
        );
        Some(message)
    }

    fn settle(&mut self, tag: DeliveryTag) -> Result<Unacked, BrokerError> {
        if self.closed {
            return Err(BrokerError::ChannelClosed);
        }
        self.unacked
            .remove(&tag)
            .ok_or(BrokerError::UnknownDelivery(tag))
    }

    /// Put a delivery back at its original position in the queue.
    fn requeue(&mut self, entry: Unacked) {
        let mut fields = entry.message.fields;
        fields.redelivered = true;
        let queue = self.queues.entry(entry.queue).or_default();
        let at = queue.partition_point(|q| q.seq < entry.seq);
        queue.insert(
            at,
            Queued {
                seq: entry.seq,
                fields,
                content: entry.message.content,
            },
        );
    }
}

/// In-process broker implementing [`ConnectionManager`].
///
/// Cloning yields another handle to the same queues, so a test can keep one
/// handle for publishing and inspection while the pipeline consumes through
/// another.
///
/// Settlements are counted; the settled messages themselves are only kept
/// when [`with_settlement_log`](Self::with_settlement_log) is used, since a
/// nack-and-requeue loop settles the same message over and over.
///
/// ## Example
///
/// ```
/// use queue_shovel::bus::{Channel, ConnectionManager, InMemoryBroker};
///
/// let broker = InMemoryBroker::new().with_settlement_log();
/// broker.publish("orders", "", "order.created", b"{}".to_vec()).unwrap();
///
/// let channel = broker.consumer_channel().unwrap();
/// let msg = broker.take("orders").unwrap().unwrap();
/// channel.ack(msg.delivery_tag).unwrap();
///
/// assert_eq!(broker.acked_count(), 1);
/// assert_eq!(broker.acked()[0].routing_key(), "order.created");
/// ```
#[derive(Clone)]
pub struct InMemoryBroker {
    state: Arc<Mutex<BrokerState>>,
    setup: Option<Arc<ChannelSetup>>,
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(BrokerState::default())),
            setup: None,
        }
    }

    /// Run `setup` every time a consumer channel is opened. An `Err` fails
    /// channel creation with [`BrokerError::ChannelSetup`].
    pub fn with_channel_setup<F>(mut self, setup: F) -> Self
    where
        F: Fn(&InMemoryChannel) -> Result<(), String> + Send + Sync + 'static,
    {
        self.setup = Some(Arc::new(setup));
        self
    }

    /// Keep a copy of every settled message for [`acked`](Self::acked) and
    /// [`nacked`](Self::nacked). Grows without bound; meant for tests.
    pub fn with_settlement_log(self) -> Self {
        self.inspect().log.get_or_insert_with(SettlementLog::default);
        self
    }

    fn lock(&self, operation: &'static str) -> Result<MutexGuard<'_, BrokerState>, BrokerError> {
        self.state
            .lock()
            .map_err(|_| BrokerError::LockPoisoned(operation))
    }

    fn inspect(&self) -> MutexGuard<'_, BrokerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enqueue a message on `queue`.
    pub fn publish(
        &self,
        queue: &str,
        exchange: &str,
        routing_key: &str,
        content: impl Into<Vec<u8>>,
    ) -> Result<(), BrokerError> {
        let mut state = self.lock("publish")?;
        if state.closed {
            return Err(BrokerError::ChannelClosed);
        }
        state.next_seq += 1;
        let seq = state.next_seq;
        state.queues.entry(queue.to_string()).or_default().push_back(Queued {
            seq,
            fields: MessageFields {
                exchange: exchange.to_string(),
                routing_key: routing_key.to_string(),
                redelivered: false,
            },
            content: content.into(),
        });
        Ok(())
    }

    /// Pull the next ready message, honouring prefetch.
    pub fn take(&self, queue: &str) -> Result<Option<InboundMessage>, BrokerError> {
        Ok(self.lock("take")?.take(queue))
    }

    /// Close the connection. Unacked deliveries go back to their queues and
    /// further channel operations fail with [`BrokerError::ChannelClosed`].
    pub fn close(&self) {
        let mut state = self.inspect();
        let pending: Vec<Unacked> = state.unacked.drain().map(|(_, entry)| entry).collect();
        for entry in pending {
            state.requeue(entry);
        }
        state.closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.inspect().closed
    }

    /// Messages ready for delivery on `queue`.
    pub fn ready(&self, queue: &str) -> usize {
        self.inspect().queues.get(queue).map_or(0, VecDeque::len)
    }

    /// Delivered but not yet settled.
    pub fn unacked(&self) -> usize {
        self.inspect().unacked.len()
    }

    /// Number of acks so far.
    pub fn acked_count(&self) -> usize {
        self.inspect().acked
    }

    /// Number of nacks so far.
    pub fn nacked_count(&self) -> usize {
        self.inspect().nacked
    }

    /// Messages acknowledged so far, in settlement order. Empty unless the
    /// settlement log is enabled.
    pub fn acked(&self) -> Vec<InboundMessage> {
        self.inspect()
            .log
            .as_ref()
            .map(|log| log.acked.clone())
            .unwrap_or_default()
    }

    /// Messages negatively acknowledged so far, in settlement order. Empty
    /// unless the settlement log is enabled.
    pub fn nacked(&self) -> Vec<InboundMessage> {
        self.inspect()
            .log
            .as_ref()
            .map(|log| log.nacked.clone())
            .unwrap_or_default()
    }

    /// Current prefetch limit, if any.
    pub fn prefetch_limit(&self) -> Option<u16> {
        self.inspect().prefetch
    }

    /// Block until at least `count` deliveries have been settled or the
    /// timeout expires. Returns whether the count was reached.
    pub fn wait_for_settled(&self, count: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            {
                let state = self.inspect();
                if state.acked + state.nacked >= count {
                    return true;
                }
            }
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    fn claim_consumer(&self, queue: &str) -> Result<(), BrokerError> {
        let mut state = self.lock("register consumer")?;
        if !state.consumers.insert(queue.to_string()) {
            return Err(BrokerError::ConsumerExists(queue.to_string()));
        }
        Ok(())
    }

    fn release_consumer(&self, queue: &str) {
        self.inspect().consumers.remove(queue);
    }

    fn channel(&self) -> InMemoryChannel {
        InMemoryChannel {
            state: Arc::clone(&self.state),
        }
    }
}

impl ConnectionManager for InMemoryBroker {
    type Channel = InMemoryChannel;
    type Consumer = ConsumerThread;

    fn consumer_channel(&self) -> Result<InMemoryChannel, BrokerError> {
        if self.is_closed() {
            return Err(BrokerError::ConnectionFailed("broker closed".into()));
        }
        let channel = self.channel();
        if let Some(setup) = &self.setup {
            setup(&channel).map_err(BrokerError::ChannelSetup)?;
        }
        Ok(channel)
    }

    fn register_consumer<H>(&self, queue: &str, mut handler: H) -> Result<ConsumerThread, BrokerError>
    where
        H: MessageHandler<InMemoryChannel>,
    {
        self.claim_consumer(queue)?;
        let broker = self.clone();
        let channel = self.channel();
        let queue = queue.to_string();

        ConsumerThread::spawn(&format!("consumer-{queue}"), move |stop: StopSignal| {
            let mut stats = ConsumerStats::default();

            while !stop.is_set() {
                stats.polls += 1;
                match broker.take(&queue) {
                    Ok(Some(message)) => {
                        stats.deliveries += 1;
                        stats.messages += 1;
                        handler.handle_message(&channel, message);
                    }
                    Ok(None) => thread::sleep(POLL_INTERVAL),
                    Err(err) => {
                        warn!(queue = %queue, error = %err, "consumer poll failed");
                        thread::sleep(POLL_INTERVAL);
                    }
                }
            }

            broker.release_consumer(&queue);
            stats
        })
    }

    fn register_consumer_batch<H>(
        &self,
        queue: &str,
        mut handler: H,
        options: BatchingOptions,
    ) -> Result<ConsumerThread, BrokerError>
    where
        H: BatchHandler<InMemoryChannel>,
    {
        self.claim_consumer(queue)?;
        let broker = self.clone();
        let channel = self.channel();
        let queue = queue.to_string();

        ConsumerThread::spawn(&format!("batch-consumer-{queue}"), move |stop: StopSignal| {
            let mut stats = ConsumerStats::default();
            let mut pending: Vec<InboundMessage> = Vec::new();
            let mut pending_bytes = 0usize;
            let mut started: Option<Instant> = None;

            while !stop.is_set() {
                stats.polls += 1;
                let next = match broker.take(&queue) {
                    Ok(next) => next,
                    Err(err) => {
                        warn!(queue = %queue, error = %err, "batch consumer poll failed");
                        None
                    }
                };
                let idle = next.is_none();
                if let Some(message) = next {
                    pending_bytes += message.len();
                    started.get_or_insert_with(Instant::now);
                    pending.push(message);
                }

                let full = pending_bytes >= options.max_size_bytes;
                let expired = started.is_some_and(|t| t.elapsed() >= options.max_time);
                if !pending.is_empty() && (full || expired) {
                    let batch = InboundBatch::new(std::mem::take(&mut pending));
                    debug!(
                        queue = %queue,
                        count = batch.len(),
                        bytes = pending_bytes,
                        "releasing inbound batch"
                    );
                    stats.deliveries += 1;
                    stats.messages += batch.len();
                    pending_bytes = 0;
                    started = None;
                    handler.handle_batch(&channel, batch);
                } else if idle {
                    thread::sleep(POLL_INTERVAL);
                }
            }

            // Undelivered messages go back to the queue, as on a channel close.
            for message in pending {
                let _ = channel.nack(message.delivery_tag, true);
            }
            broker.release_consumer(&queue);
            stats
        })
    }
}

/// Channel handle onto an [`InMemoryBroker`].
#[derive(Clone)]
pub struct InMemoryChannel {
    state: Arc<Mutex<BrokerState>>,
}

impl InMemoryChannel {
    fn lock(&self, operation: &'static str) -> Result<MutexGuard<'_, BrokerState>, BrokerError> {
        self.state
            .lock()
            .map_err(|_| BrokerError::LockPoisoned(operation))
    }
}

impl Channel for InMemoryChannel {
    fn ack(&self, tag: DeliveryTag) -> Result<(), BrokerError> {
        let mut state = self.lock("ack")?;
        let entry = state.settle(tag)?;
        state.acked += 1;
        if let Some(log) = state.log.as_mut() {
            log.acked.push(entry.message);
        }
        Ok(())
    }

    fn nack(&self, tag: DeliveryTag, requeue: bool) -> Result<(), BrokerError> {
        let mut state = self.lock("nack")?;
        let entry = state.settle(tag)?;
        state.nacked += 1;
        if let Some(log) = state.log.as_mut() {
            log.nacked.push(entry.message.clone());
        }
        if requeue {
            state.requeue(entry);
        }
        Ok(())
    }

    fn prefetch(&self, count: u16) -> Result<(), BrokerError> {
        let mut state = self.lock("prefetch")?;
        if state.closed {
            return Err(BrokerError::ChannelClosed);
        }
        // AMQP treats a prefetch of zero as "no limit".
        state.prefetch = (count > 0).then_some(count);
        Ok(())
    }
}
