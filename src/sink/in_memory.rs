//! In-memory sink for tests and dry runs.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use super::{OutboundBatch, OutboundRecord, Sink, SinkError, DEFAULT_MAX_BATCH_BYTES};

#[derive(Default)]
struct Shared {
    sent: Mutex<Vec<Vec<OutboundRecord>>>,
    fail_sends: AtomicUsize,
    fail_always: AtomicBool,
    fail_create: AtomicBool,
    attempts: AtomicUsize,
}

/// A sink that keeps every sent batch in memory.
///
/// Clones share the same buffer, so a test can hand one clone to the
/// pipeline and inspect the other. Failures can be injected for the next
/// N sends, for every send, or for batch creation.
#[derive(Clone)]
pub struct InMemorySink {
    name: String,
    max_batch_bytes: usize,
    shared: Arc<Shared>,
}

impl Default for InMemorySink {
    fn default() -> Self {
        Self::new("in-memory")
    }
}

impl InMemorySink {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            max_batch_bytes: DEFAULT_MAX_BATCH_BYTES,
            shared: Arc::new(Shared::default()),
        }
    }

    /// Set the maximum batch size handed out by `create_batch`.
    pub fn with_max_batch_bytes(mut self, max: usize) -> Self {
        self.max_batch_bytes = max;
        self
    }

    /// Fail the next `count` sends.
    pub fn fail_next_sends(&self, count: usize) {
        self.shared.fail_sends.store(count, Ordering::SeqCst);
    }

    /// Fail every send until turned off.
    pub fn set_fail_always(&self, fail: bool) {
        self.shared.fail_always.store(fail, Ordering::SeqCst);
    }

    /// Fail `create_batch` until turned off.
    pub fn set_fail_create(&self, fail: bool) {
        self.shared.fail_create.store(fail, Ordering::SeqCst);
    }

    /// Batches that were sent successfully, in order.
    pub fn batches(&self) -> Vec<Vec<OutboundRecord>> {
        self.shared
            .sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// All successfully sent records, flattened in send order.
    pub fn records(&self) -> Vec<OutboundRecord> {
        self.batches().into_iter().flatten().collect()
    }

    /// Number of `send_batch` calls, successful or not.
    pub fn send_attempts(&self) -> usize {
        self.shared.attempts.load(Ordering::SeqCst)
    }

    fn should_fail(&self) -> bool {
        if self.shared.fail_always.load(Ordering::SeqCst) {
            return true;
        }
        self.shared
            .fail_sends
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl Sink for InMemorySink {
    fn name(&self) -> &str {
        &self.name
    }

    fn create_batch(&self) -> Result<OutboundBatch, SinkError> {
        if self.shared.fail_create.load(Ordering::SeqCst) {
            return Err(SinkError::Unavailable(format!("{} refused batch creation", self.name)));
        }
        Ok(OutboundBatch::new(self.max_batch_bytes))
    }

    fn send_batch(&mut self, batch: OutboundBatch) -> Result<(), SinkError> {
        self.shared.attempts.fetch_add(1, Ordering::SeqCst);
        if self.should_fail() {
            return Err(SinkError::Unavailable(format!("{} send failed", self.name)));
        }
        self.shared
            .sent
            .lock()
            .map_err(|_| SinkError::BufferPoisoned)?
            .push(batch.into_records());
        Ok(())
    }
}
