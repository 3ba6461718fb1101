//! Size-bounded outbound batch.

use crate::error::CapacityExceeded;

use super::record::OutboundRecord;

/// Framing bytes charged per record on top of its payload (message header,
/// property map encoding).
pub const RECORD_OVERHEAD_BYTES: usize = 32;

/// Default maximum batch size, matching common event-hub tiers (1 MiB).
pub const DEFAULT_MAX_BATCH_BYTES: usize = 1_048_576;

/// Ordered records bound for one sink send.
///
/// `try_add` is all-or-nothing: a record that would push the batch past
/// `max_size_bytes` is refused and the batch is left untouched.
#[derive(Debug, Clone)]
pub struct OutboundBatch {
    records: Vec<OutboundRecord>,
    size_in_bytes: usize,
    max_size_bytes: usize,
}

impl OutboundBatch {
    pub fn new(max_size_bytes: usize) -> Self {
        Self {
            records: Vec::new(),
            size_in_bytes: 0,
            max_size_bytes,
        }
    }

    /// Bytes `record` would add to a batch, framing included.
    pub fn framed_size(record: &OutboundRecord) -> usize {
        record.payload_size() + RECORD_OVERHEAD_BYTES
    }

    /// Append `record` if it fits.
    pub fn try_add(&mut self, record: OutboundRecord) -> Result<(), CapacityExceeded> {
        let record_bytes = Self::framed_size(&record);
        let projected = self.size_in_bytes.saturating_add(record_bytes);
        if projected > self.max_size_bytes {
            return Err(CapacityExceeded {
                record_bytes,
                current_bytes: self.size_in_bytes,
                max_bytes: self.max_size_bytes,
            });
        }
        self.size_in_bytes = projected;
        self.records.push(record);
        Ok(())
    }

    pub fn count(&self) -> usize {
        self.records.len()
    }

    pub fn size_in_bytes(&self) -> usize {
        self.size_in_bytes
    }

    pub fn max_size_bytes(&self) -> usize {
        self.max_size_bytes
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[OutboundRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<OutboundRecord> {
        self.records
    }
}
