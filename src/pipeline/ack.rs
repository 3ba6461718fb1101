//! Acknowledgement policy: forwarding outcome → ack or nack.
//!
//! With `ack_after_consume = false` a successfully forwarded message is
//! still nacked and the broker redelivers it. Operators use this for
//! dry runs; it is not an error path.

use tracing::error;

use crate::bus::{BrokerError, Channel, DeliveryTag, InboundBatch};
use crate::error::ProcessError;

/// What to tell the broker after a send attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckDecision {
    AckAll,
    NackAll,
    AckOne(DeliveryTag),
    NackOne(DeliveryTag),
}

impl AckDecision {
    pub fn is_ack(&self) -> bool {
        matches!(self, AckDecision::AckAll | AckDecision::AckOne(_))
    }
}

/// Decision for a whole inbound batch.
pub fn resolve_batch(ack_after_consume: bool, outcome: &Result<(), ProcessError>) -> AckDecision {
    match outcome {
        Ok(()) if ack_after_consume => AckDecision::AckAll,
        _ => AckDecision::NackAll,
    }
}

/// Decision for a single delivery.
pub fn resolve_single(
    ack_after_consume: bool,
    tag: DeliveryTag,
    outcome: &Result<(), ProcessError>,
) -> AckDecision {
    match outcome {
        Ok(()) if ack_after_consume => AckDecision::AckOne(tag),
        _ => AckDecision::NackOne(tag),
    }
}

/// Carry out a batch decision on the channel. Nacks requeue.
pub fn apply_to_batch<C: Channel + ?Sized>(
    decision: AckDecision,
    channel: &C,
    batch: &InboundBatch,
) -> Result<(), BrokerError> {
    let result = match decision {
        AckDecision::AckAll => batch.ack_all(channel),
        AckDecision::NackAll => batch.nack_all(channel),
        AckDecision::AckOne(tag) => channel.ack(tag),
        AckDecision::NackOne(tag) => channel.nack(tag, true),
    };
    if let Err(err) = &result {
        error!(?decision, count = batch.len(), error = %err, "failed to settle inbound batch");
    }
    result
}

/// Carry out a single-delivery decision on the channel. Nacks requeue.
pub fn apply_to_message<C: Channel + ?Sized>(
    decision: AckDecision,
    channel: &C,
) -> Result<(), BrokerError> {
    let result = match decision {
        AckDecision::AckOne(tag) => channel.ack(tag),
        AckDecision::NackOne(tag) => channel.nack(tag, true),
        AckDecision::AckAll | AckDecision::NackAll => {
            error!(?decision, "batch decision applied to a single delivery, ignored");
            return Ok(());
        }
    };
    if let Err(err) = &result {
        error!(?decision, error = %err, "failed to settle delivery");
    }
    result
}
