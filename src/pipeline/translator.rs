//! Inbound message → outbound record.

use crate::bus::InboundMessage;
use crate::sink::{OutboundRecord, RecordBody};

/// Map one inbound message to a sink record.
///
/// Total: a payload that is not valid UTF-8 is carried as raw bytes.
pub fn translate(message: &InboundMessage) -> OutboundRecord {
    let body = match std::str::from_utf8(&message.content) {
        Ok(text) => RecordBody::Text(text.to_owned()),
        Err(_) => RecordBody::Binary(message.content.clone()),
    };
    OutboundRecord::new(body, message.routing_key())
}
