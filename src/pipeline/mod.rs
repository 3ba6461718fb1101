//! Consume-batch-acknowledge pipeline
//!
//! ```text
//! broker ──(msg | batch)──→ PipelineDriver ──→ translate ──→ OutboundBatch
//!                                │                                │
//!                                │                          Sink::send_batch
//!                                ▼                                │
//!                     resolve ack/nack ←──────── outcome ─────────┘
//!                                │
//!                                ▼
//!                 Channel::ack / nack  →  ConsumeState (single mode)
//! ```
//!
//! Batch mode settles the whole inbound batch with one decision; single
//! mode settles one delivery and counts it against the consume limit.

mod ack;
mod driver;
mod guard;
mod processor;
mod translator;

pub use ack::{apply_to_batch, apply_to_message, resolve_batch, resolve_single, AckDecision};
pub use driver::{DriverState, DriverStats, DriverStatsHandle, PipelineDriver};
pub use guard::{ConsumeState, ProcessExit, Terminator};
pub use processor::{MessageProcessor, RunningPipeline};
pub use translator::translate;
