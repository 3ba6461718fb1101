//! Pipeline integration tests.
//!
//! Runs the full consume-batch-acknowledge path on the in-process broker:
//! - batch mode: one sink batch per inbound batch, one settlement for all
//! - single mode: one record per message, consume limit
//! - start-up: prefetch, channel setup failures, duplicate consumers

mod support;
mod batch;
mod single;
mod startup;
