//! Consume-limit guard for single-message mode.

use tracing::info;

/// Messages consumed so far against the configured cap.
///
/// Owned by one driver instance; never reset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumeState {
    count: u64,
    limit: u64,
}

impl ConsumeState {
    /// `limit = 0` means unlimited.
    pub fn new(limit: u64) -> Self {
        Self { count: 0, limit }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    /// Record one consumed message, successful or not. Returns true when
    /// the cap has been reached and the process should stop.
    pub fn on_processed(&mut self) -> bool {
        self.count = self.count.saturating_add(1);
        self.limit > 0 && self.count >= self.limit
    }
}

/// How the driver halts once the consume limit is hit.
pub trait Terminator: Send {
    /// Called after the current delivery has been settled.
    fn terminate(&mut self, consumed: u64);
}

/// Exits the process with status 0. No drain, no cleanup.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessExit;

impl Terminator for ProcessExit {
    fn terminate(&mut self, consumed: u64) {
        info!(consumed, "consume limit reached, exiting");
        std::process::exit(0);
    }
}
