//! Background consumer thread: one worker per registered consumer.

use std::sync::mpsc::{channel, Receiver, Sender, TryRecvError};
use std::thread::{self, JoinHandle};

use super::channel::BrokerError;

/// Statistics from a consumer thread.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ConsumerStats {
    /// Handler invocations (messages in single mode, batches in batch mode)
    pub deliveries: usize,
    /// Messages handed to the handler
    pub messages: usize,
    /// Poll cycles completed
    pub polls: usize,
}

/// A background thread driving one registered consumer.
///
/// Spawn, let it consume, then `stop()` to collect stats. Exactly one thread
/// runs per registration, so handler invocations never overlap.
pub struct ConsumerThread {
    stop_tx: Sender<()>,
    handle: Option<JoinHandle<ConsumerStats>>,
}

/// Stop signal handed to the consumer loop.
pub struct StopSignal(Receiver<()>);

impl StopSignal {
    /// True once `stop()` was called or the handle dropped.
    pub fn is_set(&self) -> bool {
        match self.0.try_recv() {
            Ok(()) | Err(TryRecvError::Disconnected) => true,
            Err(TryRecvError::Empty) => false,
        }
    }
}

impl ConsumerThread {
    /// Spawn a named consumer thread running `body` until it returns.
    pub fn spawn<F>(name: &str, body: F) -> Result<Self, BrokerError>
    where
        F: FnOnce(StopSignal) -> ConsumerStats + Send + 'static,
    {
        let (stop_tx, stop_rx) = channel();
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || body(StopSignal(stop_rx)))
            .map_err(|e| BrokerError::Other(Box::new(e)))?;

        Ok(Self {
            stop_tx,
            handle: Some(handle),
        })
    }

    /// Signal the consumer to stop and wait for it to finish.
    /// Returns the consumer statistics.
    pub fn stop(mut self) -> ConsumerStats {
        let _ = self.stop_tx.send(());
        if let Some(handle) = self.handle.take() {
            handle.join().unwrap_or_default()
        } else {
            ConsumerStats::default()
        }
    }

    /// Whether the consumer loop has exited.
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, JoinHandle::is_finished)
    }
}

impl Drop for ConsumerThread {
    fn drop(&mut self) {
        let _ = self.stop_tx.send(());
        // Don't join on drop - let the thread finish naturally
    }
}
