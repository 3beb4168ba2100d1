//! Monotonic time and one-shot delayed events.
//!
//! The scheduler posts an event back into the node's event channel after a
//! delay. Cancellation is best-effort: a cancelled task will not fire if it
//! has not been dispatched yet; an event already sitting in the channel is
//! still delivered.

use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::task::AbortHandle;

/// The node's monotonic clock.
///
/// Runs on tokio's clock, so paused-time tests control it.
#[must_use]
pub fn monotonic_now() -> Instant {
    tokio::time::Instant::now().into_std()
}

/// Best-effort cancellation handle for a scheduled event.
#[derive(Debug)]
pub struct CancelHandle {
    handle: AbortHandle,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.handle.abort();
    }
}

/// One-shot delayed event scheduler over an event channel.
#[derive(Debug)]
pub struct Scheduler<T> {
    tx: mpsc::Sender<T>,
}

impl<T: Send + 'static> Scheduler<T> {
    pub fn new(tx: mpsc::Sender<T>) -> Self {
        Self { tx }
    }

    /// Deliver `event` into the channel after `delay`.
    pub fn schedule(&self, delay: Duration, event: T) -> CancelHandle {
        let tx = self.tx.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // The receiver being gone just means the node is shutting down.
            let _ = tx.send(event).await;
        });
        CancelHandle {
            handle: task.abort_handle(),
        }
    }
}

impl<T> Clone for Scheduler<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}
