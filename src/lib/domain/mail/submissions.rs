//! In-flight submission tracking
//!
//! Every submission holds a [`SubmissionGuard`] while it is being handed to
//! the dispatcher's queue. Shutdown closes the tracker and waits for the
//! count to reach zero before the queue itself is closed.

use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc,
};

use tokio::sync::Notify;

#[derive(Debug, Default)]
struct Inner {
    in_flight: AtomicUsize,
    closed: AtomicBool,
    drained: Notify,
}

/// Counts submissions that have started but not yet been queued
#[derive(Clone, Debug, Default)]
pub struct Submissions {
    inner: Arc<Inner>,
}

impl Submissions {
    /// Creates an open tracker with nothing in flight
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new submission.
    ///
    /// Returns [`None`] once the tracker has been closed.
    pub fn begin(&self) -> Option<SubmissionGuard> {
        self.inner.in_flight.fetch_add(1, Ordering::SeqCst);

        let guard = SubmissionGuard {
            inner: self.inner.clone(),
        };

        if self.inner.closed.load(Ordering::SeqCst) {
            return None;
        }

        Some(guard)
    }

    /// Number of submissions currently in flight
    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.load(Ordering::SeqCst)
    }

    /// Whether the tracker has been closed
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Refuses new submissions and waits for those in flight to finish
    pub async fn close_and_wait(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);

        loop {
            let drained = self.inner.drained.notified();
            tokio::pin!(drained);
            drained.as_mut().enable();

            if self.in_flight() == 0 {
                return;
            }

            drained.await;
        }
    }
}

/// Held for the duration of one submission
#[derive(Debug)]
pub struct SubmissionGuard {
    inner: Arc<Inner>,
}

impl Drop for SubmissionGuard {
    fn drop(&mut self) {
        if self.inner.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.inner.drained.notify_waiters();
        }
    }
}
