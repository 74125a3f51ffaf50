use std::sync::Arc;

use heapless::Deque;
use parking_lot::{Condvar, Mutex};
use static_assertions::const_assert;
use tracing::debug;

use crate::command::Request;
use crate::error::EpsError;

/// Queue capacity. One slot per pending request; the board-side protocol
/// sizes its pending-command counter as a single byte, so the depth must
/// stay addressable in eight bits.
pub const MAX_QUEUE_DEPTH: usize = 255;

const_assert!(MAX_QUEUE_DEPTH <= u8::MAX as usize);

#[derive(Debug)]
struct Inner {
    slots: Deque<Arc<Request>, MAX_QUEUE_DEPTH>,
    closed: bool,
}

/// Bounded FIFO of pending requests, shared by all producers and the single
/// dispatcher.
///
/// The `closed` flag lives inside the same mutex as the slots, so an enqueue
/// racing a close resolves under one lock: the request is either rejected or
/// drained and cancelled, never stranded.
#[derive(Debug)]
pub(crate) struct CommandQueue {
    inner: Mutex<Inner>,
    nonempty: Condvar,
}

impl CommandQueue {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                slots: Deque::new(),
                closed: false,
            }),
            nonempty: Condvar::new(),
        }
    }

    /// Append a request in FIFO order and wake the dispatcher.
    ///
    /// Rejects with [`EpsError::QueueFull`] at capacity rather than blocking
    /// the producer; the bound is always enforced.
    pub(crate) fn enqueue(&self, request: Arc<Request>) -> Result<(), EpsError> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(EpsError::ShuttingDown);
        }
        if inner.slots.push_back(request).is_err() {
            return Err(EpsError::QueueFull);
        }
        self.nonempty.notify_one();
        Ok(())
    }

    /// Dispatcher-only: block until a request is available or the queue is
    /// closed. Returns `None` exactly when the queue is closed.
    pub(crate) fn wait_pop(&self) -> Option<Arc<Request>> {
        let mut inner = self.inner.lock();
        loop {
            if let Some(request) = inner.slots.pop_front() {
                return Some(request);
            }
            if inner.closed {
                return None;
            }
            self.nonempty.wait(&mut inner);
        }
    }

    /// Close the queue: reject future enqueues, cancel every pending request
    /// (waking its producer), and wake the dispatcher. Idempotent; returns
    /// the number of requests cancelled by this call.
    pub(crate) fn close(&self) -> usize {
        let mut inner = self.inner.lock();
        if inner.closed {
            return 0;
        }
        inner.closed = true;

        let mut cancelled = 0usize;
        while let Some(request) = inner.slots.pop_front() {
            request.cancel();
            cancelled += 1;
        }
        if cancelled > 0 {
            debug!(cancelled, "drained pending requests on close");
        }
        self.nonempty.notify_all();
        cancelled
    }

    pub(crate) fn len(&self) -> usize {
        self.inner.lock().slots.len()
    }
}
