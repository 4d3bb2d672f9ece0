//! Bounded, blocking, cancellable single-producer/single-consumer frame queue.
//!
//! **Why**: the loader thread and the clock tick share exactly one mutable
//! object. Backpressure lives here: `push` blocks the loader when the
//! consumer falls behind, `pop` bounds how long the owning thread waits.
//! Cancellation wakes both sides so reconfiguration never deadlocks.
//!
//! **Used by**: Sequence loader (producer), sequence clock (consumer),
//! sequence pipeline (flush/cancel during seek and teardown).
//!
//! # Contract
//!
//! - FIFO: pop order equals push order, no reordering, no duplicates
//! - `len() <= capacity` at all times; `push` blocks while full
//! - `cancel()` is idempotent, wakes every blocked caller, and is terminal:
//!   after it, `push` and `pop` return `Cancelled` immediately and nothing
//!   pushed afterwards is ever observed
//! - `flush()` drops all held entries (releasing their image handles) and
//!   unblocks a waiting producer
//!
//! One buffer instance serves one loader generation. Seek and trim changes
//! cancel the generation and start a new buffer, never reuse a cancelled one.

use log::trace;
use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};
use std::time::Duration;

use crate::frame::FrameBufferEntry;

/// Error returned to a producer whose generation was cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushError {
    Cancelled,
}

/// Consumer-side outcome for a bounded pop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PopError {
    /// Nothing arrived within the timeout. Transient: underrun, not end.
    Empty,
    /// Generation cancelled; no further entries will ever appear.
    Cancelled,
}

struct BufferState {
    queue: VecDeque<FrameBufferEntry>,
    cancelled: bool,
}

/// The shared queue. All synchronization in the sequence path lives here.
pub struct FrameBuffer {
    state: Mutex<BufferState>,
    not_full: Condvar,
    not_empty: Condvar,
    capacity: usize,
}

impl FrameBuffer {
    /// Create a buffer holding at most `capacity` entries (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            state: Mutex::new(BufferState {
                queue: VecDeque::with_capacity(capacity),
                cancelled: false,
            }),
            not_full: Condvar::new(),
            not_empty: Condvar::new(),
            capacity,
        }
    }

    /// Append an entry, blocking while the buffer is full.
    ///
    /// Returns `Err(Cancelled)` once the generation is cancelled; the entry
    /// is dropped, not enqueued.
    pub fn push(&self, entry: FrameBufferEntry) -> Result<(), PushError> {
        let guard = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let mut guard = self
            .not_full
            .wait_while(guard, |s| s.queue.len() >= self.capacity && !s.cancelled)
            .unwrap_or_else(|e| e.into_inner());

        if guard.cancelled {
            return Err(PushError::Cancelled);
        }

        guard.queue.push_back(entry);
        drop(guard);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Remove the oldest entry, waiting up to `timeout` for one to arrive.
    pub fn pop(&self, timeout: Duration) -> Result<FrameBufferEntry, PopError> {
        let guard = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let (mut guard, _) = self
            .not_empty
            .wait_timeout_while(guard, timeout, |s| s.queue.is_empty() && !s.cancelled)
            .unwrap_or_else(|e| e.into_inner());

        if guard.cancelled {
            return Err(PopError::Cancelled);
        }

        match guard.queue.pop_front() {
            Some(entry) => {
                drop(guard);
                self.not_full.notify_one();
                Ok(entry)
            }
            None => Err(PopError::Empty),
        }
    }

    /// Drop every held entry, releasing their decoded-image handles.
    /// A producer blocked on a full buffer is woken.
    pub fn flush(&self) {
        let mut guard = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let dropped = guard.queue.len();
        guard.queue.clear();
        drop(guard);
        if dropped > 0 {
            trace!("FrameBuffer: flushed {} entries", dropped);
        }
        self.not_full.notify_all();
    }

    /// Terminally cancel this generation. Idempotent; wakes every blocked
    /// `push`/`pop` with `Cancelled`.
    pub fn cancel(&self) {
        let mut guard = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if !guard.cancelled {
            guard.cancelled = true;
            trace!("FrameBuffer: cancelled ({} entries held)", guard.queue.len());
        }
        drop(guard);
        self.not_full.notify_all();
        self.not_empty.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).cancelled
    }

    pub fn len(&self) -> usize {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
