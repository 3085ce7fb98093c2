//! Dispatch queue - bounded blocking FIFO between the acceptor and workers
//!
//! One mutex guards the ring buffer; two condition variables signal
//! "not full" to producers and "not empty" to consumers.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard};

use crate::error::{EmsError, Result};

struct QueueState<T> {
    buffer: VecDeque<T>,
    closed: bool,
}

/// Fixed-capacity producer/consumer queue.
pub struct DispatchQueue<T> {
    state: Mutex<QueueState<T>>,
    not_full: Condvar,
    not_empty: Condvar,
    capacity: usize,
}

impl<T> std::fmt::Debug for DispatchQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchQueue")
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}

impl<T> DispatchQueue<T> {
    /// Create a queue holding at most `capacity` items.
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(EmsError::Config("dispatch queue capacity must be positive".into()));
        }
        Ok(Self {
            state: Mutex::new(QueueState {
                buffer: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            not_full: Condvar::new(),
            not_empty: Condvar::new(),
            capacity,
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, QueueState<T>>> {
        self.state
            .lock()
            .map_err(|e| EmsError::LockPoisoned(format!("dispatch queue: {}", e)))
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.lock()?.buffer.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    pub fn is_closed(&self) -> Result<bool> {
        Ok(self.lock()?.closed)
    }

    /// Insert at the tail, blocking while the queue is full.
    pub fn enqueue(&self, item: T) -> Result<()> {
        let guard = self.lock()?;
        let mut state = self
            .not_full
            .wait_while(guard, |s| !s.closed && s.buffer.len() == self.capacity)
            .map_err(|e| EmsError::LockPoisoned(format!("dispatch queue: {}", e)))?;

        if state.closed {
            return Err(EmsError::QueueClosed);
        }

        state.buffer.push_back(item);
        drop(state);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Remove from the head, blocking while the queue is empty.
    pub fn dequeue(&self) -> Result<T> {
        let guard = self.lock()?;
        let mut state = self
            .not_empty
            .wait_while(guard, |s| !s.closed && s.buffer.is_empty())
            .map_err(|e| EmsError::LockPoisoned(format!("dispatch queue: {}", e)))?;

        if state.closed {
            return Err(EmsError::QueueClosed);
        }

        let item = state.buffer.pop_front().ok_or(EmsError::QueueClosed)?;
        drop(state);
        self.not_full.notify_one();
        Ok(item)
    }

    /// Close the queue, dropping pending items and waking every waiter.
    /// Later enqueue/dequeue calls fail with `QueueClosed`.
    pub fn close(&self) -> Result<Vec<T>> {
        let mut state = self.lock()?;
        state.closed = true;
        let pending = state.buffer.drain(..).collect();
        drop(state);
        self.not_full.notify_all();
        self.not_empty.notify_all();
        Ok(pending)
    }
}
