//! Bounded, closeable FIFO channel.
//!
//! Producers block (or get `Full`) when the channel is at capacity; consumers
//! block while it is empty. Closing wakes everyone: producers get their value
//! back, consumers drain what is left and then observe `Closed`.

use std::collections::VecDeque;
use std::fmt;
use std::time::{Duration, Instant};

use thiserror::Error;

use super::mutex::{Condvar, Mutex};
use crate::error::CoreError;

/// Error returned by push operations. Carries the rejected value back.
#[derive(Error, PartialEq, Eq)]
pub enum PushError<T> {
    /// The channel is at capacity.
    #[error("channel full")]
    Full(T),
    /// The channel has been closed.
    #[error("channel closed")]
    Closed(T),
}

impl<T> PushError<T> {
    /// Returns the value that could not be pushed.
    pub fn into_inner(self) -> T {
        match self {
            Self::Full(value) | Self::Closed(value) => value,
        }
    }
}

impl<T> fmt::Debug for PushError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full(_) => f.write_str("Full(..)"),
            Self::Closed(_) => f.write_str("Closed(..)"),
        }
    }
}

impl<T> From<PushError<T>> for CoreError {
    fn from(_: PushError<T>) -> Self {
        Self::ChannelClosed
    }
}

/// Error returned by pop operations.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PopError {
    /// Nothing queued (non-blocking pop only).
    #[error("channel empty")]
    Empty,
    /// Nothing arrived before the timeout.
    #[error("timed out waiting for channel")]
    Timeout,
    /// The channel is closed and drained.
    #[error("channel closed")]
    Closed,
}

impl From<PopError> for CoreError {
    fn from(_: PopError) -> Self {
        Self::ChannelClosed
    }
}

struct State<T> {
    queue: VecDeque<T>,
    closed: bool,
}

/// Fixed-capacity multi-producer multi-consumer FIFO.
pub struct BoundedChannel<T> {
    state: Mutex<State<T>>,
    not_empty: Condvar,
    not_full: Condvar,
    capacity: usize,
}

impl<T> BoundedChannel<T> {
    /// Creates a channel holding at most `capacity` values (minimum 1).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            state: Mutex::new(State {
                queue: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            capacity,
        }
    }

    /// Pushes a value, blocking while the channel is full.
    pub fn push(&self, value: T) -> Result<(), PushError<T>> {
        let mut state = self.state.lock();
        loop {
            if state.closed {
                return Err(PushError::Closed(value));
            }
            if state.queue.len() < self.capacity {
                state.queue.push_back(value);
                self.not_empty.notify_one();
                return Ok(());
            }
            self.not_full.wait(&mut state);
        }
    }

    /// Pushes a value without blocking.
    pub fn try_push(&self, value: T) -> Result<(), PushError<T>> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(PushError::Closed(value));
        }
        if state.queue.len() >= self.capacity {
            return Err(PushError::Full(value));
        }
        state.queue.push_back(value);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Pops the oldest value, blocking while the channel is empty.
    pub fn pop(&self) -> Result<T, PopError> {
        let mut state = self.state.lock();
        loop {
            if let Some(value) = state.queue.pop_front() {
                self.not_full.notify_one();
                return Ok(value);
            }
            if state.closed {
                return Err(PopError::Closed);
            }
            self.not_empty.wait(&mut state);
        }
    }

    /// Pops the oldest value without blocking.
    pub fn try_pop(&self) -> Result<T, PopError> {
        let mut state = self.state.lock();
        match state.queue.pop_front() {
            Some(value) => {
                self.not_full.notify_one();
                Ok(value)
            }
            None if state.closed => Err(PopError::Closed),
            None => Err(PopError::Empty),
        }
    }

    /// Pops the oldest value, waiting at most `timeout`.
    pub fn pop_timeout(&self, timeout: Duration) -> Result<T, PopError> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        loop {
            if let Some(value) = state.queue.pop_front() {
                self.not_full.notify_one();
                return Ok(value);
            }
            if state.closed {
                return Err(PopError::Closed);
            }
            if self.not_empty.wait_until(&mut state, deadline) {
                // One last look: a push may have raced the timeout.
                return match state.queue.pop_front() {
                    Some(value) => {
                        self.not_full.notify_one();
                        Ok(value)
                    }
                    None if state.closed => Err(PopError::Closed),
                    None => Err(PopError::Timeout),
                };
            }
        }
    }

    /// Closes the channel and wakes every blocked producer and consumer.
    ///
    /// Idempotent. Returns true if this call closed the channel.
    pub fn close(&self) -> bool {
        let mut state = self.state.lock();
        let was_open = !state.closed;
        state.closed = true;
        drop(state);
        self.not_empty.notify_all();
        self.not_full.notify_all();
        was_open
    }

    /// Returns true once [`close`](Self::close) has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Number of queued values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().queue.len()
    }

    /// Returns true if nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of queued values.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<T> fmt::Debug for BoundedChannel<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("BoundedChannel")
            .field("len", &state.queue.len())
            .field("capacity", &self.capacity)
            .field("closed", &state.closed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_fifo_order() {
        let chan = BoundedChannel::new(4);
        for i in 0..4 {
            chan.push(i).unwrap();
        }
        let drained: Vec<_> = (0..4).map(|_| chan.pop().unwrap()).collect();
        assert_eq!(drained, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_try_push_full() {
        let chan = BoundedChannel::new(1);
        chan.try_push(1).unwrap();
        assert_eq!(chan.try_push(2), Err(PushError::Full(2)));
        assert_eq!(chan.try_pop(), Ok(1));
        assert_eq!(chan.try_pop(), Err(PopError::Empty));
    }

    #[test]
    fn test_close_drains_then_reports_closed() {
        let chan = BoundedChannel::new(4);
        chan.push("a").unwrap();
        assert!(chan.close());
        assert!(!chan.close(), "second close is a no-op");

        assert_eq!(chan.push("b"), Err(PushError::Closed("b")));
        assert_eq!(chan.pop(), Ok("a"));
        assert_eq!(chan.pop(), Err(PopError::Closed));
    }

    #[test]
    fn test_close_wakes_blocked_consumer() {
        let chan: Arc<BoundedChannel<u32>> = Arc::new(BoundedChannel::new(2));
        let consumer = {
            let chan = Arc::clone(&chan);
            thread::spawn(move || chan.pop())
        };
        thread::sleep(Duration::from_millis(20));
        chan.close();
        assert_eq!(consumer.join().unwrap(), Err(PopError::Closed));
    }

    #[test]
    fn test_blocked_producer_resumes_after_pop() {
        let chan = Arc::new(BoundedChannel::new(1));
        chan.push(1).unwrap();
        let producer = {
            let chan = Arc::clone(&chan);
            thread::spawn(move || chan.push(2))
        };
        thread::sleep(Duration::from_millis(20));
        assert_eq!(chan.pop(), Ok(1));
        producer.join().unwrap().unwrap();
        assert_eq!(chan.pop(), Ok(2));
    }

    #[test]
    fn test_pop_timeout() {
        let chan: BoundedChannel<u8> = BoundedChannel::new(1);
        assert_eq!(
            chan.pop_timeout(Duration::from_millis(5)),
            Err(PopError::Timeout)
        );
    }
}
