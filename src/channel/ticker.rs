// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! A ticker channel and its independent consumers (spec §4.D).
//!
//! Unlike [`crate::channel::Channel`], a [`TickerChannel`] never blocks its
//! single producer: it is a fixed-size ring buffer of the most recent `N`
//! published values. Each [`TickerConsumer`] tracks its own monotonically
//! advancing cursor into that ring; a consumer that falls more than `N`
//! values behind is "lapped" — its cursor is skipped forward to the oldest
//! value still retained and the gap is reported once via
//! [`TickerRecvError::Lagged`].

use crate::park::Unparker;
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use parking_lot::Mutex;

struct State<T> {
    ring: VecDeque<Arc<T>>,
    base_seq: u64,
    consumer_waiters: Vec<Arc<dyn Unparker>>,
}

/// A fixed-capacity broadcast ring buffer with a single producer and many
/// independent consumers.
pub struct TickerChannel<T> {
    state: Mutex<State<T>>,
    capacity: usize,
    next_seq: AtomicU64,
    closed: AtomicBool,
}

impl<T> fmt::Debug for TickerChannel<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TickerChannel")
            .field("capacity", &self.capacity)
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish()
    }
}

/// Error returned by [`TickerConsumer::receive`]/`try_receive`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickerRecvError {
    /// This consumer fell behind and `n` values were skipped; its cursor now
    /// points at the oldest value still retained.
    Lagged(u64),
    /// No value has been published since this consumer's cursor, and the
    /// channel is still open.
    Empty,
    /// The channel is closed and fully drained for this consumer.
    Closed,
    Cancelled,
}

impl std::fmt::Display for TickerRecvError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TickerRecvError::Lagged(n) => write!(f, "ticker consumer lagged by {n} values"),
            TickerRecvError::Empty => f.write_str("no value published yet"),
            TickerRecvError::Closed => f.write_str("ticker channel closed"),
            TickerRecvError::Cancelled => f.write_str("receive cancelled"),
        }
    }
}

impl std::error::Error for TickerRecvError {}

impl<T: Send + Sync + 'static> TickerChannel<T> {
    /// Creates a ticker channel retaining the `capacity` most recently
    /// published values.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    #[must_use]
    pub fn new(capacity: usize) -> Arc<TickerChannel<T>> {
        assert!(capacity > 0, "a ticker channel needs capacity >= 1");
        Arc::new(TickerChannel {
            state: Mutex::new(State {
                ring: VecDeque::with_capacity(capacity),
                base_seq: 0,
                consumer_waiters: Vec::new(),
            }),
            capacity,
            next_seq: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        })
    }

    /// Publishes a value. Never blocks; if the ring is full the oldest
    /// value is evicted, lapping any consumer still pointing at it.
    pub fn publish(&self, value: T) {
        let mut state = self.state.lock();
        if state.ring.len() == self.capacity {
            state.ring.pop_front();
            state.base_seq += 1;
        }
        state.ring.push_back(Arc::new(value));
        self.next_seq.fetch_add(1, Ordering::AcqRel);
        let waiters = std::mem::take(&mut state.consumer_waiters);
        drop(state);
        for w in waiters {
            w.unpark();
        }
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Closes the channel; parked consumers wake with
    /// [`TickerRecvError::Closed`] once they catch up to the end of the
    /// retained ring.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let mut state = self.state.lock();
        let waiters = std::mem::take(&mut state.consumer_waiters);
        drop(state);
        for w in waiters {
            w.unpark();
        }
    }

    /// Creates a new consumer starting from the next value published after
    /// this call.
    #[must_use]
    pub fn consumer(self: &Arc<Self>) -> TickerConsumer<T> {
        TickerConsumer {
            channel: self.clone(),
            cursor: AtomicU64::new(self.next_seq.load(Ordering::Acquire)),
        }
    }
}

/// An independent read cursor into a [`TickerChannel`].
pub struct TickerConsumer<T> {
    channel: Arc<TickerChannel<T>>,
    cursor: AtomicU64,
}

impl<T> fmt::Debug for TickerConsumer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TickerConsumer")
            .field("cursor", &self.cursor.load(Ordering::Relaxed))
            .finish()
    }
}

impl<T: Clone + Send + Sync + 'static> TickerConsumer<T> {
    /// Attempts to advance without ever parking the caller.
    pub fn try_receive(&self) -> Result<T, TickerRecvError> {
        let state = self.channel.state.lock();
        let cursor = self.cursor.load(Ordering::Acquire);

        if cursor < state.base_seq {
            let lapped = state.base_seq - cursor;
            self.cursor.store(state.base_seq, Ordering::Release);
            return Err(TickerRecvError::Lagged(lapped));
        }

        let next_seq = self.channel.next_seq.load(Ordering::Acquire);
        if cursor < next_seq {
            let idx = usize::try_from(cursor - state.base_seq).expect("ring index fits usize");
            let value = (*state.ring[idx]).clone();
            self.cursor.store(cursor + 1, Ordering::Release);
            return Ok(value);
        }

        if self.channel.is_closed() {
            Err(TickerRecvError::Closed)
        } else {
            Err(TickerRecvError::Empty)
        }
    }

    /// Blocks until the next value is published, this consumer laps, or the
    /// channel closes.
    pub fn receive(&self) -> Result<T, TickerRecvError> {
        loop {
            let state = self.channel.state.lock();
            let cursor = self.cursor.load(Ordering::Acquire);

            if cursor < state.base_seq {
                let lapped = state.base_seq - cursor;
                self.cursor.store(state.base_seq, Ordering::Release);
                return Err(TickerRecvError::Lagged(lapped));
            }

            let next_seq = self.channel.next_seq.load(Ordering::Acquire);
            if cursor < next_seq {
                let idx = usize::try_from(cursor - state.base_seq).expect("ring index fits usize");
                let value = (*state.ring[idx]).clone();
                self.cursor.store(cursor + 1, Ordering::Release);
                return Ok(value);
            }

            if self.channel.is_closed() {
                return Err(TickerRecvError::Closed);
            }

            if crate::strand::current_is_cancelled() {
                return Err(TickerRecvError::Cancelled);
            }

            drop(state);
            self.channel
                .state
                .lock()
                .consumer_waiters
                .push(crate::strand::current_unparker());
            crate::strand::park();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn independent_consumers_each_see_every_value() {
        let ch: Arc<TickerChannel<i32>> = TickerChannel::new(4);
        let a = ch.consumer();
        ch.publish(1);
        let b = ch.consumer();
        ch.publish(2);

        assert_eq!(a.try_receive(), Ok(1));
        assert_eq!(a.try_receive(), Ok(2));
        assert_eq!(b.try_receive(), Ok(2));
    }

    #[test]
    fn slow_consumer_laps_and_skips_ahead() {
        let ch: Arc<TickerChannel<i32>> = TickerChannel::new(2);
        let slow = ch.consumer();
        ch.publish(1);
        ch.publish(2);
        ch.publish(3); // evicts 1; `slow` is now lapped by one value

        assert_eq!(slow.try_receive(), Err(TickerRecvError::Lagged(1)));
        assert_eq!(slow.try_receive(), Ok(2));
        assert_eq!(slow.try_receive(), Ok(3));
    }

    #[test]
    fn close_is_observed_once_caught_up() {
        let ch: Arc<TickerChannel<i32>> = TickerChannel::new(2);
        let c = ch.consumer();
        ch.publish(1);
        ch.close();
        assert_eq!(c.try_receive(), Ok(1));
        assert_eq!(c.try_receive(), Err(TickerRecvError::Closed));
    }
}
