// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Message-passing channels (spec §4.C).
//!
//! A [`Channel`] is a bounded, rendezvous, or unbounded queue with a
//! configurable [`OverflowPolicy`] for what `send` does when the buffer is
//! full. `send`/`receive` park the calling [`crate::strand::Strand`]
//! directly on the channel's own producer/consumer wait queues rather than
//! going through a condition variable, so both bare OS threads and fibers
//! can wait on the same channel.
//!
//! A capacity-0 (rendezvous) channel never buffers: it is handled by a
//! dedicated hand-off path (`*_rendezvous` methods below) instead of the
//! generic buffered one, since a plain "is the buffer full" check can never
//! express "only complete once a receiver is actually there to take it".

pub mod primitive;
pub mod ticker;
pub mod topic;

use crate::config::{Capacity, ChannelConfig, OverflowPolicy};
use crate::error::{
    CloseCauseDebug, RecvError, RecvTimeoutError, SendError, SendTimeoutError, TryRecvError,
    TrySendError,
};
use crate::park::Unparker;
use crate::time::Deadline;
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use parking_lot::Mutex;

/// A producer's offer of a value, parked on a rendezvous channel until a
/// consumer claims it directly (spec §4.C hand-off).
struct RendezvousOffer<T> {
    value: Mutex<Option<T>>,
    unparker: Arc<dyn Unparker>,
}

struct State<T> {
    buffer: VecDeque<T>,
    producer_waiters: Vec<Arc<dyn Unparker>>,
    consumer_waiters: Vec<Arc<dyn Unparker>>,
    rendezvous_producers: VecDeque<Arc<RendezvousOffer<T>>>,
    close_cause: Option<crate::error::CloseCause>,
}

/// A message-passing channel (spec §3/§4.C).
///
/// Cloning a `Channel` shares the same underlying queue — it is the `Arc`
/// handle, not a new channel.
pub struct Channel<T> {
    state: Mutex<State<T>>,
    config: ChannelConfig,
    closed: AtomicBool,
    producer_owner: Mutex<Option<crate::strand::Strand>>,
    consumer_owner: Mutex<Option<crate::strand::Strand>>,
}

impl<T> fmt::Debug for Channel<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .field("config", &self.config)
            .finish()
    }
}

fn capacity_of(config: &ChannelConfig) -> Option<usize> {
    match config.capacity {
        Capacity::Rendezvous => Some(0),
        Capacity::Bounded(n) => Some(n),
        Capacity::Unbounded => None,
    }
}

impl<T: Send + 'static> Channel<T> {
    /// Creates a new channel with default configuration (unbounded, block).
    #[must_use]
    pub fn new() -> Arc<Channel<T>> {
        Self::with_config(ChannelConfig::default())
    }

    /// Creates a new channel with explicit [`ChannelConfig`].
    #[must_use]
    pub fn with_config(config: ChannelConfig) -> Arc<Channel<T>> {
        Arc::new(Channel {
            state: Mutex::new(State {
                buffer: VecDeque::new(),
                producer_waiters: Vec::new(),
                consumer_waiters: Vec::new(),
                rendezvous_producers: VecDeque::new(),
                close_cause: None,
            }),
            config,
            closed: AtomicBool::new(false),
            producer_owner: Mutex::new(None),
            consumer_owner: Mutex::new(None),
        })
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Number of buffered values not yet received.
    pub fn len(&self) -> usize {
        self.state.lock().buffer.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The channel's declared capacity, or `None` if unbounded.
    #[must_use]
    pub fn capacity(&self) -> Option<usize> {
        capacity_of(&self.config)
    }

    fn is_rendezvous(&self) -> bool {
        capacity_of(&self.config) == Some(0)
    }

    /// Closes the channel with an optional cause. Every producer parked on
    /// `send` is woken with [`SendError::Closed`]; consumers are allowed to
    /// keep draining whatever is already buffered, then receive
    /// [`RecvError::Closed`].
    pub fn close(&self, cause: Option<crate::error::CloseCause>) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let mut state = self.state.lock();
        state.close_cause = cause;
        let producers = std::mem::take(&mut state.producer_waiters);
        let consumers = std::mem::take(&mut state.consumer_waiters);
        let rendezvous_producers = std::mem::take(&mut state.rendezvous_producers);
        drop(state);
        for w in producers {
            w.unpark();
        }
        for w in consumers {
            w.unpark();
        }
        for offer in rendezvous_producers {
            offer.unparker.unpark();
        }
        tracing::trace!("channel closed");
    }

    fn close_cause_debug(&self) -> Option<CloseCauseDebug> {
        let state = self.state.lock();
        state.close_cause.clone().map(CloseCauseDebug)
    }

    /// Panics if `single_producer` is set and a different strand has
    /// already sent on this channel.
    fn register_producer(&self) {
        if !self.config.single_producer {
            return;
        }
        Self::claim(&self.producer_owner, "single-producer channel given a second producer");
    }

    /// Panics if `single_consumer` is set and a different strand has
    /// already received from this channel.
    fn register_consumer(&self) {
        if !self.config.single_consumer {
            return;
        }
        Self::claim(&self.consumer_owner, "single-consumer channel given a second consumer");
    }

    fn claim(owner: &Mutex<Option<crate::strand::Strand>>, message: &'static str) {
        let current = crate::strand::Strand::current();
        let mut owner = owner.lock();
        match &*owner {
            Some(existing) if *existing == current => {}
            Some(_) => panic!("{message}"),
            None => *owner = Some(current),
        }
    }

    /// Sends a value, parking the caller if the buffer is full and the
    /// overflow policy is `block` (the default).
    pub fn send(&self, value: T) -> Result<(), SendError<T>> {
        match self.send_timeout_inner(value, None) {
            Ok(()) => Ok(()),
            Err(TimedSendError::Closed(v)) => Err(SendError::Closed(v)),
            Err(TimedSendError::Overflow(v)) => Err(SendError::Overflow(v)),
            Err(TimedSendError::Cancelled) => Err(SendError::Cancelled),
            Err(TimedSendError::Timeout(_)) => unreachable!("unbounded deadline cannot time out"),
        }
    }

    /// Sends a value, giving up after `timeout` if still unable to make
    /// room under a `block` overflow policy.
    pub fn send_timeout(&self, value: T, timeout: std::time::Duration) -> Result<(), SendTimeoutError<T>> {
        match self.send_timeout_inner(value, Some(Deadline::after(timeout))) {
            Ok(()) => Ok(()),
            Err(TimedSendError::Closed(v)) => Err(SendTimeoutError::Closed(v)),
            Err(TimedSendError::Overflow(v)) => Err(SendTimeoutError::Overflow(v)),
            Err(TimedSendError::Cancelled) => Err(SendTimeoutError::Cancelled),
            Err(TimedSendError::Timeout(v)) => Err(SendTimeoutError::Timeout(v)),
        }
    }

    /// Attempts to send without ever parking the caller.
    pub fn try_send(&self, value: T) -> Result<(), TrySendError<T>> {
        match self.try_send_inner(value) {
            TrySendOutcome::Sent => Ok(()),
            TrySendOutcome::Closed(v) => Err(TrySendError::Closed(v)),
            TrySendOutcome::WouldBlock(v) => Err(TrySendError::Full(v)),
            TrySendOutcome::Dropped | TrySendOutcome::Displaced => Ok(()),
        }
    }

    fn try_send_inner(&self, value: T) -> TrySendOutcome<T> {
        if self.is_rendezvous() {
            return self.try_send_rendezvous(value);
        }

        if self.is_closed() {
            return TrySendOutcome::Closed(value);
        }
        let mut state = self.state.lock();
        if self.is_closed() {
            return TrySendOutcome::Closed(value);
        }

        let full = capacity_of(&self.config).is_some_and(|cap| state.buffer.len() >= cap);
        if !full {
            state.buffer.push_back(value);
            let consumer = state.consumer_waiters.pop();
            drop(state);
            if let Some(w) = consumer {
                w.unpark();
            }
            return TrySendOutcome::Sent;
        }

        match self.config.overflow {
            OverflowPolicy::Block => TrySendOutcome::WouldBlock(value),
            OverflowPolicy::Throw => TrySendOutcome::WouldBlock(value),
            OverflowPolicy::Drop => TrySendOutcome::Dropped,
            OverflowPolicy::Displace => {
                state.buffer.pop_front();
                state.buffer.push_back(value);
                TrySendOutcome::Displaced
            }
        }
    }

    /// Non-blocking rendezvous send: succeeds only if a consumer is already
    /// parked waiting, in which case the value is handed to it directly
    /// (spec §4.C). Otherwise reports `WouldBlock` without ever touching
    /// `buffer` — a rendezvous channel's buffer stays empty except for the
    /// brief moment between this push and the woken consumer's pop.
    fn try_send_rendezvous(&self, value: T) -> TrySendOutcome<T> {
        let mut state = self.state.lock();
        if self.is_closed() {
            return TrySendOutcome::Closed(value);
        }
        if let Some(consumer) = state.consumer_waiters.pop() {
            state.buffer.push_back(value);
            drop(state);
            consumer.unpark();
            return TrySendOutcome::Sent;
        }
        TrySendOutcome::WouldBlock(value)
    }

    fn send_timeout_inner(&self, value: T, deadline: Option<Deadline>) -> Result<(), TimedSendError<T>> {
        if self.is_rendezvous() {
            return self.send_timeout_rendezvous(value, deadline);
        }
        self.send_timeout_bounded(value, deadline)
    }

    fn send_timeout_bounded(&self, mut value: T, deadline: Option<Deadline>) -> Result<(), TimedSendError<T>> {
        self.register_producer();
        loop {
            match self.try_send_inner(value) {
                TrySendOutcome::Sent | TrySendOutcome::Dropped | TrySendOutcome::Displaced => {
                    return Ok(())
                }
                TrySendOutcome::Closed(v) => return Err(TimedSendError::Closed(v)),
                TrySendOutcome::WouldBlock(v) => {
                    if self.config.overflow == OverflowPolicy::Throw {
                        return Err(TimedSendError::Overflow(v));
                    }
                    value = v;
                }
            }

            if crate::strand::current_is_cancelled() {
                return Err(TimedSendError::Cancelled);
            }
            if let Some(deadline) = deadline {
                if deadline.is_past() {
                    return Err(TimedSendError::Timeout(value));
                }
            }

            {
                let mut state = self.state.lock();
                if self.is_closed() {
                    return Err(TimedSendError::Closed(value));
                }
                let full = capacity_of(&self.config).is_some_and(|cap| state.buffer.len() >= cap);
                if !full {
                    continue;
                }
                state.producer_waiters.push(crate::strand::current_unparker());
            }

            match deadline {
                Some(d) => crate::strand::park_timeout(d.remaining()),
                None => crate::strand::park(),
            }
        }
    }

    /// Blocking rendezvous send: registers an offer carrying `value` and
    /// parks until a consumer claims it (or the channel closes, the caller
    /// is cancelled, or the deadline elapses — any of which reclaim the
    /// value out of the offer so it isn't silently lost).
    fn send_timeout_rendezvous(&self, value: T, deadline: Option<Deadline>) -> Result<(), TimedSendError<T>> {
        self.register_producer();

        match self.try_send_rendezvous(value) {
            TrySendOutcome::Sent => return Ok(()),
            TrySendOutcome::Closed(v) => return Err(TimedSendError::Closed(v)),
            TrySendOutcome::WouldBlock(v) => {
                if crate::strand::current_is_cancelled() {
                    return Err(TimedSendError::Cancelled);
                }
                if let Some(d) = deadline {
                    if d.is_past() {
                        return Err(TimedSendError::Timeout(v));
                    }
                }

                let offer = Arc::new(RendezvousOffer {
                    value: Mutex::new(Some(v)),
                    unparker: crate::strand::current_unparker(),
                });
                {
                    let mut state = self.state.lock();
                    if self.is_closed() {
                        let v = offer.value.lock().take().expect("offer not yet claimed");
                        return Err(TimedSendError::Closed(v));
                    }
                    state.rendezvous_producers.push_back(offer.clone());
                }

                loop {
                    match deadline {
                        Some(d) => crate::strand::park_timeout(d.remaining()),
                        None => crate::strand::park(),
                    }

                    if offer.value.lock().is_none() {
                        return Ok(());
                    }

                    let cancelled = crate::strand::current_is_cancelled();
                    let timed_out = deadline.is_some_and(Deadline::is_past);
                    if self.is_closed() || cancelled || timed_out {
                        let mut state = self.state.lock();
                        let Some(v) = offer.value.lock().take() else {
                            // Claimed by a consumer between our check above
                            // and taking the lock; treat as a success.
                            drop(state);
                            return Ok(());
                        };
                        state.rendezvous_producers.retain(|o| !Arc::ptr_eq(o, &offer));
                        drop(state);
                        return Err(if self.is_closed() {
                            TimedSendError::Closed(v)
                        } else if cancelled {
                            TimedSendError::Cancelled
                        } else {
                            TimedSendError::Timeout(v)
                        });
                    }
                }
            }
            TrySendOutcome::Dropped | TrySendOutcome::Displaced => {
                unreachable!("a rendezvous channel never drops or displaces")
            }
        }
    }

    /// Receives a value, parking the caller until one is available or the
    /// channel closes and drains.
    pub fn receive(&self) -> Result<T, RecvError> {
        match self.receive_timeout_inner(None) {
            Ok(v) => Ok(v),
            Err(TimedRecvError::Closed) => Err(RecvError::Closed(self.close_cause_debug())),
            Err(TimedRecvError::Cancelled) => Err(RecvError::Cancelled),
            Err(TimedRecvError::Timeout) => unreachable!("unbounded deadline cannot time out"),
        }
    }

    /// Receives a value, giving up after `timeout`.
    pub fn receive_timeout(&self, timeout: std::time::Duration) -> Result<T, RecvTimeoutError> {
        match self.receive_timeout_inner(Some(Deadline::after(timeout))) {
            Ok(v) => Ok(v),
            Err(TimedRecvError::Closed) => Err(RecvTimeoutError::Closed(self.close_cause_debug())),
            Err(TimedRecvError::Cancelled) => Err(RecvTimeoutError::Cancelled),
            Err(TimedRecvError::Timeout) => Err(RecvTimeoutError::Timeout),
        }
    }

    /// Registers `waiter` to be woken on the next successful send, without
    /// blocking. Used by [`crate::select`] to park on several channels at
    /// once.
    pub(crate) fn park_consumer(&self, waiter: Arc<dyn Unparker>) {
        self.state.lock().consumer_waiters.push(waiter);
    }

    /// Registers `waiter` to be woken on the next successful receive or
    /// close, without blocking.
    pub(crate) fn park_producer(&self, waiter: Arc<dyn Unparker>) {
        self.state.lock().producer_waiters.push(waiter);
    }

    /// Removes `waiter` from the consumer wait queue if still present
    /// (spec §4.F: a losing select case deregisters on resolution).
    pub(crate) fn unpark_consumer(&self, waiter: &Arc<dyn Unparker>) {
        self.state.lock().consumer_waiters.retain(|w| !Arc::ptr_eq(w, waiter));
    }

    /// Removes `waiter` from the producer wait queue if still present.
    pub(crate) fn unpark_producer(&self, waiter: &Arc<dyn Unparker>) {
        self.state.lock().producer_waiters.retain(|w| !Arc::ptr_eq(w, waiter));
    }

    /// Attempts to receive without ever parking the caller.
    pub fn try_receive(&self) -> Result<T, TryRecvError> {
        if self.is_rendezvous() {
            return self.try_receive_rendezvous();
        }

        let mut state = self.state.lock();
        if let Some(v) = state.buffer.pop_front() {
            let producer = state.producer_waiters.pop();
            drop(state);
            if let Some(w) = producer {
                w.unpark();
            }
            return Ok(v);
        }
        if self.is_closed() {
            drop(state);
            return Err(TryRecvError::Closed(self.close_cause_debug()));
        }
        Err(TryRecvError::Empty)
    }

    /// Non-blocking rendezvous receive: takes whatever a producer already
    /// handed off into `buffer`, or failing that claims the value straight
    /// out of the oldest parked producer's offer (spec §4.C's "receive must
    /// take directly from a parked producer").
    fn try_receive_rendezvous(&self) -> Result<T, TryRecvError> {
        let mut state = self.state.lock();
        if let Some(v) = state.buffer.pop_front() {
            return Ok(v);
        }
        while let Some(offer) = state.rendezvous_producers.pop_front() {
            if let Some(v) = offer.value.lock().take() {
                drop(state);
                offer.unparker.unpark();
                return Ok(v);
            }
            // Already reclaimed by a timed-out/cancelled/closed producer;
            // skip it and try the next one.
        }
        let closed = self.is_closed();
        drop(state);
        if closed {
            return Err(TryRecvError::Closed(self.close_cause_debug()));
        }
        Err(TryRecvError::Empty)
    }

    fn receive_timeout_inner(&self, deadline: Option<Deadline>) -> Result<T, TimedRecvError> {
        self.register_consumer();
        loop {
            match self.try_receive() {
                Ok(v) => return Ok(v),
                Err(TryRecvError::Closed(_)) => return Err(TimedRecvError::Closed),
                Err(TryRecvError::Empty) => {}
            }

            if crate::strand::current_is_cancelled() {
                return Err(TimedRecvError::Cancelled);
            }
            if let Some(deadline) = deadline {
                if deadline.is_past() {
                    return Err(TimedRecvError::Timeout);
                }
            }

            {
                let mut state = self.state.lock();
                let ready = !state.buffer.is_empty()
                    || !state.rendezvous_producers.is_empty()
                    || self.is_closed();
                if ready {
                    continue;
                }
                state.consumer_waiters.push(crate::strand::current_unparker());
            }

            match deadline {
                Some(d) => crate::strand::park_timeout(d.remaining()),
                None => crate::strand::park(),
            }
        }
    }
}

enum TrySendOutcome<T> {
    Sent,
    Dropped,
    Displaced,
    Closed(T),
    WouldBlock(T),
}

enum TimedSendError<T> {
    Closed(T),
    Overflow(T),
    Timeout(T),
    Cancelled,
}

enum TimedRecvError {
    Closed,
    Timeout,
    Cancelled,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChannelConfig;
    use std::time::Duration;

    #[test]
    fn rendezvous_hand_off() {
        let ch: Arc<Channel<i32>> = Channel::with_config(ChannelConfig::builder().rendezvous().build());
        let receiver = ch.clone();
        let handle = crate::fiber::spawn(move || receiver.receive().unwrap());
        ch.send(7).unwrap();
        assert_eq!(handle.join().unwrap(), 7);
    }

    #[test]
    fn rendezvous_hand_off_when_producer_arrives_first() {
        let ch: Arc<Channel<i32>> = Channel::with_config(ChannelConfig::builder().rendezvous().build());
        let sender = ch.clone();
        let handle = crate::fiber::spawn(move || sender.send(9).unwrap());
        assert_eq!(ch.receive().unwrap(), 9);
        handle.join().unwrap();
    }

    #[test]
    fn rendezvous_never_accumulates_more_than_one_buffered_value() {
        let ch: Arc<Channel<i32>> = Channel::with_config(ChannelConfig::builder().rendezvous().build());
        assert!(matches!(ch.try_send(1), Err(TrySendError::Full(1))));
        assert_eq!(ch.len(), 0);
    }

    #[test]
    fn bounded_throw_overflow() {
        let ch: Arc<Channel<i32>> = Channel::with_config(
            ChannelConfig::builder().bounded(1).overflow(OverflowPolicy::Throw).build(),
        );
        ch.send(1).unwrap();
        assert!(matches!(ch.try_send(2), Err(TrySendError::Full(2))));
    }

    #[test]
    fn displace_overflow_evicts_oldest() {
        let ch: Arc<Channel<i32>> = Channel::with_config(
            ChannelConfig::builder().bounded(2).overflow(OverflowPolicy::Displace).build(),
        );
        ch.try_send(1).unwrap();
        ch.try_send(2).unwrap();
        ch.try_send(3).unwrap();
        assert_eq!(ch.try_receive().unwrap(), 2);
        assert_eq!(ch.try_receive().unwrap(), 3);
    }

    #[test]
    fn drop_overflow_discards_new_value() {
        let ch: Arc<Channel<i32>> = Channel::with_config(
            ChannelConfig::builder().bounded(1).overflow(OverflowPolicy::Drop).build(),
        );
        ch.try_send(1).unwrap();
        ch.try_send(2).unwrap();
        assert_eq!(ch.try_receive().unwrap(), 1);
        assert!(matches!(ch.try_receive(), Err(TryRecvError::Empty)));
    }

    #[test]
    fn close_wakes_parked_producer_with_closed_error() {
        let ch: Arc<Channel<i32>> =
            Channel::with_config(ChannelConfig::builder().bounded(0).build());
        let producer = ch.clone();
        let handle = crate::fiber::spawn(move || producer.send(1));
        std::thread::sleep(Duration::from_millis(20));
        ch.close(None);
        assert!(matches!(handle.join().unwrap(), Err(SendError::Closed(1))));
    }

    #[test]
    fn close_drains_buffer_before_reporting_closed() {
        let ch: Arc<Channel<i32>> = Channel::new();
        ch.try_send(1).unwrap();
        ch.close(None);
        assert_eq!(ch.try_receive().unwrap(), 1);
        assert!(matches!(ch.try_receive(), Err(TryRecvError::Closed(_))));
    }

    #[test]
    fn receive_timeout_elapses_on_empty_open_channel() {
        let ch: Arc<Channel<i32>> = Channel::new();
        let result = ch.receive_timeout(Duration::from_millis(20));
        assert!(matches!(result, Err(RecvTimeoutError::Timeout)));
    }

    #[test]
    fn select_timeout_deregisters_its_waiter_from_the_channel() {
        let ch: Arc<Channel<i32>> = Channel::new();
        let recv = crate::select::RecvCase::new(ch.clone());
        let select = crate::select::Select::new().case(&recv);
        let result = select.run_timeout(Duration::from_millis(20));
        assert!(matches!(result, Err(crate::error::SelectError::Timeout)));
        assert_eq!(ch.state.lock().consumer_waiters.len(), 0);
    }
}
