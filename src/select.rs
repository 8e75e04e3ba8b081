// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! The non-deterministic multi-way [`Select`] operator (spec §4.F).
//!
//! A `Select` holds a set of type-erased [`Selectable`] operations (channel
//! sends and receives). Resolving it tries every case once, in priority
//! order or a uniform-random order, committing the first one that succeeds;
//! if none are immediately ready, the calling strand registers on all of
//! them and parks, re-scanning on every wake-up until one resolves or the
//! deadline/cancellation sentinel wins instead.

use crate::channel::Channel;
use crate::error::{RecvError, SelectError, SendError, TryRecvError, TrySendError};
use crate::park::Unparker;
use crate::time::Deadline;
use std::any::Any;
use std::sync::Arc;
use parking_lot::Mutex;
use std::time::Duration;

/// One operation a [`Select`] can resolve.
///
/// `try_fire` must be non-blocking: `None` means "try again later", `Some`
/// means the case resolved (successfully or with a terminal error such as a
/// closed channel) and carries the type-erased outcome.
pub trait Selectable: Send + Sync {
    fn try_fire(&self) -> Option<Box<dyn Any + Send>>;
    fn park(&self, waiter: Arc<dyn Unparker>);
    /// Removes `waiter` from this case's wait queue again (spec §4.F: a
    /// losing case's registration must not outlive the `Select` call).
    fn unpark(&self, waiter: &Arc<dyn Unparker>);
}

/// A receive case: resolves to `Result<T, RecvError>`.
pub struct RecvCase<T> {
    channel: Arc<Channel<T>>,
}

impl<T: Send + 'static> RecvCase<T> {
    #[must_use]
    pub fn new(channel: Arc<Channel<T>>) -> Self {
        RecvCase { channel }
    }
}

impl<T: Send + 'static> Selectable for RecvCase<T> {
    fn try_fire(&self) -> Option<Box<dyn Any + Send>> {
        match self.channel.try_receive() {
            Ok(v) => Some(Box::new(Ok::<T, RecvError>(v))),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Closed(cause)) => {
                Some(Box::new(Err::<T, RecvError>(RecvError::Closed(cause))))
            }
        }
    }

    fn park(&self, waiter: Arc<dyn Unparker>) {
        self.channel.park_consumer(waiter);
    }

    fn unpark(&self, waiter: &Arc<dyn Unparker>) {
        self.channel.unpark_consumer(waiter);
    }
}

/// A send case: resolves to `Result<(), SendError<T>>`.
pub struct SendCase<T> {
    channel: Arc<Channel<T>>,
    value: Mutex<Option<T>>,
}

impl<T: Send + 'static> SendCase<T> {
    #[must_use]
    pub fn new(channel: Arc<Channel<T>>, value: T) -> Self {
        SendCase {
            channel,
            value: Mutex::new(Some(value)),
        }
    }
}

impl<T: Send + 'static> Selectable for SendCase<T> {
    fn try_fire(&self) -> Option<Box<dyn Any + Send>> {
        let value = self.value.lock().take()?;
        match self.channel.try_send(value) {
            Ok(()) => Some(Box::new(Ok::<(), SendError<T>>(()))),
            Err(TrySendError::Full(v)) => {
                *self.value.lock() = Some(v);
                None
            }
            Err(TrySendError::Closed(v)) => {
                Some(Box::new(Err::<(), SendError<T>>(SendError::Closed(v))))
            }
        }
    }

    fn park(&self, waiter: Arc<dyn Unparker>) {
        self.channel.park_producer(waiter);
    }

    fn unpark(&self, waiter: &Arc<dyn Unparker>) {
        self.channel.unpark_producer(waiter);
    }
}

/// How a [`Select`] picks among several simultaneously-ready operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SelectOrder {
    /// Earlier-registered cases win ties.
    #[default]
    Priority,
    /// Ties are broken uniformly at random.
    Random,
}

/// A set of operations to choose between (spec §4.F).
pub struct Select<'a> {
    cases: Vec<&'a dyn Selectable>,
    order: SelectOrder,
}

impl<'a> Default for Select<'a> {
    fn default() -> Self {
        Select::new()
    }
}

impl<'a> Select<'a> {
    #[must_use]
    pub fn new() -> Self {
        Select {
            cases: Vec::new(),
            order: SelectOrder::default(),
        }
    }

    #[must_use]
    pub fn order(mut self, order: SelectOrder) -> Self {
        self.order = order;
        self
    }

    #[must_use]
    pub fn case(mut self, case: &'a dyn Selectable) -> Self {
        self.cases.push(case);
        self
    }

    /// Blocks until one case resolves, returning its index and type-erased
    /// outcome.
    pub fn run(&self) -> Result<(usize, Box<dyn Any + Send>), SelectError> {
        self.run_until(None)
    }

    /// Blocks until one case resolves or `timeout` elapses.
    pub fn run_timeout(&self, timeout: Duration) -> Result<(usize, Box<dyn Any + Send>), SelectError> {
        self.run_until(Some(Deadline::after(timeout)))
    }

    fn scan_order(&self) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.cases.len()).collect();
        if self.order == SelectOrder::Random {
            fastrand::shuffle(&mut order);
        }
        order
    }

    fn run_until(&self, deadline: Option<Deadline>) -> Result<(usize, Box<dyn Any + Send>), SelectError> {
        assert!(!self.cases.is_empty(), "select with no cases would block forever");
        let waiter = crate::strand::current_unparker();
        let mut registered = false;

        let outcome = loop {
            let mut resolved = None;
            for i in self.scan_order() {
                if let Some(outcome) = self.cases[i].try_fire() {
                    resolved = Some(Ok((i, outcome)));
                    break;
                }
            }
            if let Some(resolved) = resolved {
                break resolved;
            }

            if crate::strand::current_is_cancelled() {
                break Err(SelectError::Cancelled);
            }
            if let Some(deadline) = deadline {
                if deadline.is_past() {
                    break Err(SelectError::Timeout);
                }
            }

            if !registered {
                for case in &self.cases {
                    case.park(waiter.clone());
                }
                registered = true;
            }

            match deadline {
                Some(d) => crate::strand::park_timeout(d.remaining()),
                None => crate::strand::park(),
            }
        };

        if registered {
            for case in &self.cases {
                case.unpark(&waiter);
            }
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::Channel;

    #[test]
    fn resolves_whichever_channel_is_ready() {
        let a: Arc<Channel<i32>> = Channel::new();
        let b: Arc<Channel<i32>> = Channel::new();
        b.try_send(42).unwrap();

        let recv_a = RecvCase::new(a.clone());
        let recv_b = RecvCase::new(b.clone());
        let select = Select::new().case(&recv_a).case(&recv_b);
        let (idx, outcome) = select.run().unwrap();
        assert_eq!(idx, 1);
        assert_eq!(*outcome.downcast::<Result<i32, RecvError>>().unwrap(), Ok(42));
    }

    #[test]
    fn priority_order_prefers_earlier_case_on_ties() {
        let a: Arc<Channel<i32>> = Channel::new();
        let b: Arc<Channel<i32>> = Channel::new();
        a.try_send(1).unwrap();
        b.try_send(2).unwrap();

        let recv_a = RecvCase::new(a.clone());
        let recv_b = RecvCase::new(b.clone());
        let select = Select::new().order(SelectOrder::Priority).case(&recv_a).case(&recv_b);
        let (idx, _) = select.run().unwrap();
        assert_eq!(idx, 0);
    }

    #[test]
    fn select_times_out_when_nothing_is_ready() {
        let a: Arc<Channel<i32>> = Channel::new();
        let recv_a = RecvCase::new(a);
        let select = Select::new().case(&recv_a);
        let result = select.run_timeout(Duration::from_millis(20));
        assert!(matches!(result, Err(SelectError::Timeout)));
    }

    #[test]
    fn closed_channel_resolves_immediately_instead_of_parking() {
        let a: Arc<Channel<i32>> = Channel::new();
        a.close(None);
        let recv_a = RecvCase::new(a);
        let select = Select::new().case(&recv_a);
        let (idx, outcome) = select.run().unwrap();
        assert_eq!(idx, 0);
        assert!(matches!(
            *outcome.downcast::<Result<i32, RecvError>>().unwrap(),
            Err(RecvError::Closed(_))
        ));
    }
}
