// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! [`Strand`]: the "whoever is currently calling this" abstraction (spec
//! §4.A) that lets channels, selects, and vals park and wake a caller
//! without caring whether it is a bare OS thread or a fiber.

use crate::error::JoinError;
use crate::fiber::{self, FiberId, JoinHandle};
use crate::park::{ThreadUnparker, Unparker};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Identifies either a bare OS thread or a running fiber.
#[derive(Clone, PartialEq, Eq)]
pub enum Strand {
    /// A plain OS thread, not running inside a [`crate::scheduler::Scheduler`].
    Thread(std::thread::ThreadId),
    /// A fiber scheduled by a [`crate::scheduler::Scheduler`].
    Fiber(FiberId),
}

impl fmt::Debug for Strand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strand::Thread(id) => write!(f, "Strand::Thread({id:?})"),
            Strand::Fiber(id) => write!(f, "Strand::Fiber({id:?})"),
        }
    }
}

impl Strand {
    /// The strand currently executing: the running fiber if one is active
    /// on this OS thread, otherwise the OS thread itself.
    #[must_use]
    pub fn current() -> Strand {
        match fiber::current() {
            Some(shared) => Strand::Fiber(shared.id()),
            None => Strand::Thread(std::thread::current().id()),
        }
    }

    #[must_use]
    pub fn is_fiber(&self) -> bool {
        matches!(self, Strand::Fiber(_))
    }

    /// Blocks the calling OS thread for `dur`. If the caller is a fiber,
    /// only that fiber suspends — other fibers on the same worker keep
    /// running.
    pub fn sleep(dur: Duration) {
        if let Some(shared) = fiber::current() {
            let deadline = crate::time::Deadline::after(dur);
            let timer = crate::timer::spawn_timer(deadline, shared.clone());
            fiber::suspend();
            timer.cancel();
        } else {
            std::thread::sleep(dur);
        }
    }
}

/// `true` if the calling strand has been asked to cancel (a fiber's
/// [`crate::fiber::JoinHandle::cancel`] was called).
pub(crate) fn current_is_cancelled() -> bool {
    fiber::current().is_some_and(|f| f.is_cancelled())
}

/// An [`Unparker`] for whichever strand is calling right now.
pub(crate) fn current_unparker() -> Arc<dyn Unparker> {
    match fiber::current() {
        Some(shared) => shared,
        None => ThreadUnparker::current(),
    }
}

/// Parks the calling strand until unparked.
pub(crate) fn park() {
    fiber::suspend();
}

/// Parks the calling strand until unparked or `dur` elapses.
///
/// For a fiber this arms a one-shot scheduler timer that unparks it on
/// expiry; for a bare thread it uses `std::thread::park_timeout` directly.
pub(crate) fn park_timeout(dur: Duration) {
    match fiber::current() {
        Some(shared) => {
            let deadline = crate::time::Deadline::after(dur);
            let timer = crate::timer::spawn_timer(deadline, shared);
            fiber::suspend();
            timer.cancel();
        }
        None => std::thread::park_timeout(dur),
    }
}

/// Blocks until `handle`'s fiber terminates (spec §4.H's `join(s)` form).
pub fn join<T: Send + 'static>(handle: &JoinHandle<T>) -> Result<T, JoinError> {
    handle.join()
}

/// Blocks until `handle`'s fiber terminates or `timeout` elapses (spec
/// §4.H's `join(s, dur)` form).
pub fn join_timeout<T: Send + 'static>(handle: &JoinHandle<T>, timeout: Duration) -> Result<T, JoinError> {
    handle.join_timeout(timeout)
}

/// Joins every handle in `handles` in turn against one shared deadline
/// (spec §4.H's `join(collection, dur, unit)`): `timeout` is a single
/// budget for the whole collection, not a per-handle duration, so each
/// successive `join_timeout` call gets whatever is left of it once the
/// previous strands have actually terminated.
pub fn join_all<T, I>(handles: I, timeout: Duration) -> Result<Vec<T>, JoinError>
where
    T: Send + 'static,
    I: IntoIterator<Item = JoinHandle<T>>,
{
    let deadline = crate::time::Deadline::after(timeout);
    let mut results = Vec::new();
    for handle in handles {
        if deadline.is_past() {
            return Err(JoinError::Timeout);
        }
        results.push(handle.join_timeout(deadline.remaining())?);
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn current_on_bare_thread_is_a_thread_strand() {
        assert!(!Strand::current().is_fiber());
    }

    #[test]
    fn current_inside_a_fiber_is_a_fiber_strand() {
        let handle = crate::fiber::spawn(|| Strand::current().is_fiber());
        assert!(handle.join().unwrap());
    }
}
