// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Single-assignment dataflow cells (spec §4.G).
//!
//! A [`Val`] is delivered to at most once; a second [`Val::deliver`] is a
//! silent no-op (spec §7 — not an error). Any number of strands may
//! [`Val::observe`] it, blocking until delivery. A [`Val`] may optionally be
//! constructed with a deferred computation that runs once, on the first
//! `observe` call, rather than eagerly at construction time.

use crate::error::RecvTimeoutError;
use crate::park::Unparker;
use crate::time::Deadline;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use parking_lot::Mutex;
use std::time::Duration;

enum Deferred<T> {
    None,
    Pending(Box<dyn FnOnce() -> T + Send>),
    Running,
}

struct State<T> {
    value: Option<Arc<T>>,
    waiters: Vec<Arc<dyn Unparker>>,
    deferred: Deferred<T>,
}

/// A single-assignment, multi-observer dataflow cell.
pub struct Val<T> {
    state: Mutex<State<T>>,
    delivered: AtomicBool,
}

impl<T> fmt::Debug for Val<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Val")
            .field("delivered", &self.delivered.load(Ordering::Relaxed))
            .finish()
    }
}

impl<T: Send + Sync + 'static> Val<T> {
    /// Creates an undelivered val.
    #[must_use]
    pub fn new() -> Arc<Val<T>> {
        Arc::new(Val {
            state: Mutex::new(State {
                value: None,
                waiters: Vec::new(),
                deferred: Deferred::None,
            }),
            delivered: AtomicBool::new(false),
        })
    }

    /// Creates a val whose value is computed by `f`, once, the first time
    /// any strand calls [`Val::observe`]. `try_observe` never triggers it —
    /// only a blocking `observe` does, since a non-blocking call can't run
    /// an arbitrary computation without risking an unbounded stall.
    #[must_use]
    pub fn deferred<F>(f: F) -> Arc<Val<T>>
    where
        F: FnOnce() -> T + Send + 'static,
    {
        Arc::new(Val {
            state: Mutex::new(State {
                value: None,
                waiters: Vec::new(),
                deferred: Deferred::Pending(Box::new(f)),
            }),
            delivered: AtomicBool::new(false),
        })
    }

    /// Already-delivered val, for cases where the value is known up front.
    #[must_use]
    pub fn ready(value: T) -> Arc<Val<T>> {
        Arc::new(Val {
            state: Mutex::new(State {
                value: Some(Arc::new(value)),
                waiters: Vec::new(),
                deferred: Deferred::None,
            }),
            delivered: AtomicBool::new(true),
        })
    }

    #[must_use]
    pub fn is_delivered(&self) -> bool {
        self.delivered.load(Ordering::Acquire)
    }

    /// Delivers `value`. A second call (or a call after a deferred
    /// computation already delivered) is a silent no-op.
    pub fn deliver(&self, value: T) {
        let mut state = self.state.lock();
        if self.delivered.swap(true, Ordering::AcqRel) {
            return;
        }
        state.value = Some(Arc::new(value));
        let waiters = std::mem::take(&mut state.waiters);
        drop(state);
        for w in waiters {
            w.unpark();
        }
    }

    /// Returns the value without blocking, if already delivered.
    #[must_use]
    pub fn try_observe(&self) -> Option<Arc<T>> {
        self.state.lock().value.clone()
    }

    /// Blocks until the val is delivered, triggering this val's deferred
    /// computation (if any and if not already running/done) on first call.
    #[must_use]
    pub fn observe(self: &Arc<Self>) -> Arc<T> {
        self.run_deferred_if_needed();
        loop {
            let mut state = self.state.lock();
            if let Some(v) = &state.value {
                return v.clone();
            }
            state.waiters.push(crate::strand::current_unparker());
            drop(state);
            crate::strand::park();
        }
    }

    /// Blocks until the val is delivered or `timeout` elapses.
    pub fn observe_timeout(self: &Arc<Self>, timeout: Duration) -> Result<Arc<T>, RecvTimeoutError> {
        self.run_deferred_if_needed();
        let deadline = Deadline::after(timeout);
        loop {
            {
                let mut state = self.state.lock();
                if let Some(v) = &state.value {
                    return Ok(v.clone());
                }
                if deadline.is_past() {
                    return Err(RecvTimeoutError::Timeout);
                }
                state.waiters.push(crate::strand::current_unparker());
            }
            if crate::strand::current_is_cancelled() {
                return Err(RecvTimeoutError::Cancelled);
            }
            crate::strand::park_timeout(deadline.remaining());
        }
    }

    /// Runs this val's deferred computation, if any and if not already
    /// started, on a fresh fiber (spec §4.G) rather than inline on the
    /// observing strand — a deferred computation that itself suspends
    /// (channel op, another val, a sleep) must not block whichever strand
    /// happened to be the first observer.
    fn run_deferred_if_needed(self: &Arc<Self>) {
        let f = {
            let mut state = self.state.lock();
            match std::mem::replace(&mut state.deferred, Deferred::Running) {
                Deferred::Pending(f) => Some(f),
                other => {
                    state.deferred = other;
                    None
                }
            }
        };
        if let Some(f) = f {
            let handle = crate::fiber::spawn(f);
            if let Ok(value) = handle.join() {
                self.deliver(value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deliver_then_observe_returns_value() {
        let val: Arc<Val<i32>> = Val::new();
        val.deliver(5);
        assert_eq!(*val.observe(), 5);
    }

    #[test]
    fn second_deliver_is_a_silent_no_op() {
        let val: Arc<Val<i32>> = Val::new();
        val.deliver(1);
        val.deliver(2);
        assert_eq!(*val.observe(), 1);
    }

    #[test]
    fn multiple_observers_all_wake_on_delivery() {
        let val: Arc<Val<i32>> = Val::new();
        let a = val.clone();
        let b = val.clone();
        let ha = crate::fiber::spawn(move || *a.observe());
        let hb = crate::fiber::spawn(move || *b.observe());
        val.deliver(9);
        assert_eq!(ha.join().unwrap(), 9);
        assert_eq!(hb.join().unwrap(), 9);
    }

    #[test]
    fn deferred_computation_runs_once_on_first_observe() {
        use std::sync::atomic::AtomicUsize;
        let runs = Arc::new(AtomicUsize::new(0));
        let r = runs.clone();
        let val: Arc<Val<i32>> = Val::deferred(move || {
            r.fetch_add(1, Ordering::SeqCst);
            42
        });
        assert_eq!(*val.observe(), 42);
        assert_eq!(*val.observe(), 42);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn observe_timeout_elapses_on_undelivered_val() {
        let val: Arc<Val<i32>> = Val::new();
        let result = val.observe_timeout(Duration::from_millis(20));
        assert!(matches!(result, Err(RecvTimeoutError::Timeout)));
    }
}
