// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Stackful, cooperatively-scheduled fibers (spec §4.A/§4.B's fiber half).
//!
//! A fiber is a [`corosensei::Coroutine`] with its own native stack, run to
//! completion one slice at a time by whichever [`crate::scheduler::Worker`]
//! currently holds it. [`suspend`] is the single suspension point every
//! blocking operation in this crate funnels through; see the module-level
//! discussion of the "current yielder" thread-local for how control finds
//! its way back to the right stack.

use crate::config::SpawnConfig;
use crate::error::JoinError;
use crate::park::Unparker;
use crate::scheduler::Scheduler;
use corosensei::stack::DefaultStack;
use corosensei::{Coroutine, CoroutineResult, Yielder};
use std::any::Any;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::marker::PhantomData;
use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicPtr, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use parking_lot::Mutex;
use std::time::Duration;

/// Unique identifier for a fiber, assigned at spawn time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FiberId(u64);

fn next_fiber_id() -> FiberId {
    static NEXT: AtomicU64 = AtomicU64::new(1);
    FiberId(NEXT.fetch_add(1, Ordering::Relaxed))
}

/// A unit of work the scheduler can run: "run one slice of this fiber".
pub(crate) trait FiberTask: Send + Sync {
    fn run_step(self: Arc<Self>);
}

type AnyYielder = Yielder<(), ()>;

thread_local! {
    static CURRENT_YIELDER: Cell<*const AnyYielder> = const { Cell::new(ptr::null()) };
    static CURRENT_FIBER: RefCell<Option<Arc<Shared>>> = const { RefCell::new(None) };
}

/// The control block shared between a fiber's [`JoinHandle`], the scheduler,
/// and anything that has a reason to wake it back up (a channel, a
/// selector, a val, a join).
pub(crate) struct Shared {
    id: FiberId,
    name: Option<String>,
    scheduler: Arc<Scheduler>,
    self_ref: Weak<Shared>,
    coroutine: Mutex<Option<Coroutine<(), (), (), DefaultStack>>>,
    yielder: AtomicPtr<AnyYielder>,
    queued: AtomicBool,
    pending_wake: AtomicBool,
    cancelled: AtomicBool,
    terminated: AtomicBool,
    result: Mutex<Option<Box<dyn Any + Send>>>,
    /// The panic payload if the fiber body unwound, instead of its `result`
    /// (spec §4.B: an uncaught failure terminates just this fiber, with
    /// joiners observing the cause rather than the OS thread unwinding).
    failure: Mutex<Option<Box<dyn Any + Send>>>,
    join_waiters: Mutex<Vec<Arc<dyn Unparker>>>,
}

impl fmt::Debug for Shared {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fiber")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("terminated", &self.terminated.load(Ordering::Relaxed))
            .finish()
    }
}

// Safety: `coroutine` is only ever resumed from within `run_step`, which
// takes the `Mutex` lock before touching it, so the non-`Send`/`Sync`
// raw-pointer internals of `corosensei::Coroutine` are never accessed
// concurrently or from more than one OS thread at a time — exactly the
// property the scheduler's worker pool (spec's "small pool of OS threads")
// depends on to move a parked fiber from one worker to another.
unsafe impl Send for Shared {}
unsafe impl Sync for Shared {}

impl Unparker for Shared {
    fn unpark(&self) {
        self.pending_wake.store(true, Ordering::Release);
        if !self.queued.swap(true, Ordering::AcqRel) {
            if let Some(arc) = self.self_ref.upgrade() {
                self.scheduler.spawn_task(arc);
            }
        }
    }
}

impl FiberTask for Shared {
    fn run_step(self: Arc<Self>) {
        let mut guard = self.coroutine.lock();
        let mut co = match guard.take() {
            Some(co) => co,
            None => return,
        };
        drop(guard);

        CURRENT_FIBER.with(|c| *c.borrow_mut() = Some(self.clone()));
        let yielder_ptr = self.yielder.load(Ordering::Acquire);
        CURRENT_YIELDER.with(|c| c.set(yielder_ptr.cast_const()));

        let result = co.resume(());

        CURRENT_YIELDER.with(|c| c.set(ptr::null()));
        CURRENT_FIBER.with(|c| *c.borrow_mut() = None);

        match result {
            CoroutineResult::Yield(()) => {
                *self.coroutine.lock() = Some(co);
                self.queued.store(false, Ordering::Release);
                if self.pending_wake.swap(false, Ordering::AcqRel)
                    && !self.queued.swap(true, Ordering::AcqRel)
                {
                    let scheduler = self.scheduler.clone();
                    scheduler.spawn_task(self);
                }
            }
            CoroutineResult::Return(()) => {
                self.terminated.store(true, Ordering::Release);
                self.wake_joiners();
            }
        }
    }
}

impl Shared {
    fn wake_joiners(&self) {
        for waiter in self.join_waiters.lock().drain(..) {
            waiter.unpark();
        }
    }

    fn park_joiner(&self, unparker: Arc<dyn Unparker>) {
        self.join_waiters.lock().push(unparker);
    }

    pub(crate) fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::Acquire)
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    pub(crate) fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
        self.unpark();
    }

    pub(crate) fn id(&self) -> FiberId {
        self.id
    }

    pub(crate) fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

/// A handle to a spawned fiber's eventual result.
pub struct JoinHandle<T> {
    shared: Arc<Shared>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> fmt::Debug for JoinHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("JoinHandle").field(&self.shared).finish()
    }
}

impl<T: Send + 'static> JoinHandle<T> {
    /// This fiber's id.
    #[must_use]
    pub fn id(&self) -> FiberId {
        self.shared.id()
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.shared.is_terminated()
    }

    /// Requests cancellation; the fiber observes this at its next
    /// suspension point (spec §5's cooperative-cancellation rule).
    pub fn cancel(&self) {
        self.shared.cancel();
    }

    /// Blocks the calling strand until the fiber terminates.
    ///
    /// # Panics
    ///
    /// Panics if the fiber's result was already taken by a previous `join`.
    pub fn join(&self) -> Result<T, JoinError> {
        loop {
            if self.shared.is_terminated() {
                return self.take_outcome();
            }
            if crate::strand::current_is_cancelled() {
                return Err(JoinError::Cancelled);
            }
            self.shared.park_joiner(crate::strand::current_unparker());
            if self.shared.is_terminated() {
                return self.take_outcome();
            }
            crate::strand::park();
        }
    }

    /// Blocks the calling strand until the fiber terminates or `timeout`
    /// elapses, whichever comes first.
    pub fn join_timeout(&self, timeout: Duration) -> Result<T, JoinError> {
        let deadline = crate::time::Deadline::after(timeout);
        loop {
            if self.shared.is_terminated() {
                return self.take_outcome();
            }
            if crate::strand::current_is_cancelled() {
                return Err(JoinError::Cancelled);
            }
            if deadline.is_past() {
                return Err(JoinError::Timeout);
            }
            self.shared.park_joiner(crate::strand::current_unparker());
            if self.shared.is_terminated() {
                return self.take_outcome();
            }
            crate::strand::park_timeout(deadline.remaining());
        }
    }

    /// Takes this fiber's terminal outcome: its result, or the propagated
    /// cause if its body panicked (spec §4.B/§7 *Propagated*).
    fn take_outcome(&self) -> Result<T, JoinError> {
        if let Some(payload) = self.shared.failure.lock().take() {
            return Err(JoinError::Propagated(panic_cause(payload)));
        }
        let boxed = self
            .shared
            .result
            .lock()
            .take()
            .expect("fiber terminated without a result");
        Ok(*boxed
            .downcast::<T>()
            .expect("JoinHandle<T> result type mismatch"))
    }
}

/// Reduces a caught panic payload to its innermost message, unwrapping the
/// usual `&str`/`String` wrapper shapes `std::panic::catch_unwind` hands
/// back (spec §7's "unwrapping at most two wrapper layers").
fn panic_cause(payload: Box<dyn Any + Send>) -> crate::error::CloseCause {
    let message = if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "fiber panicked with a non-string payload".to_string()
    };
    Arc::new(message)
}

/// Spawns a fiber onto [`crate::scheduler::Scheduler::global`] with default
/// configuration.
pub fn spawn<F, T>(f: F) -> JoinHandle<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    spawn_with(SpawnConfig::default(), f)
}

/// Spawns a named fiber onto the global scheduler.
pub fn spawn_named<F, T>(name: impl Into<String>, f: F) -> JoinHandle<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let config = SpawnConfig::builder().name(name).build();
    spawn_with(config, f)
}

/// Spawns a fiber with explicit [`SpawnConfig`].
pub fn spawn_with<F, T>(config: SpawnConfig, f: F) -> JoinHandle<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let scheduler = config.scheduler.clone().unwrap_or_else(Scheduler::global);
    let stack = DefaultStack::new(config.stack_size)
        .expect("failed to allocate fiber stack");

    let shared = Arc::new_cyclic(|self_ref: &Weak<Shared>| {
        let coroutine = Coroutine::with_stack(stack, {
            let self_ref = self_ref.clone();
            move |yielder: &AnyYielder, ()| {
                if let Some(shared) = self_ref.upgrade() {
                    shared
                        .yielder
                        .store((yielder as *const AnyYielder).cast_mut(), Ordering::Release);
                }
                CURRENT_YIELDER.with(|c| c.set(yielder));
                match std::panic::catch_unwind(std::panic::AssertUnwindSafe(f)) {
                    Ok(result) => {
                        let boxed: Box<dyn Any + Send> = Box::new(result);
                        if let Some(shared) = self_ref.upgrade() {
                            *shared.result.lock() = Some(boxed);
                        }
                    }
                    Err(payload) => {
                        if let Some(shared) = self_ref.upgrade() {
                            *shared.failure.lock() = Some(payload);
                        }
                    }
                }
            }
        });

        Shared {
            id: next_fiber_id(),
            name: config.name.clone(),
            scheduler: scheduler.clone(),
            self_ref: self_ref.clone(),
            coroutine: Mutex::new(Some(coroutine)),
            yielder: AtomicPtr::new(ptr::null_mut()),
            queued: AtomicBool::new(true),
            pending_wake: AtomicBool::new(false),
            cancelled: AtomicBool::new(false),
            terminated: AtomicBool::new(false),
            result: Mutex::new(None),
            failure: Mutex::new(None),
            join_waiters: Mutex::new(Vec::new()),
        }
    });

    tracing::trace!(id = ?shared.id, name = ?shared.name, "spawned fiber");
    scheduler.spawn_task(shared.clone());

    JoinHandle {
        shared,
        _marker: PhantomData,
    }
}

/// Returns the currently-running fiber's shared state, or `None` if the
/// caller is a bare OS thread (not running inside the scheduler).
pub(crate) fn current() -> Option<Arc<Shared>> {
    CURRENT_FIBER.with(|c| c.borrow().clone())
}

/// The fundamental suspension point (spec §10.1). Returns control to
/// whichever worker is currently driving this fiber; if called from a bare
/// OS thread, degrades to a real OS-level block (`std::thread::park`).
///
/// Every blocking wait in this crate (channel send/receive, select, val
/// observe, join) must re-check its condition after `suspend` returns —
/// wake-ups are not guaranteed to mean the condition is now satisfied.
pub fn suspend() {
    let ptr = CURRENT_YIELDER.with(Cell::get);
    if ptr.is_null() {
        std::thread::park();
        return;
    }
    // Safety: `ptr` was stored by this very fiber's `run_step` immediately
    // before resuming it on this OS thread (or by the coroutine body on its
    // first invocation), and is only read while that fiber's stack is the
    // one actually executing — it is cleared the moment `resume` returns.
    let yielder = unsafe { &*ptr };
    yielder.suspend(());
}

/// Suspends the current fiber and immediately marks it runnable again,
/// giving other runnable work a chance to run first (spec §5's explicit
/// yield suspension point).
pub fn yield_now() {
    match current() {
        Some(shared) => {
            shared.unpark();
            suspend();
        }
        None => std::thread::yield_now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn spawn_and_join_returns_value() {
        let handle = spawn(|| 1 + 1);
        assert_eq!(handle.join().unwrap(), 2);
    }

    #[test]
    fn fiber_can_yield_repeatedly() {
        let counter = Arc::new(AtomicUsize::new(0));
        let c = counter.clone();
        let handle = spawn(move || {
            for _ in 0..10 {
                yield_now();
                c.fetch_add(1, Ordering::SeqCst);
            }
            c.load(Ordering::SeqCst)
        });
        assert_eq!(handle.join().unwrap(), 10);
    }

    #[test]
    fn join_timeout_elapses_for_a_long_running_fiber() {
        let handle: JoinHandle<()> = spawn(|| loop {
            yield_now();
        });
        let result = handle.join_timeout(Duration::from_millis(20));
        assert!(matches!(result, Err(JoinError::Timeout)));
        handle.cancel();
    }

    #[test]
    fn panicking_fiber_terminates_without_unwinding_the_worker() {
        let handle: JoinHandle<()> = spawn(|| panic!("deliberate failure"));
        let err = handle.join().unwrap_err();
        assert!(matches!(err, JoinError::Propagated(_)));

        // The worker thread that ran the panicking fiber must still be
        // alive and able to run more work afterwards.
        assert_eq!(spawn(|| 1 + 1).join().unwrap(), 2);
    }
}
