// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! The work-stealing fiber scheduler (spec §4.B).
//!
//! A [`Scheduler`] owns a fixed pool of OS worker threads, each running a
//! [`worker::Worker`] loop lifted from the teacher's
//! `libs/kasync/src/executor.rs` `Worker::run`/`Worker::tick`/`try_steal`:
//! pop a runnable fiber from the worker's own `crossbeam_deque::Worker`
//! queue; if empty, try the global injector, then round-robin-steal from a
//! random starting peer; if still nothing, park until woken by a new spawn
//! or a channel/select/join wake-up.

mod worker;

use crate::fiber::FiberTask;
use crossbeam_deque::{Injector, Stealer, Worker as Deque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread::{self, Thread};
use worker::Worker;

/// A pool of worker threads that run spawned [`crate::fiber`]s to completion,
/// stealing work from each other's local queues when idle.
pub struct Scheduler {
    pub(crate) injector: Injector<Arc<dyn FiberTask>>,
    pub(crate) stealers: Vec<Stealer<Arc<dyn FiberTask>>>,
    parked: std::sync::Mutex<Vec<Thread>>,
    pub(crate) num_stealing: AtomicUsize,
    shutdown: AtomicBool,
    handles: std::sync::Mutex<Vec<thread::JoinHandle<()>>>,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("workers", &self.stealers.len())
            .finish()
    }
}

static GLOBAL: OnceLock<Arc<Scheduler>> = OnceLock::new();

impl Scheduler {
    /// Starts a new scheduler with `num_workers` OS worker threads.
    ///
    /// # Panics
    ///
    /// Panics if `num_workers` is zero, or if spawning a worker thread fails.
    #[must_use]
    pub fn new(num_workers: usize) -> Arc<Scheduler> {
        assert!(num_workers > 0, "a scheduler needs at least one worker");

        let deques: Vec<Deque<Arc<dyn FiberTask>>> =
            (0..num_workers).map(|_| Deque::new_fifo()).collect();
        let stealers = deques.iter().map(Deque::stealer).collect();

        let scheduler = Arc::new(Scheduler {
            injector: Injector::new(),
            stealers,
            parked: std::sync::Mutex::new(Vec::new()),
            num_stealing: AtomicUsize::new(0),
            shutdown: AtomicBool::new(false),
            handles: std::sync::Mutex::new(Vec::new()),
        });

        let mut handles = Vec::with_capacity(num_workers);
        let (tx, rx) = std::sync::mpsc::channel();

        for (id, deque) in deques.into_iter().enumerate() {
            let scheduler = scheduler.clone();
            let tx = tx.clone();
            let handle = thread::Builder::new()
                .name(format!("skein-worker-{id}"))
                .spawn(move || {
                    tx.send(thread::current()).ok();
                    let worker = Worker::new(id, scheduler, deque);
                    worker.run();
                })
                .expect("failed to spawn scheduler worker thread");
            handles.push(handle);
        }
        drop(tx);
        {
            let mut parked = scheduler.parked.lock().unwrap();
            for _ in 0..num_workers {
                if let Ok(t) = rx.recv() {
                    parked.push(t);
                }
            }
        }
        *scheduler.handles.lock().unwrap() = handles;

        scheduler
    }

    /// The process-wide default scheduler, lazily sized to
    /// `std::thread::available_parallelism()`.
    #[must_use]
    pub fn global() -> Arc<Scheduler> {
        GLOBAL
            .get_or_init(|| {
                let n = thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get);
                Scheduler::new(n)
            })
            .clone()
    }

    pub(crate) fn spawn_task(&self, task: Arc<dyn FiberTask>) {
        self.injector.push(task);
        self.wake_one();
    }

    fn wake_one(&self) {
        for t in self.parked.lock().unwrap().iter() {
            t.unpark();
        }
    }

    pub(crate) fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Number of worker threads in this scheduler.
    #[must_use]
    pub fn num_workers(&self) -> usize {
        self.stealers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize as AU;
    use std::sync::Arc as A;

    struct Counting(A<AU>, A<std::sync::Mutex<Vec<()>>>);
    impl FiberTask for Counting {
        fn run_step(self: Arc<Self>) {
            self.0.fetch_add(1, Ordering::SeqCst);
            self.1.lock().unwrap().push(());
        }
    }

    #[test]
    fn runs_spawned_tasks() {
        let sched = Scheduler::new(2);
        let counter = A::new(AU::new(0));
        let seen = A::new(std::sync::Mutex::new(Vec::new()));
        for _ in 0..32 {
            sched.spawn_task(A::new(Counting(counter.clone(), seen.clone())));
        }
        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(2);
        while counter.load(Ordering::SeqCst) < 32 && std::time::Instant::now() < deadline {
            thread::yield_now();
        }
        assert_eq!(counter.load(Ordering::SeqCst), 32);
    }
}
