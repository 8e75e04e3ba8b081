// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! A single OS worker thread's run loop.
//!
//! Lifted from the teacher's `Worker::run`/`Worker::tick`/`Worker::try_steal`/
//! `Worker::steal_one_round` in `libs/kasync/src/executor.rs`, with
//! `cordyceps`'s intrusive queue swapped for `crossbeam_deque`.

use super::Scheduler;
use crate::fiber::FiberTask;
use crossbeam_deque::{Steal, Worker as Deque};
use crossbeam_utils::Backoff;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

const STEAL_ROUNDS: usize = 4;

pub(super) struct Worker {
    id: usize,
    scheduler: Arc<Scheduler>,
    deque: Deque<Arc<dyn FiberTask>>,
}

impl Worker {
    pub(super) fn new(id: usize, scheduler: Arc<Scheduler>, deque: Deque<Arc<dyn FiberTask>>) -> Self {
        Worker { id, scheduler, deque }
    }

    pub(super) fn run(&self) {
        let _span = tracing::debug_span!("worker", id = self.id).entered();
        loop {
            if self.scheduler.is_shutdown() {
                return;
            }
            if let Some(task) = self.tick() {
                task.run_step();
                continue;
            }
            // Nothing runnable anywhere; park until a new spawn or wake-up
            // unparks us. The timeout bounds how long a shutdown can be
            // missed for.
            std::thread::park_timeout(Duration::from_millis(50));
        }
    }

    fn tick(&self) -> Option<Arc<dyn FiberTask>> {
        if let Some(task) = self.deque.pop() {
            tracing::trace!(worker = self.id, "popped local task");
            return Some(task);
        }
        self.try_steal()
    }

    fn try_steal(&self) -> Option<Arc<dyn FiberTask>> {
        loop {
            match self.scheduler.injector.steal_batch_and_pop(&self.deque) {
                Steal::Success(task) => return Some(task),
                Steal::Retry => continue,
                Steal::Empty => break,
            }
        }

        self.scheduler.num_stealing.fetch_add(1, Ordering::AcqRel);
        let result = self.steal_one_round();
        self.scheduler.num_stealing.fetch_sub(1, Ordering::AcqRel);
        if result.is_some() {
            return result;
        }

        match self.scheduler.injector.steal_batch_and_pop(&self.deque) {
            Steal::Success(task) => Some(task),
            _ => None,
        }
    }

    fn steal_one_round(&self) -> Option<Arc<dyn FiberTask>> {
        let num_workers = self.scheduler.stealers.len();
        if num_workers <= 1 {
            return None;
        }

        let backoff = Backoff::new();
        for _ in 0..STEAL_ROUNDS {
            let start = fastrand::usize(0..num_workers);
            for offset in 0..num_workers {
                let victim = (start + offset) % num_workers;
                if victim == self.id {
                    continue;
                }
                match self.scheduler.stealers[victim].steal_batch_and_pop(&self.deque) {
                    Steal::Success(task) => return Some(task),
                    Steal::Retry => {
                        backoff.spin();
                    }
                    Steal::Empty => {}
                }
            }
            backoff.snooze();
        }
        None
    }
}
