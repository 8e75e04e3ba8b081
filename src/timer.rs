// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! A small background timer service backing `sleep`/`*_timeout` suspension
//! points, analogous in role to the teacher's `kasync::time::Timer` (driven
//! from `Worker::run`'s `timer.try_turn()`) but kept to a single shared
//! background thread since this crate's workers are plain OS threads rather
//! than an async reactor loop.

use crate::park::Unparker;
use crate::time::Deadline;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, OnceLock};

struct State {
    heap: BinaryHeap<Reverse<(std::time::Instant, u64)>>,
    entries: HashMap<u64, Arc<dyn Unparker>>,
    cancelled: HashSet<u64>,
}

struct TimerService {
    state: Mutex<State>,
    condvar: Condvar,
    next_id: AtomicU64,
}

static TIMER: OnceLock<Arc<TimerService>> = OnceLock::new();

fn service() -> Arc<TimerService> {
    TIMER
        .get_or_init(|| {
            let service = Arc::new(TimerService {
                state: Mutex::new(State {
                    heap: BinaryHeap::new(),
                    entries: HashMap::new(),
                    cancelled: HashSet::new(),
                }),
                condvar: Condvar::new(),
                next_id: AtomicU64::new(1),
            });
            let worker = service.clone();
            std::thread::Builder::new()
                .name("skein-timer".into())
                .spawn(move || worker.run())
                .expect("failed to spawn timer thread");
            service
        })
        .clone()
}

impl TimerService {
    fn run(&self) {
        let mut state = self.state.lock().unwrap();
        loop {
            match state.heap.peek().copied() {
                None => {
                    state = self.condvar.wait(state).unwrap();
                }
                Some(Reverse((at, id))) => {
                    let now = std::time::Instant::now();
                    if now >= at {
                        state.heap.pop();
                        let was_cancelled = state.cancelled.remove(&id);
                        let unparker = state.entries.remove(&id);
                        drop(state);
                        if !was_cancelled {
                            if let Some(unparker) = unparker {
                                unparker.unpark();
                            }
                        }
                        state = self.state.lock().unwrap();
                    } else {
                        let (guard, _) = self.condvar.wait_timeout(state, at - now).unwrap();
                        state = guard;
                    }
                }
            }
        }
    }
}

/// A pending timer entry; dropping this without calling [`TimerHandle::cancel`]
/// just lets the timer fire as scheduled.
pub(crate) struct TimerHandle {
    id: u64,
    service: Arc<TimerService>,
}

impl TimerHandle {
    /// Prevents the timer from unparking its target, if it has not fired
    /// yet. Safe to call after it has already fired.
    pub(crate) fn cancel(&self) {
        let mut state = self.service.state.lock().unwrap();
        state.cancelled.insert(self.id);
        state.entries.remove(&self.id);
    }
}

/// Arms a one-shot timer that unparks `unparker` at `deadline`.
pub(crate) fn spawn_timer(deadline: Deadline, unparker: Arc<dyn Unparker>) -> TimerHandle {
    let service = service();
    let id = service.next_id.fetch_add(1, Ordering::Relaxed);
    {
        let mut state = service.state.lock().unwrap();
        state.heap.push(Reverse((deadline.into_instant(), id)));
        state.entries.insert(id, unparker);
    }
    service.condvar.notify_one();
    TimerHandle { id, service }
}
