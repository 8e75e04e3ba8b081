// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! The unparking half of the [`crate::strand::Strand`] abstraction.
//!
//! Every wait queue in this crate (channel producer/consumer queues, the
//! selector's park set, a val's observer list, a join's waiter list) stores
//! an `Arc<dyn Unparker>` rather than a strand-specific type, so the same
//! queue can hold a mix of bare OS threads and fibers — mirroring the
//! teacher's `Parker<P>`/`UnparkToken<P>` split in `park/parker.rs`, with
//! `P` fixed at "whatever the caller's [`crate::strand::Strand`] happens to
//! be" instead of a single park backend.

use std::fmt;
use std::sync::Arc;
use std::thread::Thread;

/// Wakes a single parked strand. Implemented for bare OS threads directly;
/// [`crate::fiber`] implements it for fibers via re-enqueueing onto a
/// [`crate::scheduler::Scheduler`].
pub(crate) trait Unparker: Send + Sync + fmt::Debug {
    fn unpark(&self);
}

/// [`Unparker`] for a bare OS thread, backed by `std::thread::Thread`'s
/// built-in park token.
#[derive(Debug, Clone)]
pub(crate) struct ThreadUnparker(Thread);

impl ThreadUnparker {
    pub(crate) fn current() -> Arc<Self> {
        Arc::new(ThreadUnparker(std::thread::current()))
    }
}

impl Unparker for ThreadUnparker {
    fn unpark(&self) {
        self.0.unpark();
    }
}
