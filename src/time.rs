// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Deadlines shared by channel timeouts, select timeouts, and joins.
//!
//! Every timed operation in this crate (`send_timeout`, `receive_timeout`,
//! `select` with a timeout branch, `join` with a budget) converts its
//! `Duration` to an absolute [`Deadline`] once, at the start of the call, so
//! that retry loops compare against a fixed point in time rather than
//! re-deriving "now + duration" on every spurious wake-up.

use std::time::{Duration, Instant};

/// An absolute point in time a timed operation gives up at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Deadline(Instant);

impl Deadline {
    /// A deadline `dur` from now.
    #[must_use]
    pub fn after(dur: Duration) -> Self {
        Deadline(Instant::now() + dur)
    }

    /// A deadline that has already elapsed; used by `try_*` operations that
    /// share the parking/park-until machinery but must never actually park.
    #[must_use]
    pub fn elapsed() -> Self {
        Deadline(Instant::now())
    }

    /// A deadline that never elapses.
    #[must_use]
    pub fn never() -> Self {
        Deadline(Instant::now() + Duration::from_secs(365 * 24 * 60 * 60))
    }

    #[must_use]
    pub fn is_past(self) -> bool {
        Instant::now() >= self.0
    }

    #[must_use]
    pub fn remaining(self) -> Duration {
        self.0.saturating_duration_since(Instant::now())
    }

    #[must_use]
    pub fn into_instant(self) -> Instant {
        self.0
    }

    /// The earlier of two deadlines, used by [`crate::strand::join_all`] to
    /// derive each still-pending strand's share of an aggregate budget.
    #[must_use]
    pub fn min(self, other: Self) -> Self {
        Deadline(self.0.min(other.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn after_is_in_the_future() {
        let d = Deadline::after(Duration::from_millis(50));
        assert!(!d.is_past());
        assert!(d.remaining() <= Duration::from_millis(50));
    }

    #[test]
    fn elapsed_is_past() {
        std::thread::sleep(Duration::from_millis(1));
        assert!(Deadline::elapsed().is_past());
    }

    #[test]
    fn never_is_far_future() {
        assert!(!Deadline::never().is_past());
    }

    #[test]
    fn min_picks_earlier() {
        let a = Deadline::after(Duration::from_secs(10));
        let b = Deadline::after(Duration::from_millis(1));
        assert_eq!(a.min(b), b.min(a));
    }
}
