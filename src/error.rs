// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! The error taxonomy used throughout this crate.
//!
//! Errors are never swallowed except where the component design explicitly
//! says so (drop/displace overflow, a second [`crate::val::Val::deliver`]).

use std::any::Any;
use std::fmt;

/// The cause a channel was closed with, if any.
pub type CloseCause = std::sync::Arc<dyn Any + Send + Sync + 'static>;

/// Error returned by [`crate::channel::Channel::send`].
#[derive(Debug)]
pub enum SendError<T> {
    /// The channel is closed; `cause` is the close cause, if one was given.
    Closed(T),
    /// The channel was full and its overflow policy is `throw`.
    Overflow(T),
    /// The calling strand was cancelled while parked on the producer queue.
    Cancelled,
}

impl<T> fmt::Display for SendError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SendError::Closed(_) => f.write_str("send on a closed channel"),
            SendError::Overflow(_) => f.write_str("channel full (overflow policy: throw)"),
            SendError::Cancelled => f.write_str("send cancelled"),
        }
    }
}

impl<T: fmt::Debug> std::error::Error for SendError<T> {}

/// Error returned by [`crate::channel::Channel::send_timeout`].
#[derive(Debug)]
pub enum SendTimeoutError<T> {
    Closed(T),
    Overflow(T),
    Timeout(T),
    Cancelled,
}

impl<T> fmt::Display for SendTimeoutError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SendTimeoutError::Closed(_) => f.write_str("send on a closed channel"),
            SendTimeoutError::Overflow(_) => f.write_str("channel full (overflow policy: throw)"),
            SendTimeoutError::Timeout(_) => f.write_str("send timed out"),
            SendTimeoutError::Cancelled => f.write_str("send cancelled"),
        }
    }
}

impl<T: fmt::Debug> std::error::Error for SendTimeoutError<T> {}

/// Error returned by [`crate::channel::Channel::try_send`].
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum TrySendError<T> {
    /// The channel is closed.
    Closed(T),
    /// There was no room and the overflow policy does not permit parking or
    /// silently discarding (i.e. it is `block` or `throw`).
    Full(T),
}

impl<T> fmt::Display for TrySendError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrySendError::Closed(_) => f.write_str("send on a closed channel"),
            TrySendError::Full(_) => f.write_str("channel full"),
        }
    }
}

impl<T: fmt::Debug> std::error::Error for TrySendError<T> {}

/// Error returned by [`crate::channel::Channel::receive`].
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum RecvError {
    /// The channel is closed with the given cause and fully drained.
    Closed(Option<CloseCauseDebug>),
    /// The calling strand was cancelled while parked on the consumer queue.
    Cancelled,
}

impl fmt::Display for RecvError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecvError::Closed(_) => f.write_str("receive on a closed, drained channel"),
            RecvError::Cancelled => f.write_str("receive cancelled"),
        }
    }
}

impl std::error::Error for RecvError {}

/// Debuggable, cloneable stand-in for a type-erased close cause.
///
/// [`CloseCause`] is `Arc<dyn Any + Send + Sync>`, which is neither `Debug`
/// nor directly comparable; this wraps it just enough to let [`RecvError`]
/// derive both.
#[derive(Clone)]
pub struct CloseCauseDebug(pub CloseCause);

impl fmt::Debug for CloseCauseDebug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CloseCause { .. }")
    }
}

impl Eq for CloseCauseDebug {}
impl PartialEq for CloseCauseDebug {
    fn eq(&self, other: &Self) -> bool {
        std::sync::Arc::ptr_eq(&self.0, &other.0)
    }
}

/// Error returned by [`crate::channel::Channel::receive_timeout`].
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum RecvTimeoutError {
    Closed(Option<CloseCauseDebug>),
    Timeout,
    Cancelled,
}

impl fmt::Display for RecvTimeoutError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecvTimeoutError::Closed(_) => f.write_str("receive on a closed, drained channel"),
            RecvTimeoutError::Timeout => f.write_str("receive timed out"),
            RecvTimeoutError::Cancelled => f.write_str("receive cancelled"),
        }
    }
}

impl std::error::Error for RecvTimeoutError {}

/// Error returned by [`crate::channel::Channel::try_receive`].
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum TryRecvError {
    /// The buffer is empty and the channel is still open.
    Empty,
    /// The channel is closed and fully drained.
    Closed(Option<CloseCauseDebug>),
}

impl fmt::Display for TryRecvError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TryRecvError::Empty => f.write_str("channel empty"),
            TryRecvError::Closed(_) => f.write_str("receive on a closed, drained channel"),
        }
    }
}

impl std::error::Error for TryRecvError {}

/// Error returned by [`crate::strand::join`].
#[derive(Debug)]
pub enum JoinError {
    /// The joined strand terminated with a failure cause (unwrapped from
    /// any execution-wrapper/runtime-wrapper layers).
    Propagated(CloseCause),
    /// The join's deadline elapsed before the strand terminated.
    Timeout,
    /// The calling strand was cancelled while parked on the join.
    Cancelled,
}

impl fmt::Display for JoinError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinError::Propagated(_) => f.write_str("joined strand terminated with a failure"),
            JoinError::Timeout => f.write_str("join timed out"),
            JoinError::Cancelled => f.write_str("join cancelled"),
        }
    }
}

impl std::error::Error for JoinError {}

/// Error returned when a [`crate::select::select`] call is interrupted before
/// any operation completes.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum SelectError {
    /// The calling strand was cancelled while parked in the selector.
    Cancelled,
    /// The selector's deadline elapsed with no operation ready.
    Timeout,
}

impl fmt::Display for SelectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectError::Cancelled => f.write_str("select cancelled"),
            SelectError::Timeout => f.write_str("select timed out"),
        }
    }
}

impl std::error::Error for SelectError {}

/// Error returned by [`crate::channel::topic::Topic::publish`] when every
/// current subscriber rejected the value (spec §4.E). A topic with no
/// subscribers at all is not a failure — there is simply nothing to fail.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct PublishError;

impl fmt::Display for PublishError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("publish failed: every subscriber rejected the value")
    }
}

impl std::error::Error for PublishError {}

/// Misuse of the API in a way that is a programming error, not a runtime
/// condition (e.g. constructing a [`crate::channel::Channel`] with an
/// invalid capacity). `IllegalState` is deliberately not used for the
/// "second deliver to a val" case, which spec §7 calls out as a silent no-op.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct IllegalState(pub &'static str);

impl fmt::Display for IllegalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "illegal state: {}", self.0)
    }
}

impl std::error::Error for IllegalState {}
