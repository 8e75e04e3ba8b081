// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Explicit, constructible configuration for channels and spawns.
//!
//! Both [`ChannelConfig`] and [`SpawnConfig`] are plain aggregate structs
//! built through a chained `::builder()`, matching the teacher's
//! `fiber::Builder`/task-builder style rather than keyword-argument-style
//! construction.

use crate::scheduler::Scheduler;
use std::sync::Arc;

/// What a [`crate::channel::Channel`] does when a producer would otherwise
/// have to wait for room in a full buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverflowPolicy {
    /// Park the producer until room is available (or the channel closes).
    #[default]
    Block,
    /// Return `Err` to the producer immediately instead of waiting.
    Throw,
    /// Silently discard the new value; the buffer is unchanged.
    Drop,
    /// Evict the oldest buffered value to make room for the new one.
    Displace,
}

/// Capacity of a [`crate::channel::Channel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capacity {
    /// Capacity 0: a send only completes once a receiver is parked to take
    /// the value directly (no buffering at all).
    Rendezvous,
    /// A fixed positive buffer size.
    Bounded(usize),
    /// No fixed bound; `send` never blocks on room.
    Unbounded,
}

/// Configuration for constructing a [`crate::channel::Channel`].
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    pub(crate) capacity: Capacity,
    pub(crate) overflow: OverflowPolicy,
    pub(crate) single_producer: bool,
    pub(crate) single_consumer: bool,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        ChannelConfig {
            capacity: Capacity::Unbounded,
            overflow: OverflowPolicy::Block,
            single_producer: false,
            single_consumer: false,
        }
    }
}

impl ChannelConfig {
    #[must_use]
    pub fn builder() -> ChannelConfigBuilder {
        ChannelConfigBuilder::default()
    }
}

/// Builder for [`ChannelConfig`].
#[derive(Debug, Clone, Default)]
pub struct ChannelConfigBuilder {
    inner: ChannelConfig,
}

impl ChannelConfigBuilder {
    #[must_use]
    pub fn rendezvous(mut self) -> Self {
        self.inner.capacity = Capacity::Rendezvous;
        self
    }

    #[must_use]
    pub fn bounded(mut self, capacity: usize) -> Self {
        self.inner.capacity = Capacity::Bounded(capacity);
        self
    }

    #[must_use]
    pub fn unbounded(mut self) -> Self {
        self.inner.capacity = Capacity::Unbounded;
        self
    }

    #[must_use]
    pub fn overflow(mut self, policy: OverflowPolicy) -> Self {
        self.inner.overflow = policy;
        self
    }

    #[must_use]
    pub fn single_producer(mut self, yes: bool) -> Self {
        self.inner.single_producer = yes;
        self
    }

    #[must_use]
    pub fn single_consumer(mut self, yes: bool) -> Self {
        self.inner.single_consumer = yes;
        self
    }

    #[must_use]
    pub fn build(self) -> ChannelConfig {
        self.inner
    }
}

/// Configuration for spawning a fiber.
#[derive(Clone)]
pub struct SpawnConfig {
    pub(crate) name: Option<String>,
    pub(crate) stack_size: usize,
    pub(crate) scheduler: Option<Arc<Scheduler>>,
}

impl std::fmt::Debug for SpawnConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpawnConfig")
            .field("name", &self.name)
            .field("stack_size", &self.stack_size)
            .field("scheduler", &self.scheduler.is_some())
            .finish()
    }
}

/// Default stack size for a fiber, matching `corosensei`'s own default.
pub const DEFAULT_STACK_SIZE: usize = 1024 * 1024;

impl Default for SpawnConfig {
    fn default() -> Self {
        SpawnConfig {
            name: None,
            stack_size: DEFAULT_STACK_SIZE,
            scheduler: None,
        }
    }
}

impl SpawnConfig {
    #[must_use]
    pub fn builder() -> SpawnConfigBuilder {
        SpawnConfigBuilder::default()
    }
}

/// Builder for [`SpawnConfig`].
#[derive(Debug, Clone, Default)]
pub struct SpawnConfigBuilder {
    inner: SpawnConfig,
}

impl SpawnConfigBuilder {
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.inner.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn stack_size(mut self, bytes: usize) -> Self {
        self.inner.stack_size = bytes;
        self
    }

    #[must_use]
    pub fn scheduler(mut self, scheduler: Arc<Scheduler>) -> Self {
        self.inner.scheduler = Some(scheduler);
        self
    }

    #[must_use]
    pub fn build(self) -> SpawnConfig {
        self.inner
    }
}
