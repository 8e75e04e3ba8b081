// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! Fan-out broadcast to subscribed channels (spec §4.E).
//!
//! A [`Topic`] holds a copy-on-write snapshot of its subscribers: publishing
//! clones the snapshot `Arc`, never the subscriber list itself, so
//! `publish` never contends with `subscribe`/`unsubscribe` beyond a single
//! pointer swap.

use crate::config::ChannelConfig;
use crate::channel::Channel;
use crate::error::PublishError;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use parking_lot::Mutex;

#[derive(Clone)]
struct Subscriber<T> {
    id: u64,
    channel: Arc<Channel<T>>,
}

/// A fan-out broadcast point: every [`Topic::publish`] is cloned to every
/// currently-subscribed [`Channel`].
pub struct Topic<T> {
    subscribers: Mutex<Arc<Vec<Subscriber<T>>>>,
    next_id: AtomicU64,
}

impl<T> fmt::Debug for Topic<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Topic")
            .field("subscribers", &self.subscribers.lock().len())
            .finish()
    }
}

/// A subscription handle; dropping it unsubscribes.
pub struct Subscription<T: Clone + Send + Sync + 'static> {
    topic: Arc<Topic<T>>,
    id: u64,
    channel: Arc<Channel<T>>,
}

impl<T: Clone + Send + Sync + 'static> Subscription<T> {
    #[must_use]
    pub fn channel(&self) -> &Arc<Channel<T>> {
        &self.channel
    }
}

impl<T: Clone + Send + Sync + 'static> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.topic.unsubscribe(self.id);
    }
}

impl<T: Clone + Send + Sync + 'static> Topic<T> {
    #[must_use]
    pub fn new() -> Arc<Topic<T>> {
        Arc::new(Topic {
            subscribers: Mutex::new(Arc::new(Vec::new())),
            next_id: AtomicU64::new(0),
        })
    }

    /// Subscribes a new channel with the given configuration, returning a
    /// handle that unsubscribes on drop.
    pub fn subscribe(self: &Arc<Self>, config: ChannelConfig) -> Subscription<T> {
        let channel = Channel::with_config(config);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let mut subscribers = self.subscribers.lock();
        let mut next = (**subscribers).clone();
        next.push(Subscriber {
            id,
            channel: channel.clone(),
        });
        *subscribers = Arc::new(next);

        Subscription {
            topic: self.clone(),
            id,
            channel,
        }
    }

    fn unsubscribe(&self, id: u64) {
        let mut subscribers = self.subscribers.lock();
        if !subscribers.iter().any(|s| s.id == id) {
            return;
        }
        let next: Vec<_> = subscribers
            .iter()
            .filter(|s| s.id != id)
            .map(|s| Subscriber {
                id: s.id,
                channel: s.channel.clone(),
            })
            .collect();
        *subscribers = Arc::new(next);
    }

    /// Publishes `value` to every current subscriber, per each subscriber
    /// channel's own overflow policy. An individual subscriber rejecting
    /// the value (closed, or full under a non-blocking overflow policy) is
    /// not itself an error; but if every subscriber rejected it, that is
    /// surfaced as [`PublishError`] (spec §4.E) rather than swallowed.
    pub fn publish(&self, value: T) -> Result<(), PublishError> {
        let snapshot = self.subscribers.lock().clone();
        if snapshot.is_empty() {
            return Ok(());
        }
        let mut delivered = false;
        for sub in snapshot.iter() {
            if sub.channel.try_send(value.clone()).is_ok() {
                delivered = true;
            }
        }
        if delivered {
            Ok(())
        } else {
            Err(PublishError)
        }
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OverflowPolicy;

    #[test]
    fn every_subscriber_receives_every_publish() {
        let topic: Arc<Topic<i32>> = Topic::new();
        let a = topic.subscribe(ChannelConfig::default());
        let b = topic.subscribe(ChannelConfig::default());

        topic.publish(1).unwrap();
        topic.publish(2).unwrap();

        assert_eq!(a.channel().try_receive().unwrap(), 1);
        assert_eq!(a.channel().try_receive().unwrap(), 2);
        assert_eq!(b.channel().try_receive().unwrap(), 1);
        assert_eq!(b.channel().try_receive().unwrap(), 2);
    }

    #[test]
    fn dropping_a_subscription_stops_further_publishes() {
        let topic: Arc<Topic<i32>> = Topic::new();
        let a = topic.subscribe(ChannelConfig::default());
        let chan = a.channel().clone();
        drop(a);
        assert_eq!(topic.subscriber_count(), 0);
        topic.publish(1).unwrap();
        assert!(chan.try_receive().is_err());
    }

    #[test]
    fn publish_with_no_subscribers_is_not_an_error() {
        let topic: Arc<Topic<i32>> = Topic::new();
        topic.publish(1).unwrap();
    }

    #[test]
    fn publish_surfaces_an_error_when_every_subscriber_rejects_it() {
        let topic: Arc<Topic<i32>> = Topic::new();
        let config = ChannelConfig::builder().bounded(1).overflow(OverflowPolicy::Throw).build();
        let a = topic.subscribe(config.clone());
        let b = topic.subscribe(config);
        a.channel().try_send(0).unwrap();
        b.channel().try_send(0).unwrap();

        assert!(topic.publish(1).is_err());
    }
}
