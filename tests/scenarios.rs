// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! End-to-end scenarios exercising fibers, channels, tickers, and select
//! together across real OS threads (rather than as in-module unit tests).

use skein::channel::ticker::TickerChannel;
use skein::channel::Channel;
use skein::error::RecvError;
use skein::select::{RecvCase, Select, SelectOrder};
use skein::{fiber, strand, ChannelConfig, JoinError, OverflowPolicy};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[test_log::test]
fn rendezvous_hand_off() {
    let ch: Arc<Channel<&'static str>> = Channel::with_config(
        ChannelConfig::builder().rendezvous().build(),
    );
    let sender = {
        let ch = ch.clone();
        fiber::spawn(move || ch.send("x").unwrap())
    };
    let receiver = {
        let ch = ch.clone();
        fiber::spawn(move || ch.receive().unwrap())
    };

    assert_eq!(receiver.join().unwrap(), "x");
    sender.join().unwrap();
}

#[test_log::test]
fn displace_overflow_keeps_the_newest_values() {
    let ch: Arc<Channel<i32>> = Channel::with_config(
        ChannelConfig::builder()
            .bounded(2)
            .overflow(OverflowPolicy::Displace)
            .build(),
    );
    ch.try_send(1).unwrap();
    ch.try_send(2).unwrap();
    ch.try_send(3).unwrap();

    assert_eq!(ch.try_receive().unwrap(), 2);
    assert_eq!(ch.try_receive().unwrap(), 3);
}

#[test_log::test]
fn ticker_consumers_advance_independently_and_lap_when_slow() {
    let ticker: Arc<TickerChannel<char>> = TickerChannel::new(3);
    let consumer_x = ticker.consumer();
    ticker.publish('a');
    ticker.publish('b');
    let consumer_y = ticker.consumer();
    ticker.publish('c');
    ticker.publish('d');
    ticker.publish('e');

    assert_eq!(consumer_x.try_receive(), Err(skein::channel::ticker::TickerRecvError::Lagged(2)));
    assert_eq!(consumer_x.try_receive().unwrap(), 'c');
    assert_eq!(consumer_x.try_receive().unwrap(), 'd');
    assert_eq!(consumer_x.try_receive().unwrap(), 'e');

    assert_eq!(consumer_y.try_receive().unwrap(), 'c');
    assert_eq!(consumer_y.try_receive().unwrap(), 'd');
    assert_eq!(consumer_y.try_receive().unwrap(), 'e');
}

#[test_log::test]
fn select_with_priority_order_always_prefers_the_first_ready_case() {
    for _ in 0..100 {
        let a: Arc<Channel<i32>> = Channel::new();
        let b: Arc<Channel<i32>> = Channel::new();
        a.try_send(1).unwrap();
        b.try_send(2).unwrap();

        let recv_a = RecvCase::new(a);
        let recv_b = RecvCase::new(b);
        let select = Select::new()
            .order(SelectOrder::Priority)
            .case(&recv_a)
            .case(&recv_b);
        let (idx, outcome) = select.run().unwrap();
        assert_eq!(idx, 0);
        assert_eq!(*outcome.downcast::<Result<i32, RecvError>>().unwrap(), Ok(1));
    }
}

#[test_log::test]
fn select_with_random_order_eventually_picks_both_cases() {
    let mut saw_first = false;
    let mut saw_second = false;
    for _ in 0..1000 {
        let a: Arc<Channel<i32>> = Channel::new();
        let b: Arc<Channel<i32>> = Channel::new();
        a.try_send(1).unwrap();
        b.try_send(2).unwrap();

        let recv_a = RecvCase::new(a);
        let recv_b = RecvCase::new(b);
        let select = Select::new()
            .order(SelectOrder::Random)
            .case(&recv_a)
            .case(&recv_b);
        let (idx, _) = select.run().unwrap();
        if idx == 0 {
            saw_first = true;
        } else {
            saw_second = true;
        }
        if saw_first && saw_second {
            break;
        }
    }
    assert!(saw_first && saw_second, "random select never covered both cases");
}

#[test_log::test]
fn select_over_empty_channels_times_out_within_budget() {
    let a: Arc<Channel<i32>> = Channel::new();
    let b: Arc<Channel<i32>> = Channel::new();
    let recv_a = RecvCase::new(a);
    let recv_b = RecvCase::new(b);
    let select = Select::new().case(&recv_a).case(&recv_b);

    let started = Instant::now();
    let result = select.run_timeout(Duration::from_millis(50));
    let elapsed = started.elapsed();

    assert!(matches!(result, Err(skein::error::SelectError::Timeout)));
    assert!(elapsed >= Duration::from_millis(50));
    assert!(elapsed < Duration::from_millis(200));
}

#[test_log::test]
fn close_with_cause_is_observed_by_every_subsequent_receive() {
    let ch: Arc<Channel<i32>> = Channel::new();
    let cause: skein::error::CloseCause = Arc::new("disconnected");
    ch.close(Some(cause));

    for _ in 0..2 {
        let err = ch.receive().unwrap_err();
        match err {
            RecvError::Closed(Some(_)) => {}
            other => panic!("expected a closed-with-cause error, got {other:?}"),
        }
    }
}

#[test_log::test]
fn join_all_times_out_while_a_slower_fiber_is_still_sleeping() {
    let fast_a = fiber::spawn(|| {
        std::thread::sleep(Duration::from_millis(20));
    });
    let fast_b = fiber::spawn(|| {
        std::thread::sleep(Duration::from_millis(20));
    });
    let slow = fiber::spawn(|| {
        std::thread::sleep(Duration::from_millis(500));
    });

    let result = strand::join_all(vec![fast_a, fast_b, slow], Duration::from_millis(120));
    assert!(matches!(result, Err(JoinError::Timeout)));
}
