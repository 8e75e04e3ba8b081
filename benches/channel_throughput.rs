// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use skein::channel::Channel;
use skein::{ChannelConfig, OverflowPolicy};

fn unbounded_try_send_try_receive(c: &mut Criterion) {
    let ch: std::sync::Arc<Channel<usize>> = Channel::new();

    c.bench_function("unbounded_try_send_try_receive", |b| {
        b.iter(|| {
            ch.try_send(black_box(1)).unwrap();
            black_box(ch.try_receive().unwrap())
        });
    });
}

fn bounded_producer_consumer_fibers(c: &mut Criterion) {
    const MESSAGES: usize = 10_000;

    c.bench_function("bounded_producer_consumer_fibers", |b| {
        b.iter(|| {
            let ch: std::sync::Arc<Channel<usize>> =
                Channel::with_config(ChannelConfig::builder().bounded(64).build());
            let sender = {
                let ch = ch.clone();
                skein::fiber::spawn(move || {
                    for i in 0..MESSAGES {
                        ch.send(i).unwrap();
                    }
                })
            };
            let receiver = skein::fiber::spawn(move || {
                let mut sum = 0usize;
                for _ in 0..MESSAGES {
                    sum += ch.receive().unwrap();
                }
                sum
            });
            sender.join().unwrap();
            black_box(receiver.join().unwrap());
        });
    });
}

fn displace_overflow_publish(c: &mut Criterion) {
    c.bench_function("displace_overflow_publish", |b| {
        let ch: std::sync::Arc<Channel<usize>> = Channel::with_config(
            ChannelConfig::builder()
                .bounded(64)
                .overflow(OverflowPolicy::Displace)
                .build(),
        );
        b.iter(|| {
            ch.try_send(black_box(1)).unwrap();
        });
    });
}

criterion_group!(
    channel_throughput,
    unbounded_try_send_try_receive,
    bounded_producer_consumer_fibers,
    displace_overflow_publish,
);
criterion_main!(channel_throughput);
