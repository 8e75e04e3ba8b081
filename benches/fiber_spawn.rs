// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use skein::fiber;

fn spawn_and_join_one(c: &mut Criterion) {
    c.bench_function("spawn_and_join_one", |b| {
        b.iter(|| {
            let handle = fiber::spawn(|| black_box(1) + 1);
            handle.join().unwrap()
        });
    });
}

fn spawn_10k_yielding_fibers(c: &mut Criterion) {
    const YIELDS: usize = 10_000;

    c.bench_function("spawn_10k_yielding_fibers", |b| {
        b.iter(|| {
            let handle = fiber::spawn(|| {
                for _ in 0..YIELDS {
                    fiber::yield_now();
                }
            });
            handle.join().unwrap();
        });
    });
}

fn ping_pong_two_fibers(c: &mut Criterion) {
    const ROUNDS: usize = 10_000;

    c.bench_function("ping_pong_two_fibers", |b| {
        b.iter(|| {
            let h1 = fiber::spawn(|| {
                for _ in 0..ROUNDS {
                    fiber::yield_now();
                }
            });
            let h2 = fiber::spawn(|| {
                for _ in 0..ROUNDS {
                    fiber::yield_now();
                }
            });
            h1.join().unwrap();
            h2.join().unwrap();
        });
    });
}

criterion_group!(
    fiber_spawn,
    spawn_and_join_one,
    spawn_10k_yielding_fibers,
    ping_pong_two_fibers,
);
criterion_main!(fiber_spawn);
