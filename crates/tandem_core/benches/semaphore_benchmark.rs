//! # Semaphore Benchmark
//!
//! Measures the cost of the primitive every frame pays for twice:
//! 1. Uncontended release + acquire on one thread
//! 2. A full ping-pong round trip between two threads

#![allow(missing_docs)]

use std::sync::Arc;
use std::thread;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use tandem_core::Semaphore;

fn bench_uncontended(c: &mut Criterion) {
    let sem = Semaphore::new("bench");
    c.bench_function("semaphore_release_acquire", |b| {
        b.iter(|| {
            sem.release();
            let _ = black_box(sem.acquire());
        });
    });
}

fn bench_round_trip(c: &mut Criterion) {
    let ping = Arc::new(Semaphore::new("ping"));
    let pong = Arc::new(Semaphore::new("pong"));

    let peer = {
        let ping = Arc::clone(&ping);
        let pong = Arc::clone(&pong);
        thread::spawn(move || {
            while ping.acquire().is_ok() {
                pong.release();
            }
        })
    };

    c.bench_function("semaphore_round_trip", |b| {
        b.iter(|| {
            ping.release();
            let _ = black_box(pong.acquire());
        });
    });

    ping.close();
    let _ = peer.join();
}

criterion_group!(benches, bench_uncontended, bench_round_trip);
criterion_main!(benches);
