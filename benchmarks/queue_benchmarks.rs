use std::sync::Arc;

use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use msg_queue::server::protocol::parse_command;
use msg_queue::{Message, MessageQueue};
use tokio::runtime::Runtime;

/// Benchmark: Single-threaded push operations
fn bench_push_single_thread(c: &mut Criterion) {
    let mut group = c.benchmark_group("push_single_thread");
    group.throughput(Throughput::Elements(1000));

    group.bench_function("push_1000", |b| {
        let payload = Bytes::from_static(b"benchmark payload");
        b.iter(|| {
            let queue = MessageQueue::new();
            for _ in 0..1000 {
                queue.push(Message::new(black_box(payload.clone())));
            }
            queue
        });
    });
    group.finish();
}

/// Benchmark: Push then pop round-trip
fn bench_roundtrip(c: &mut Criterion) {
    let queue = MessageQueue::new();
    let payload = Bytes::from_static(b"benchmark payload");

    c.bench_function("push_then_pop", |b| {
        b.iter(|| {
            queue.push(Message::new(payload.clone()));
            black_box(queue.pop())
        });
    });
}

/// Benchmark: Concurrent producers on a shared queue
fn bench_concurrent_producers(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("concurrent_producers");

    for num_producers in [2u64, 4, 8, 16].iter() {
        group.throughput(Throughput::Elements(*num_producers * 1000));
        group.bench_with_input(
            BenchmarkId::from_parameter(num_producers),
            num_producers,
            |b, &num_producers| {
                b.iter(|| {
                    rt.block_on(async {
                        let queue = Arc::new(MessageQueue::new());

                        let mut handles = vec![];
                        for _ in 0..num_producers {
                            let queue = queue.clone();
                            handles.push(tokio::spawn(async move {
                                for _ in 0..1000 {
                                    queue.push(Message::from("data"));
                                }
                            }));
                        }

                        for handle in handles {
                            handle.await.unwrap();
                        }
                    });
                });
            },
        );
    }
    group.finish();
}

/// Benchmark: Concurrent consumers draining a shared queue
fn bench_concurrent_consumers(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("concurrent_consumers");

    for num_consumers in [2u64, 4, 8, 16].iter() {
        group.throughput(Throughput::Elements(*num_consumers * 1000));
        group.bench_with_input(
            BenchmarkId::from_parameter(num_consumers),
            num_consumers,
            |b, &num_consumers| {
                b.iter(|| {
                    rt.block_on(async {
                        let queue = Arc::new(MessageQueue::new());
                        for _ in 0..(num_consumers * 1000) {
                            queue.push(Message::from("data"));
                        }

                        let mut handles = vec![];
                        for _ in 0..num_consumers {
                            let queue = queue.clone();
                            handles.push(tokio::spawn(async move {
                                for _ in 0..1000 {
                                    black_box(queue.pop());
                                }
                            }));
                        }

                        for handle in handles {
                            handle.await.unwrap();
                        }
                    });
                });
            },
        );
    }
    group.finish();
}

/// Benchmark: Command line parsing by payload size
fn bench_parse_push(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse_push");

    for size in [16usize, 1024, 65536].iter() {
        group.throughput(Throughput::Bytes(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let line = Bytes::from(format!("PUSH {}\r\n", "x".repeat(size)));
            b.iter(|| black_box(parse_command(line.clone())));
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_push_single_thread,
    bench_roundtrip,
    bench_concurrent_producers,
    bench_concurrent_consumers,
    bench_parse_push,
);

criterion_main!(benches);
