use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use foundation_sync::{BoxedError, Context, CyclicBarrier, TaskGroup};
use std::thread;
use std::time::Duration;

/// Benchmark a single-party barrier, which trips on every call.
fn bench_barrier_single_party(c: &mut Criterion) {
    let barrier = CyclicBarrier::new(1).unwrap();
    c.bench_function("barrier_single_party_trip", |b| {
        b.iter(|| black_box(barrier.wait().unwrap()));
    });
}

/// Benchmark full generations with N parties on N threads.
fn bench_barrier_generations(c: &mut Criterion) {
    let mut group = c.benchmark_group("barrier_100_generations");
    for parties in [2usize, 4, 8] {
        group.bench_with_input(BenchmarkId::from_parameter(parties), &parties, |b, &parties| {
            b.iter_batched(
                || CyclicBarrier::new(parties).unwrap(),
                |barrier| {
                    let workers: Vec<_> = (0..parties)
                        .map(|_| {
                            let barrier = barrier.clone();
                            thread::spawn(move || {
                                for _ in 0..100 {
                                    barrier.wait().unwrap();
                                }
                            })
                        })
                        .collect();
                    for worker in workers {
                        worker.join().unwrap();
                    }
                },
                BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

/// Benchmark the context-aware path against the plain wait.
fn bench_barrier_with_context(c: &mut Criterion) {
    let barrier = CyclicBarrier::new(1).unwrap();
    let (ctx, _cancel) = Context::background().with_timeout(Duration::from_secs(3600));
    c.bench_function("barrier_single_party_await_with_deadline", |b| {
        b.iter(|| black_box(barrier.await_with(&ctx).unwrap()));
    });
}

/// Benchmark submitting and awaiting 64 trivial tasks.
fn bench_task_group_fanout(c: &mut Criterion) {
    let mut group = c.benchmark_group("task_group_64_tasks");
    for limit in [None, Some(4usize), Some(16)] {
        let label = limit.map_or_else(|| "unlimited".to_string(), |l| l.to_string());
        group.bench_with_input(BenchmarkId::from_parameter(label), &limit, |b, &limit| {
            b.iter(|| {
                let tasks = TaskGroup::new();
                tasks.set_limit(limit);
                for i in 0..64u64 {
                    tasks.go(move || {
                        black_box(i);
                        Ok::<(), BoxedError>(())
                    });
                }
                tasks.wait().unwrap();
            });
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_barrier_single_party,
    bench_barrier_generations,
    bench_barrier_with_context,
    bench_task_group_fanout,
);
criterion_main!(benches);
