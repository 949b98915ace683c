// Criterion benchmarks for fsrouter-router
//
// Run benchmarks with:
//   cargo bench -p fsrouter-router

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use fsrouter_router::{NodeHandle, Policy, Scheduler};

fn node_pool(count: u16) -> Vec<Arc<NodeHandle>> {
    (1..=count)
        .map(|id| NodeHandle::new(id, tokio::io::sink()))
        .collect()
}

fn bench_join(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let _guard = rt.enter();

    let mut group = c.benchmark_group("join");
    for count in [4u16, 16, 64] {
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            let pool = node_pool(count);
            b.iter(|| {
                let mut scheduler = Scheduler::new(Policy::LeastConnections);
                for node in &pool {
                    scheduler.join(black_box(Arc::clone(node)));
                }
            });
        });
    }
    group.finish();
}

fn bench_dispatch(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let _guard = rt.enter();

    let mut group = c.benchmark_group("dispatch");
    for &policy in &[
        Policy::RoundRobin,
        Policy::LeastConnections,
        Policy::LeastResponseTime,
    ] {
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{policy:?}")),
            &policy,
            |b, &policy| {
                let mut scheduler = Scheduler::new(policy);
                for node in node_pool(64) {
                    scheduler.join(node);
                }
                b.iter(|| {
                    let node = scheduler.dispatch().unwrap();
                    node.record_dispatch();
                    scheduler.rebalance(&node).unwrap();
                    black_box(node);
                });
            },
        );
    }
    group.finish();
}

fn bench_rebalance_after_health(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let _guard = rt.enter();

    let mut group = c.benchmark_group("rebalance_after_health");
    for count in [4u16, 16, 64] {
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            let mut scheduler = Scheduler::new(Policy::LeastResponseTime);
            let pool = node_pool(count);
            for node in &pool {
                scheduler.join(Arc::clone(node));
            }
            let mut avg = 1_000_000.0;
            b.iter(|| {
                let node = &pool[0];
                node.record_dispatch();
                node.record_health(avg);
                avg += 1.0;
                scheduler.rebalance(black_box(node)).unwrap();
            });
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_join,
    bench_dispatch,
    bench_rebalance_after_health,
);
criterion_main!(benches);
