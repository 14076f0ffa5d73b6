//! Engine and traversal overhead benchmarks.
//!
//! Every dispatch goes through a no-op transport, so the numbers isolate
//! the cost of the walk itself: frame pushes, aggregate roll-ups, driver
//! scheduling and the flattening of per-host logs.
//!
//! ```bash
//! cargo bench --bench traversal_benchmark
//! cargo bench --bench traversal_benchmark -- fan_out
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use tokio::runtime::Runtime;

use opswalk::command::Command;
use opswalk::engine::{Engine, EngineConfig};
use opswalk::inventory::{Inventory, InventoryItem};
use opswalk::ops::{Operation, Sequence, Shell};
use opswalk::response::Response;
use opswalk::transport::{Transport, TransportFactory};

// ============================================================================
// No-op transport
// ============================================================================

struct NullTransport {
    host: String,
}

#[async_trait]
impl Transport for NullTransport {
    async fn dispatch(&mut self, command: &Command) -> Response {
        let mut response = Response::new(&self.host).with_return_code(0);
        response.command = command.describe();
        response
    }

    async fn close(&mut self) {}
}

struct NullFactory;

impl TransportFactory for NullFactory {
    fn create(&self, item: &InventoryItem) -> Box<dyn Transport> {
        Box::new(NullTransport {
            host: item.host().to_string(),
        })
    }
}

// ============================================================================
// Fixtures
// ============================================================================

fn inventory_of(count: usize) -> Inventory {
    let mut inventory = Inventory::new();
    for i in 0..count {
        inventory
            .add(InventoryItem::new(format!("host-{i}")))
            .unwrap();
    }
    inventory
}

fn engine_of(count: usize, forks: Option<usize>) -> Engine {
    Engine::new(inventory_of(count))
        .with_transport_factory(Arc::new(NullFactory))
        .with_config(EngineConfig {
            forks,
            ..EngineConfig::default()
        })
}

fn single_shell(_: &InventoryItem) -> Box<dyn Operation> {
    Box::new(Shell::new("noop"))
}

/// 64 commands in one flat sequence.
fn flat_tree(_: &InventoryItem) -> Box<dyn Operation> {
    let mut seq = Sequence::new("flat");
    for i in 0..64 {
        seq = seq.then(Box::new(Shell::new(format!("step-{i}"))));
    }
    Box::new(seq)
}

/// 64 commands as a 4x4x4 nest, exercising frame pushes and roll-ups.
fn nested_tree(_: &InventoryItem) -> Box<dyn Operation> {
    let mut outer = Sequence::new("outer");
    for i in 0..4 {
        let mut mid = Sequence::new(format!("mid-{i}"));
        for j in 0..4 {
            let mut inner = Sequence::new(format!("inner-{i}-{j}"));
            for k in 0..4 {
                inner = inner.then(Box::new(Shell::new(format!("step-{i}-{j}-{k}"))));
            }
            mid = mid.then(Box::new(inner));
        }
        outer = outer.then(Box::new(mid));
    }
    Box::new(outer)
}

// ============================================================================
// Benchmarks
// ============================================================================

fn bench_fan_out(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("fan_out");

    for host_count in [1usize, 10, 100] {
        group.throughput(Throughput::Elements(host_count as u64));
        group.bench_with_input(
            BenchmarkId::new("single_command", host_count),
            &host_count,
            |b, &count| {
                let engine = engine_of(count, None);
                b.to_async(&rt).iter(|| async {
                    let responses = engine.execute(single_shell).await;
                    black_box(responses.len());
                });
            },
        );
    }

    group.finish();
}

fn bench_tree_shapes(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("tree_shapes");
    group.throughput(Throughput::Elements(64));

    group.bench_function("flat_64", |b| {
        let engine = engine_of(1, None);
        b.to_async(&rt).iter(|| async {
            let responses = engine.execute(flat_tree).await;
            black_box(responses.len());
        });
    });

    group.bench_function("nested_4x4x4", |b| {
        let engine = engine_of(1, None);
        b.to_async(&rt).iter(|| async {
            let responses = engine.execute(nested_tree).await;
            black_box(responses.len());
        });
    });

    group.finish();
}

fn bench_forks(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("forks");
    group.throughput(Throughput::Elements(100));

    for forks in [None, Some(16), Some(4)] {
        let label = forks.map_or("unbounded".to_string(), |f| f.to_string());
        group.bench_with_input(
            BenchmarkId::new("hosts_100", label),
            &forks,
            |b, &forks| {
                let engine = engine_of(100, forks);
                b.to_async(&rt).iter(|| async {
                    let responses = engine.execute(single_shell).await;
                    black_box(responses.len());
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_fan_out, bench_tree_shapes, bench_forks);
criterion_main!(benches);
