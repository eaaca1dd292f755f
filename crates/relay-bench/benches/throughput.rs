//! Throughput benchmarks for the chat service.
//!
//! Measures the in-process path: send through the distributor into inboxes,
//! and wait on an inbox that already holds a message.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use relay_core::{ChatService, RelayConfig};
use std::time::Duration;
use tokio::runtime::Runtime;

fn runtime() -> Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap()
}

fn service_with(clients: usize, rt: &Runtime) -> (ChatService, String) {
    let _guard = rt.enter();
    let service = ChatService::with_config(RelayConfig {
        inbound_capacity: 1024,
        inbox_capacity: 64,
        wait_timeout: Duration::from_secs(5),
    });
    let sender = rt.block_on(async {
        let mut first = None;
        for i in 0..clients {
            let reg = service.register(format!("user-{}", i)).await.unwrap();
            first.get_or_insert(reg.client_id);
        }
        first.unwrap()
    });
    (service, sender)
}

/// Send with a growing number of recipients. Full inboxes drop, so this is
/// the steady-state cost of sequencing plus fan-out.
fn bench_send_fanout(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("send_fanout");
    group.throughput(Throughput::Elements(1));

    for clients in [1, 100, 1000] {
        let (service, sender) = service_with(clients, &rt);
        group.bench_with_input(BenchmarkId::from_parameter(clients), &clients, |b, _| {
            b.to_async(&rt)
                .iter(|| service.send(black_box(&sender), "benchmark message"));
        });
    }

    group.finish();
}

fn bench_register(c: &mut Criterion) {
    let rt = runtime();
    let _guard = rt.enter();
    let service = ChatService::with_config(RelayConfig {
        inbound_capacity: 1024,
        inbox_capacity: 4,
        wait_timeout: Duration::from_secs(5),
    });

    c.bench_function("register", |b| {
        b.to_async(&rt).iter(|| service.register("bench"));
    });
}

/// Send then immediately wait on a single client: one full trip through the
/// distributor.
fn bench_send_then_wait(c: &mut Criterion) {
    let rt = runtime();
    let (service, client) = service_with(1, &rt);

    c.bench_function("send_then_wait", |b| {
        b.to_async(&rt).iter(|| async {
            service.send(&client, "ping").await.unwrap();
            black_box(service.wait(&client).await.unwrap())
        });
    });
}

criterion_group!(
    benches,
    bench_send_fanout,
    bench_register,
    bench_send_then_wait
);
criterion_main!(benches);
