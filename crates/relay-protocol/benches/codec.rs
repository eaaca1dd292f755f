//! Codec benchmarks for relay-protocol.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use relay_protocol::{codec, ChatMessage, Frame};

fn bench_encode_deliver(c: &mut Criterion) {
    let frame = Frame::deliver(1, ChatMessage::new("alice", "x".repeat(64)));

    let mut group = c.benchmark_group("encode");
    group.throughput(Throughput::Elements(1));
    group.bench_function("deliver_64B", |b| b.iter(|| codec::encode(black_box(&frame))));
    group.finish();
}

fn bench_decode_send(c: &mut Criterion) {
    let frame = Frame::send(1, "C1", "x".repeat(64));
    let encoded = codec::encode(&frame).unwrap();

    let mut group = c.benchmark_group("decode");
    group.throughput(Throughput::Bytes(encoded.len() as u64));
    group.bench_function("send_64B", |b| b.iter(|| codec::decode(black_box(&encoded))));
    group.finish();
}

fn bench_registered_history(c: &mut Criterion) {
    let history: Vec<_> = (0..1000)
        .map(|i| ChatMessage::new("alice", format!("message number {i}")))
        .collect();
    let frame = Frame::registered(1, "C1001", "bob", history);

    c.bench_function("registered_1000_history", |b| {
        b.iter(|| {
            let encoded = codec::encode(black_box(&frame)).unwrap();
            codec::decode(black_box(&encoded)).unwrap()
        })
    });
}

criterion_group!(
    benches,
    bench_encode_deliver,
    bench_decode_send,
    bench_registered_history
);
criterion_main!(benches);
