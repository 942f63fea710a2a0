//! Codec benchmarks for iotstream-protocol.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use iotstream_protocol::{codec, path, RpcRequest};
use serde_json::{json, Value};

const STATE: &str =
    "/network/1/device/2/value/6c06b63e-5e3a-4b9d-9c8b-2a1f1d7e3c11/state/cda4d978-39e9-47bf-8497-9813b0f94973";

fn bench_encode_subscribe(c: &mut Criterion) {
    let request = RpcRequest::subscribe("/services/2.1/websocket/open/subscription", STATE);

    c.bench_function("encode_subscribe", |b| {
        b.iter(|| codec::encode(black_box(&request)))
    });
}

fn bench_decode_single(c: &mut Criterion) {
    let frame = codec::event_object(STATE, "update", Some(json!({"data": "21.5"}))).to_string();

    let mut group = c.benchmark_group("decode");
    group.throughput(Throughput::Bytes(frame.len() as u64));
    group.bench_function("single_event", |b| {
        b.iter(|| codec::decode(black_box(frame.as_bytes())))
    });
    group.finish();
}

fn bench_decode_batch(c: &mut Criterion) {
    let batch: Vec<Value> = (0..64)
        .map(|i| codec::event_object(STATE, "update", Some(json!({ "data": i.to_string() }))))
        .collect();
    let frame = Value::Array(batch).to_string();

    let mut group = c.benchmark_group("decode");
    group.throughput(Throughput::Bytes(frame.len() as u64));
    group.bench_function("batch_64", |b| {
        b.iter(|| codec::decode(black_box(frame.as_bytes())))
    });
    group.finish();
}

fn bench_routing_keys(c: &mut Criterion) {
    c.bench_function("routing_keys", |b| {
        b.iter(|| {
            let keys = path::routing_keys(black_box(STATE));
            let channels = path::channel_keys(black_box(STATE));
            (keys, channels)
        })
    });
}

criterion_group!(
    benches,
    bench_encode_subscribe,
    bench_decode_single,
    bench_decode_batch,
    bench_routing_keys
);
criterion_main!(benches);
