//! Performance benchmarks for the event stream hot paths.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use eventstream::{
    Event, EventBatch, EventBuffer, SubscribeRequest, Subscription, Topic, KEY_ALL, TOPIC_ALL,
};
use std::collections::HashMap;

fn event(topic: &str, key: &str, index: u64) -> Event {
    Event {
        topic: Topic::from(topic),
        event_type: "bench".to_string(),
        key: key.to_string(),
        filter_keys: Vec::new(),
        index,
        namespace: String::new(),
        payload: serde_json::json!({ "key": key }),
    }
}

fn request(entries: &[(&str, &[&str])]) -> SubscribeRequest {
    SubscribeRequest {
        topics: entries
            .iter()
            .map(|(topic, keys)| {
                (
                    Topic::from(*topic),
                    keys.iter().map(|k| k.to_string()).collect(),
                )
            })
            .collect::<HashMap<_, _>>(),
        ..Default::default()
    }
}

fn filled_buffer(batches: u64, events_per_batch: usize) -> EventBuffer {
    let buffer = EventBuffer::new(batches as usize + 1);
    for index in 1..=batches {
        let events = (0..events_per_batch)
            .map(|i| {
                let topic = if i % 2 == 0 { "job" } else { "eval" };
                event(topic, &format!("key-{}", i), index)
            })
            .collect();
        buffer.append(EventBatch::new(index, events));
    }
    buffer
}

/// Benchmark draining a pre-filled buffer through a subscription, with
/// filters exercising the pass-through, subset, and no-match paths.
fn bench_drain(c: &mut Criterion) {
    let mut group = c.benchmark_group("drain");

    let cases = [
        ("pass_through", request(&[(TOPIC_ALL, &[KEY_ALL])])),
        ("subset", request(&[("job", &[KEY_ALL])])),
        ("single_key", request(&[("job", &["key-0"])])),
    ];

    for (name, req) in cases {
        group.bench_with_input(BenchmarkId::new("filter", name), &req, |b, req| {
            let buffer = filled_buffer(100, 10);
            b.iter(|| {
                let start = buffer.start_from(0, false).unwrap();
                let mut sub = Subscription::new(req.clone(), start, || {});
                let mut total = 0usize;
                while let Some(batch) = sub.next_no_block().unwrap() {
                    total += batch.events.len();
                }
                black_box(total)
            });
        });
    }

    group.finish();
}

/// Benchmark append throughput at varying batch sizes.
fn bench_append(c: &mut Criterion) {
    let mut group = c.benchmark_group("append");

    for events_per_batch in [1, 10, 100] {
        group.bench_with_input(
            BenchmarkId::new("events_per_batch", events_per_batch),
            &events_per_batch,
            |b, &n| {
                let buffer = EventBuffer::new(1000);
                let mut index = 0u64;
                b.iter(|| {
                    index += 1;
                    let events = (0..n).map(|i| event("job", &format!("key-{}", i), index)).collect();
                    buffer.append(EventBatch::new(index, events));
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_drain, bench_append);
criterion_main!(benches);
