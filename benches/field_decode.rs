//! Benchmarks for the per-message decode path
//!
//! Tests throughput for:
//! - Single field decodes with masks and enumerations
//! - Full packet decodes including dntoeu equations and guarded functions
//! - Delta merges through the sync state machine
//! - Event message formatting

use std::hint::black_box;
use std::sync::Arc;

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use downlink::sync::{Delta, EventSink, SyncClient, SyncInput, TelemetryEvent, WireMessage};
use downlink::test_utils::{EPS_BYTES, counter, health_bytes, int_values, sample_dictionaries};
use downlink::types::FieldValues;
use downlink::{SyncConfig, Value};

struct Discard;

impl EventSink for Discard {
    fn emit(&mut self, event: TelemetryEvent) {
        black_box(event);
    }
}

fn bench_field_decode(c: &mut Criterion) {
    let dictionaries = sample_dictionaries();
    let registry = dictionaries.registry();
    let eps = dictionaries.telemetry.get("EPS").unwrap();

    let mut group = c.benchmark_group("field_decode");
    for field in ["voltage", "mode", "label", "flags"] {
        group.bench_with_input(BenchmarkId::from_parameter(field), &field, |b, field| {
            b.iter(|| black_box(eps.decode_field(field, black_box(&EPS_BYTES), &registry)))
        });
    }
    group.finish();
}

fn bench_packet_decode(c: &mut Criterion) {
    let dictionaries = sample_dictionaries();
    let registry = dictionaries.registry();
    let eps = dictionaries.telemetry.get("EPS").unwrap();
    let health = dictionaries.telemetry.get("HEALTH").unwrap();
    let health_data = health_bytes(2, 513, 1_300_000_000, 42.0);

    let mut group = c.benchmark_group("packet_decode");
    group.bench_function("eps", |b| b.iter(|| black_box(eps.decode_packet(black_box(&EPS_BYTES), &registry))));
    group.bench_function("health_guarded", |b| {
        b.iter(|| black_box(health.decode_packet(black_box(&health_data), &registry)))
    });
    group.finish();
}

fn bench_delta_merge(c: &mut Criterion) {
    let dictionaries = sample_dictionaries();
    let registry = Arc::new(dictionaries.registry());
    let mut client = SyncClient::new(dictionaries.telemetry, registry, SyncConfig::default(), Discard);
    client.step(SyncInput::Connected);
    client.step(SyncInput::Message(WireMessage::Delta(Delta {
        packet: "EPS".into(),
        data: int_values(&[("voltage", 1200), ("mode", 1)]),
        dntoeus: FieldValues::new(),
        counter: counter(0),
    })));

    let mut next = 1u32;
    c.bench_function("delta_merge", |b| {
        b.iter(|| {
            let mut dntoeus = FieldValues::new();
            dntoeus.insert("voltage".into(), Value::Float(12.0));
            let delta = Delta {
                packet: "EPS".into(),
                data: int_values(&[("voltage", i64::from(next))]),
                dntoeus,
                counter: counter(next),
            };
            next += 1;
            black_box(client.step(SyncInput::Message(WireMessage::Delta(delta))))
        })
    });
}

fn bench_event_format(c: &mut Criterion) {
    let dictionaries = sample_dictionaries();
    let boot = dictionaries.events.get_by_code(513).unwrap();
    let mut args = vec![7u8];
    args.extend_from_slice(b"flash\0");

    c.bench_function("event_format", |b| b.iter(|| black_box(boot.format_message(black_box(&args)))));
}

criterion_group!(benches, bench_field_decode, bench_packet_decode, bench_delta_merge, bench_event_format);
criterion_main!(benches);
