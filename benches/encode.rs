//! Benchmarks for event conversion and request framing.

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use riemann_target::{
    Level, LogRecord, Measurement,
    riemann::{DEFAULT_MAX_FRAME_SIZE, event, proto::encode_events},
};
use serde_json::json;

fn sample_record() -> LogRecord {
    LogRecord::new("service.http", Level::Warn, "slow request")
        .with_tag("edge")
        .with_data("route", json!("/api/orders"))
        .with_data("latency_ms", json!(412))
        .with_data("retry", json!({"attempt": 2, "max": 5}))
}

fn encode_benchmarks(c: &mut Criterion) {
    let tags = vec!["env:prod".to_owned(), "region:eu".to_owned()];
    let record = sample_record();
    let measurement = Measurement::new("cpu.load", 0.5);
    let mut group = c.benchmark_group("encode");

    group.bench_function("from_log", |b| {
        b.iter(|| {
            event::from_log(
                "h1",
                10.0,
                &tags,
                &event::stringify_attributes,
                black_box(&record),
            )
        });
    });

    group.bench_function("measurement_frame", |b| {
        b.iter(|| {
            let event = event::from_measurement("h1", 10.0, &tags, black_box(&measurement));
            encode_events(&[event], DEFAULT_MAX_FRAME_SIZE).expect("frame fits")
        });
    });

    let batch: Vec<_> = (0..64)
        .map(|_| event::from_log("h1", 10.0, &tags, &event::stringify_attributes, &record))
        .collect();
    group.bench_function("batch_of_64", |b| {
        b.iter(|| encode_events(black_box(&batch), DEFAULT_MAX_FRAME_SIZE).expect("frame fits"));
    });

    group.finish();
}

criterion_group!(benches, encode_benchmarks);
criterion_main!(benches);
