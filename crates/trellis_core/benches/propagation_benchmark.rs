//! # Property Propagation Benchmark
//!
//! Targets:
//! - Set on the root of a 1000 node chain: < 200us
//! - Batch of 100 independent sets: < 50us
//!
//! Run with: `cargo bench --package trellis_core`

// Benchmarks don't need strict docs
#![allow(missing_docs)]

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use trellis_core::{Batch, Expression, PropertyGraph, PropertyId, PropertyValue, Timestamp};

fn id(serial: u64) -> PropertyId {
    PropertyId::new(serial, 0)
}

/// root -> n1 -> n2 -> ... each node adds one to its input.
fn chain(len: u64) -> PropertyGraph {
    let mut graph = PropertyGraph::with_capacity(len as usize + 1);
    graph
        .add_value(id(0), PropertyValue::Int(0), Timestamp::ZERO)
        .unwrap();
    for serial in 1..=len {
        let expr = Expression::new(vec![id(serial - 1)], |inputs| {
            PropertyValue::Int(inputs.int(0).unwrap_or_default() + 1)
        });
        graph.add_expression(id(serial), expr, Timestamp::ZERO).unwrap();
    }
    graph
}

/// One root fanned out to `width` readers.
fn fan_out(width: u64) -> PropertyGraph {
    let mut graph = PropertyGraph::with_capacity(width as usize + 1);
    graph
        .add_value(id(0), PropertyValue::Float(1.0), Timestamp::ZERO)
        .unwrap();
    for serial in 1..=width {
        #[allow(clippy::cast_precision_loss)]
        let factor = serial as f64;
        let expr = Expression::new(vec![id(0)], move |inputs| {
            PropertyValue::Float(inputs.float(0).unwrap_or_default() * factor)
        });
        graph.add_expression(id(serial), expr, Timestamp::ZERO).unwrap();
    }
    graph
}

fn bench_chain_propagation(c: &mut Criterion) {
    let mut group = c.benchmark_group("chain_propagation");

    for len in [10_u64, 100, 1000] {
        group.bench_with_input(BenchmarkId::from_parameter(len), &len, |b, &len| {
            let mut graph = chain(len);
            let mut tick = 0_u64;
            b.iter(|| {
                tick += 1;
                let changes = graph
                    .set_value(
                        id(0),
                        PropertyValue::Int(tick as i64),
                        Timestamp::from_nanos(tick),
                    )
                    .unwrap();
                black_box(changes.len())
            });
        });
    }

    group.finish();
}

fn bench_fan_out_propagation(c: &mut Criterion) {
    let mut group = c.benchmark_group("fan_out_propagation");

    for width in [10_u64, 100, 1000] {
        group.bench_with_input(BenchmarkId::from_parameter(width), &width, |b, &width| {
            let mut graph = fan_out(width);
            let mut tick = 0_u64;
            b.iter(|| {
                tick += 1;
                #[allow(clippy::cast_precision_loss)]
                let value = PropertyValue::Float(tick as f64);
                black_box(
                    graph
                        .set_value(id(0), value, Timestamp::from_nanos(tick))
                        .unwrap(),
                )
            });
        });
    }

    group.finish();
}

fn bench_apply_batch(c: &mut Criterion) {
    let mut graph = PropertyGraph::new();
    for serial in 0..100 {
        graph
            .add_value(id(serial), PropertyValue::Int(0), Timestamp::ZERO)
            .unwrap();
    }

    let mut tick = 0_u64;
    c.bench_function("apply_batch_100_sets", |b| {
        b.iter(|| {
            tick += 1;
            let mut builder = Batch::builder(Timestamp::from_nanos(tick));
            for serial in 0..100 {
                builder = builder.set_value(id(serial), tick as i64);
            }
            black_box(graph.apply_batch(&builder.build()).applied)
        });
    });
}

criterion_group!(
    benches,
    bench_chain_propagation,
    bench_fan_out_propagation,
    bench_apply_batch
);
criterion_main!(benches);
