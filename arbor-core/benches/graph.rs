//! Benchmarks for arbor-core
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use arbor_core::{batch, computed, effect, reactive, signal};
use serde_json::{json, Value};

// =============================================================================
// GRAPH BENCHMARKS
// =============================================================================

fn bench_signal_set(c: &mut Criterion) {
    let s = signal(0_i64);
    let mut next = 0;
    c.bench_function("signal_set", |b| {
        b.iter(|| {
            next += 1;
            s.set(black_box(next))
        })
    });
}

fn bench_diamond(c: &mut Criterion) {
    let a = signal(0_i64);
    let left = computed(move || a.get() + 1);
    let right = computed(move || a.get() * 2);
    let bottom = computed(move || left.get() + right.get());
    let _effect = effect(move || {
        black_box(bottom.get());
    });

    let mut next = 0;
    c.bench_function("diamond_propagation", |b| {
        b.iter(|| {
            next += 1;
            a.set(next)
        })
    });
}

fn bench_wide_fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("fan_out");
    for width in [10_usize, 100, 1000] {
        let source = signal(0_i64);
        let effects: Vec<_> = (0..width)
            .map(|offset| {
                let offset = offset as i64;
                effect(move || {
                    black_box(source.get() + offset);
                })
            })
            .collect();

        let mut next = 0;
        group.bench_with_input(BenchmarkId::from_parameter(width), &width, |b, _| {
            b.iter(|| {
                next += 1;
                source.set(next)
            })
        });

        for effect in effects {
            effect.dispose();
        }
        source.dispose();
    }
    group.finish();
}

fn bench_batched_writes(c: &mut Criterion) {
    let signals: Vec<_> = (0..10).map(|_| signal(0_i64)).collect();
    let inputs = signals.clone();
    let _effect = effect(move || {
        black_box(inputs.iter().map(|s| s.get()).sum::<i64>());
    });

    let mut next = 0;
    c.bench_function("batch_10_writes", |b| {
        b.iter(|| {
            next += 1;
            batch(|| {
                for s in &signals {
                    s.set(next);
                }
            })
        })
    });
}

// =============================================================================
// STORE BENCHMARKS
// =============================================================================

fn rows(count: usize) -> Value {
    Value::Array(
        (0..count)
            .map(|id| json!({ "id": id, "label": format!("row {id}") }))
            .collect(),
    )
}

fn bench_precise_array_update(c: &mut Criterion) {
    let mut group = c.benchmark_group("precise_array_update");
    for count in [100_usize, 1000] {
        let items = reactive(rows(count));
        let _effects: Vec<_> = (0..count)
            .map(|index| {
                let label = items.at(index).at("label");
                effect(move || {
                    black_box(label.get());
                })
            })
            .collect();

        let target = items.at(count / 2).at("label");
        let mut next = 0;
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, _| {
            b.iter(|| {
                next += 1;
                target.set(format!("edited {next}")).unwrap()
            })
        });
    }
    group.finish();
}

fn bench_array_push(c: &mut Criterion) {
    let items = reactive(rows(100));
    let length = computed(move || items.len().unwrap_or(0));
    let _effect = effect(move || {
        black_box(length.get());
    });

    c.bench_function("array_push_pop", |b| {
        b.iter(|| {
            items.push(json!({ "id": -1 })).unwrap();
            items.pop().unwrap()
        })
    });
}

criterion_group!(graph, bench_signal_set, bench_diamond, bench_wide_fan_out, bench_batched_writes);
criterion_group!(store, bench_precise_array_update, bench_array_push);
criterion_main!(graph, store);
