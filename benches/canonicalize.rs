//! Benchmarks for canonicalization and diffing.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use sgsync::canon::{canonicalize, CanonicalSet};
use sgsync::diff::diff;
use std::hint::black_box;

/// Generate CIDR entries with adjacent pairs so the collapse has work to do.
fn generate_entries(count: usize) -> Vec<String> {
    (0..count)
        .map(|i| {
            let a = (i % 200) as u8;
            let b = ((i / 200) % 200) as u8;
            let half = if i % 2 == 0 { 0 } else { 128 };
            format!("{}.{}.0.{}/25", a, b, half)
        })
        .collect()
}

fn bench_canonicalize(c: &mut Criterion) {
    let mut group = c.benchmark_group("canonicalize");
    for size in [10, 100, 1000] {
        let entries = generate_entries(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &entries, |b, entries| {
            b.iter(|| canonicalize(black_box(entries)).unwrap());
        });
    }
    group.finish();
}

fn bench_diff(c: &mut Criterion) {
    let desired: CanonicalSet = canonicalize(&generate_entries(500)).unwrap().0;
    let current: CanonicalSet = canonicalize(&generate_entries(400)).unwrap().0;
    c.bench_function("diff_500_vs_400", |b| {
        b.iter(|| diff(black_box(&desired), black_box(&current)));
    });
}

criterion_group!(benches, bench_canonicalize, bench_diff);
criterion_main!(benches);
