//! Managed allocation benchmarks

use std::ffi::CString;

use managed_alloc::{
    memory::string::{concatenate, string},
    Heap, ManagedBuffer,
};

use criterion::{black_box, criterion_group, criterion_main, Criterion};

/// Allocate a run of buffers, dropping them as we go
fn churn(heap: &Heap, size: usize, count: usize) {
    for _ in 0..count {
        let buffer = heap.allocate(black_box(size)).unwrap();
        black_box(buffer.as_ptr());
    }
}

/// Allocate a run of buffers and keep them all live
fn retain(heap: &Heap, size: usize, count: usize) -> Vec<ManagedBuffer<'_>> {
    (0..count)
        .map(|_| heap.allocate(black_box(size)).unwrap())
        .collect()
}

pub fn criterion_benchmark(c: &mut Criterion) {
    let heap = Heap::new();
    let left = CString::new("the quick brown fox ").unwrap();
    let right = CString::new("jumps over the lazy dog").unwrap();

    c.bench_function("alloc_small", |b| b.iter(|| churn(&heap, 24, 100)));
    c.bench_function("alloc_medium", |b| b.iter(|| churn(&heap, 1024, 100)));
    c.bench_function("alloc_large", |b| {
        b.iter(|| churn(&heap, 64 * 1024, 10))
    });

    c.bench_function("concatenate", |b| {
        b.iter(|| concatenate(&heap, Some(&left), Some(&right)).unwrap())
    });
    c.bench_function("string_literal", |b| {
        b.iter(|| string(&heap, black_box(b"a string literal\0")).unwrap())
    });

    c.bench_function("collect_with_live_data", |b| {
        let live = retain(&heap, 48, 10_000);
        b.iter(|| heap.collect());
        drop(live);
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
