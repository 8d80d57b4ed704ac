//! Benchmarks for [`SlotArena`]
//!
//! - Insert: filling an empty arena
//! - Churn: releasing every other slot and re-acquiring, which exercises the first-free scan
//! - Get: validated lookups through live handles, and stale lookups after release

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use kestrel_containers::prelude::SlotArena;
use std::hint::black_box;

fn benchmark_arena_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("slot_arena_insert");
    for size in [100, 1000, 10_000].iter() {
        group.bench_with_input(BenchmarkId::new("SlotArena", size), size, |b, &size| {
            b.iter(|| {
                let mut arena: SlotArena<u64> = SlotArena::with_capacity(size);
                for i in 0..size as u64 {
                    black_box(arena.insert(black_box(i)).unwrap());
                }
                black_box(arena)
            });
        });
    }
    group.finish();
}

fn benchmark_arena_churn(c: &mut Criterion) {
    let mut group = c.benchmark_group("slot_arena_churn");
    for size in [100, 1000, 10_000].iter() {
        group.bench_with_input(BenchmarkId::new("SlotArena", size), size, |b, &size| {
            let mut arena: SlotArena<u64> = SlotArena::new();
            let mut handles: Vec<_> = (0..size as u64).map(|i| arena.insert(i).unwrap()).collect();
            b.iter(|| {
                for handle in handles.iter_mut().step_by(2) {
                    arena.remove(*handle).unwrap();
                    *handle = arena.insert(black_box(0)).unwrap();
                }
            });
        });
    }
    group.finish();
}

fn benchmark_arena_get(c: &mut Criterion) {
    let mut group = c.benchmark_group("slot_arena_get");
    for size in [100, 1000, 10_000].iter() {
        let mut arena: SlotArena<u64> = SlotArena::new();
        let handles: Vec<_> = (0..*size as u64).map(|i| arena.insert(i).unwrap()).collect();
        group.bench_with_input(BenchmarkId::new("live", size), size, |b, _| {
            b.iter(|| {
                for handle in handles.iter() {
                    black_box(arena.get(handle));
                }
            });
        });

        let mut stale_arena: SlotArena<u64> = SlotArena::new();
        let stale: Vec<_> = (0..*size as u64)
            .map(|i| stale_arena.insert(i).unwrap())
            .collect();
        for handle in stale.iter() {
            stale_arena.remove(*handle).unwrap();
        }
        group.bench_with_input(BenchmarkId::new("stale", size), size, |b, _| {
            b.iter(|| {
                for handle in stale.iter() {
                    black_box(stale_arena.is_stale(handle));
                }
            });
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    benchmark_arena_insert,
    benchmark_arena_churn,
    benchmark_arena_get
);
criterion_main!(benches);
