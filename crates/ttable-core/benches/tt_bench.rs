//! 置換表 probe / save のベンチマーク

use criterion::{criterion_group, criterion_main, Criterion};
use rand::{RngCore, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;
use std::hint::black_box;
use ttable_core::{Bound, Move, TranspositionTable, Value};

fn setup_filled_tt(mb_size: usize) -> TranspositionTable {
    let tt = TranspositionTable::new(mb_size);
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(12345);

    for _ in 0..100_000 {
        let key = rng.next_u64();
        let depth = (rng.next_u64() % 20) as i32 + 1;
        tt.save(
            key,
            Value::new(depth * 10),
            false,
            Bound::Exact,
            depth,
            Move::from_u16((key >> 32) as u16),
            Value::new(-depth),
        );
    }

    tt
}

fn bench_tt_probe(c: &mut Criterion) {
    let mut group = c.benchmark_group("tt_probe");

    let tt = setup_filled_tt(16);
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(67890);
    let keys: Vec<u64> = (0..4096).map(|_| rng.next_u64()).collect();

    group.bench_function("random_mixed", |b| {
        let mut idx = 0usize;
        b.iter(|| {
            let key = keys[idx % keys.len()];
            idx += 1;
            black_box(tt.probe(black_box(key)).found)
        });
    });

    group.finish();
}

fn bench_tt_save(c: &mut Criterion) {
    let mut group = c.benchmark_group("tt_save");

    let tt = setup_filled_tt(16);
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(24680);
    let keys: Vec<u64> = (0..4096).map(|_| rng.next_u64()).collect();

    group.bench_function("replacement_churn", |b| {
        let mut idx = 0usize;
        b.iter(|| {
            let key = keys[idx % keys.len()];
            let depth = (idx % 20) as i32 + 1;
            idx += 1;
            tt.save(
                black_box(key),
                Value::new(1),
                false,
                Bound::Lower,
                depth,
                Move::NONE,
                Value::ZERO,
            );
        });
    });

    group.finish();
}

fn bench_tt_hashfull(c: &mut Criterion) {
    let tt = setup_filled_tt(16);

    c.bench_function("tt_hashfull", |b| b.iter(|| black_box(tt.hashfull())));
}

criterion_group!(benches, bench_tt_probe, bench_tt_save, bench_tt_hashfull);
criterion_main!(benches);
