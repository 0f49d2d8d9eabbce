use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use memtable::Memtable;
use tempfile::tempdir;

const N_KEYS: usize = 10_000;
const VALUE_SIZE: usize = 100;

fn fill(mem: &mut Memtable) {
    for i in 0..N_KEYS {
        mem.put(format!("key{}", i).into_bytes(), vec![b'x'; VALUE_SIZE])
            .unwrap();
    }
}

fn memtable_put_benchmark(c: &mut Criterion) {
    c.bench_function("memtable_put_10k_nosync", |b| {
        b.iter_batched(
            || {
                let dir = tempdir().unwrap();
                let mem = Memtable::open(dir.path().join("bench.log"), false).unwrap();
                (dir, mem)
            },
            |(_dir, mut mem)| fill(&mut mem),
            BatchSize::SmallInput,
        );
    });
}

fn memtable_get_benchmark(c: &mut Criterion) {
    let dir = tempdir().unwrap();
    let mut mem = Memtable::open(dir.path().join("bench.log"), false).unwrap();
    fill(&mut mem);

    c.bench_function("memtable_get_hit_10k", |b| {
        b.iter(|| {
            for i in 0..N_KEYS {
                let key = format!("key{}", i).into_bytes();
                assert!(mem.get(&key).is_some());
            }
        });
    });
}

fn memtable_recovery_benchmark(c: &mut Criterion) {
    let dir = tempdir().unwrap();
    let path = dir.path().join("bench.log");
    {
        let mut mem = Memtable::open(&path, false).unwrap();
        fill(&mut mem);
        mem.sync().unwrap();
    }

    c.bench_function("memtable_recover_10k", |b| {
        b.iter(|| {
            let mem = Memtable::open(&path, false).unwrap();
            assert_eq!(mem.len(), N_KEYS);
        });
    });
}

criterion_group!(
    benches,
    memtable_put_benchmark,
    memtable_get_benchmark,
    memtable_recovery_benchmark
);
criterion_main!(benches);
