use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use nestcache::{evaluate_trace, LocalCache, MockValueStore, U64Key};
use nestindex::{CuckooIndex, MockSlotStore};

fn bench_local_hit(c: &mut Criterion) {
    let mut group = c.benchmark_group("local_hit");
    group.sample_size(50);
    group.throughput(Throughput::Elements(1));

    group.bench_function("read_hot_key", |b| {
        let index = CuckooIndex::open(MockSlotStore::new(), 32);
        index.initialize(32).unwrap();
        let mut cache = LocalCache::new(index, 64, MockValueStore::new()).unwrap();

        // warm both tiers
        let keys: Vec<U64Key> = (0..16u64).map(U64Key::new).collect();
        for key in &keys {
            cache.read(key).unwrap();
        }

        let mut counter = 0;
        b.iter(|| {
            black_box(cache.read(&keys[counter % 16]).unwrap());
            counter += 1;
        });
    });

    group.finish();
}

fn bench_cold_spray(c: &mut Criterion) {
    let mut group = c.benchmark_group("cold_spray");
    group.sample_size(50);
    group.throughput(Throughput::Elements(571));

    group.bench_function("evaluate_571_uniques", |b| {
        let trace: Vec<U64Key> = (0..571u64).map(U64Key::new).collect();
        b.iter(|| black_box(evaluate_trace(32, 64, &trace).unwrap()));
    });

    group.finish();
}

criterion_group!(benches, bench_local_hit, bench_cold_spray);
criterion_main!(benches);
