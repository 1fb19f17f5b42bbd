#[macro_use]
extern crate criterion;

use criterion::{BatchSize, Criterion};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use memlist_core::alloc::Allocator;
use memlist_core::list::{ConcurrentList, NODE_SIZE};

fn bench_first_fit_churn(c: &mut Criterion) {
    let mut group = c.benchmark_group("allocator_churn");

    for live_blocks in [16, 256, 2048] {
        group.throughput(criterion::Throughput::Elements(live_blocks as u64));
        group.bench_function(format!("live_{}", live_blocks), |b| {
            let allocator = Allocator::init(live_blocks * 128).unwrap();
            let mut rng = SmallRng::seed_from_u64(7);
            let mut held: Vec<_> = (0..live_blocks)
                .filter_map(|_| allocator.alloc(rng.random_range(8..64)))
                .collect();
            b.iter(|| {
                let victim = rng.random_range(0..held.len());
                allocator.free(held.swap_remove(victim));
                if let Some(ptr) = allocator.alloc(rng.random_range(8..64)) {
                    held.push(ptr);
                }
            });
        });
    }
    group.finish();
}

fn bench_list_append(c: &mut Criterion) {
    let mut group = c.benchmark_group("list_append");

    for len in [64, 512] {
        group.throughput(criterion::Throughput::Elements(len as u64));
        group.bench_function(format!("nodes_{}", len), |b| {
            b.iter_batched(
                || ConcurrentList::init(NODE_SIZE * len).unwrap(),
                |list| {
                    for v in 0..len {
                        list.insert(v as u16).unwrap();
                    }
                    list
                },
                BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

criterion_group!(benches, bench_first_fit_churn, bench_list_append);
criterion_main!(benches);
