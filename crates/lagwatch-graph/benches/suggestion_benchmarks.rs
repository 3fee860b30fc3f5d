//! Benchmarks for near-miss asset key lookup over large deployments

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use lagwatch_core::AssetKey;
use lagwatch_graph::{SimilarAssetIndex, DEFAULT_SIMILARITY_CUTOFF};

/// N assets spread over a handful of prefixes
fn generate_keys(num_assets: usize) -> Vec<AssetKey> {
    (0..num_assets)
        .map(|i| {
            let group = format!("group_{}", i % 8);
            AssetKey::new(["warehouse".to_string(), group, format!("asset_{}", i)])
        })
        .collect()
}

fn bench_similar_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("similar_lookup");

    for size in [500, 5000, 20000] {
        let keys = generate_keys(size);
        let index = SimilarAssetIndex::new(&keys, DEFAULT_SIMILARITY_CUTOFF);
        let query = AssetKey::from("warehouse/group_3/aset_3");

        group.bench_with_input(BenchmarkId::new("lookup", size), &size, |b, _| {
            b.iter(|| black_box(index.similar_to(black_box(&query))))
        });
    }

    group.finish();
}

fn bench_index_build(c: &mut Criterion) {
    let keys = generate_keys(5000);
    c.bench_function("index_build_5000", |b| {
        b.iter(|| black_box(SimilarAssetIndex::new(black_box(&keys), DEFAULT_SIMILARITY_CUTOFF)))
    });
}

criterion_group!(benches, bench_similar_lookup, bench_index_build);
criterion_main!(benches);
