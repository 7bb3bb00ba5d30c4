use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use polyfence::{
    Engine, EngineConfig, Indexer, IndexerConfig, InputFeature, Properties, QueryOptions, Store,
    StrategyKind,
};

fn square(lng0: f64, lat0: f64, lng1: f64, lat1: f64) -> Vec<f64> {
    vec![lng0, lat0, lng1, lat0, lng1, lat1, lng0, lat1, lng0, lat0]
}

fn build_store(n: usize) -> Arc<Store> {
    let mut indexer = Indexer::new(Store::memory(), IndexerConfig::new("bench")).unwrap();
    for i in 0..n {
        let lng = (i % 36) as f64 * 10.0 - 180.0;
        let lat = (i / 36) as f64 * 8.0 - 60.0;
        indexer
            .add_feature(&InputFeature {
                properties: Properties::new(),
                polygons: vec![square(lng, lat, lng + 9.0, lat + 7.0)],
            })
            .unwrap();
    }
    let (store, _) = indexer.seal().unwrap();
    Arc::new(store)
}

fn bench_within(c: &mut Criterion) {
    let store = build_store(180);
    let mut group = c.benchmark_group("within");
    for kind in StrategyKind::ALL {
        let engine = Engine::open(
            Arc::clone(&store),
            EngineConfig::default().with_strategy(kind),
        )
        .unwrap();
        group.bench_function(kind.as_str(), |b| {
            b.iter(|| {
                let resp = engine
                    .within(black_box(-33.5), black_box(12.5), QueryOptions::default())
                    .unwrap();
                black_box(resp.responses.len())
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_within);
criterion_main!(benches);
