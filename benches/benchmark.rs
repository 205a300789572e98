use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::prelude::*;
use rand_distr::{Distribution, Normal};

use docqa::config::Number;
use docqa::{Document, EmbeddingRecord, Segmenter, VectorIndex};

const DIMENSIONS: usize = 384;
const SEED: u64 = 42;

fn configure_criterion() -> Criterion {
    Criterion::default()
        .sample_size(20)
        .measurement_time(std::time::Duration::from_secs(10))
        .warm_up_time(std::time::Duration::from_secs(2))
        .configure_from_args()
}

fn random_vector(rng: &mut StdRng, normal: &Normal<Number>) -> Vec<Number> {
    normal.sample_iter(rng).take(DIMENSIONS).collect()
}

fn build_index(rng: &mut StdRng, normal: &Normal<Number>, size: usize) -> VectorIndex {
    let records = (0..size)
        .map(|i| {
            EmbeddingRecord::new(
                format!("chunk-{}", i),
                String::new(),
                random_vector(rng, normal),
            )
        })
        .collect();
    VectorIndex::with_records(records)
}

fn query_index(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(SEED);
    let normal = Normal::new(0.0, 1.0).unwrap();
    let mut group = c.benchmark_group("query");

    for size in [50, 200, 1000] {
        let index = build_index(&mut rng, &normal, size);
        let query = random_vector(&mut rng, &normal);
        for k in [3, 10] {
            group.bench_with_input(
                BenchmarkId::new(format!("top{}", k), size),
                &(&index, &query),
                |b, (index, query)| b.iter(|| index.query(query, k)),
            );
        }
    }
    group.finish();
}

fn segment_document(c: &mut Criterion) {
    let words = ["revenue", "green", "bond", "portfolio", "emissions", "2030"];
    let mut rng = StdRng::seed_from_u64(SEED);
    let text: String = (0..40_000)
        .map(|_| *words.choose(&mut rng).unwrap())
        .collect::<Vec<_>>()
        .join(" ");
    let document = Document::plain(text);
    let segmenter = Segmenter::default();

    c.bench_function("segment 40k words", |b| b.iter(|| segmenter.chunks(&document)));
}

criterion_group! {
    name = benches;
    config = configure_criterion();
    targets = query_index, segment_document
}
criterion_main!(benches);
