use course_rag::index::VectorIndex;
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use std::hint::black_box;

const DIMENSION: usize = 1536;

/// Cheap deterministic pseudo-random vectors so runs are comparable
fn vectors(count: usize) -> Vec<Vec<f32>> {
    let mut state: u32 = 0x9E37_79B9;
    (0..count)
        .map(|_| {
            (0..DIMENSION)
                .map(|_| {
                    state ^= state << 13;
                    state ^= state >> 17;
                    state ^= state << 5;
                    (state % 10_000) as f32 / 10_000.0
                })
                .collect()
        })
        .collect()
}

pub fn criterion_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("flat_search");
    for count in [1_000, 10_000] {
        let mut data = vectors(count + 1);
        let query = data.pop().expect("one extra vector for the query");
        let index = VectorIndex::build(data).expect("benchmark index builds");

        group.bench_with_input(BenchmarkId::from_parameter(count), &index, |b, index| {
            b.iter(|| index.search(black_box(&query), black_box(5)));
        });
    }
    group.finish();
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
