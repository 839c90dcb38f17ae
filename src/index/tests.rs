use super::*;

fn sample_index() -> VectorIndex {
    VectorIndex::build(vec![
        vec![0.0, 0.0],
        vec![1.0, 0.0],
        vec![0.0, 2.0],
        vec![3.0, 3.0],
        vec![-1.0, 0.0],
    ])
    .expect("sample index should build")
}

fn ordinals(hits: &[SearchHit]) -> Vec<usize> {
    hits.iter().map(|hit| hit.ordinal).collect()
}

#[test]
fn build_rejects_bad_input() {
    assert!(matches!(
        VectorIndex::build(Vec::new()),
        Err(IndexError::NoVectors)
    ));
    assert!(matches!(
        VectorIndex::build(vec![Vec::new()]),
        Err(IndexError::ZeroDimension)
    ));
    assert!(matches!(
        VectorIndex::build(vec![vec![1.0, 2.0], vec![1.0]]),
        Err(IndexError::DimensionMismatch {
            expected: 2,
            actual: 1
        })
    ));
    assert!(matches!(
        VectorIndex::build(vec![vec![1.0, f32::INFINITY]]),
        Err(IndexError::NonFinite { position: 1 })
    ));
}

#[test]
fn add_returns_ordinals_in_order() {
    let mut index = VectorIndex::new(3).expect("dimension 3 is valid");
    assert!(index.is_empty());

    assert_eq!(index.add(&[1.0, 2.0, 3.0]).ok(), Some(0));
    assert_eq!(index.add(&[4.0, 5.0, 6.0]).ok(), Some(1));
    assert_eq!(index.len(), 2);
    assert_eq!(index.vector(1), Some([4.0, 5.0, 6.0].as_slice()));
    assert_eq!(index.vector(2), None);
}

#[test]
fn search_orders_by_squared_distance() {
    let index = sample_index();

    let hits = index.search(&[0.9, 0.0], 3).expect("search should succeed");

    assert_eq!(ordinals(&hits), vec![1, 0, 4]);
    assert!((hits[0].distance - 0.01).abs() < 1e-6);
    assert!((hits[1].distance - 0.81).abs() < 1e-6);
    assert!((hits[2].distance - 3.61).abs() < 1e-5);
}

#[test]
fn stored_vector_matches_itself() {
    let index = sample_index();
    for ordinal in 0..index.len() {
        let vector = index.vector(ordinal).expect("ordinal in range").to_vec();
        let hits = index.search(&vector, 1).expect("search should succeed");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].ordinal, ordinal);
        assert_eq!(hits[0].distance, 0.0);
    }
}

#[test]
fn ties_break_by_ordinal() {
    let index = VectorIndex::build(vec![
        vec![1.0, 0.0],
        vec![0.0, 1.0],
        vec![-1.0, 0.0],
        vec![0.0, -1.0],
    ])
    .expect("index should build");

    let hits = index.search(&[0.0, 0.0], 3).expect("search should succeed");

    assert_eq!(ordinals(&hits), vec![0, 1, 2]);
    assert!(hits.iter().all(|hit| hit.distance == 1.0));
}

#[test]
fn larger_k_extends_smaller_k() {
    let index = sample_index();
    let query = [0.5, 1.5];

    let full = index.search(&query, index.len()).expect("search should succeed");
    for k in 1..index.len() {
        let partial = index.search(&query, k).expect("search should succeed");
        assert_eq!(partial.as_slice(), &full[..k]);
    }
}

#[test]
fn k_edge_cases() {
    let index = sample_index();

    assert!(index.search(&[0.0, 0.0], 0).expect("k = 0 is valid").is_empty());
    assert_eq!(
        index.search(&[0.0, 0.0], 100).expect("large k is valid").len(),
        5
    );

    let empty = VectorIndex::new(2).expect("dimension 2 is valid");
    assert!(empty.search(&[0.0, 0.0], 5).expect("empty index").is_empty());
}

#[test]
fn query_must_match_dimension() {
    let index = sample_index();

    assert!(matches!(
        index.search(&[1.0, 2.0, 3.0], 1),
        Err(IndexError::DimensionMismatch {
            expected: 2,
            actual: 3
        })
    ));
    assert!(matches!(
        index.search(&[f32::NAN, 0.0], 1),
        Err(IndexError::NonFinite { position: 0 })
    ));
}

#[test]
fn squared_l2_distance() {
    assert_eq!(squared_l2(&[1.0, 2.0], &[4.0, 6.0]), 25.0);
    assert_eq!(squared_l2(&[1.0, 2.0], &[1.0, 2.0]), 0.0);
}

#[test]
fn knowledge_base_requires_matching_cardinality() {
    let chunks = vec![Chunk::new("only one", "a.md")];

    let result = KnowledgeBase::new(sample_index(), chunks);

    assert!(matches!(
        result,
        Err(IndexLoadError::CardinalityMismatch {
            vectors: 5,
            chunks: 1
        })
    ));
}

#[test]
fn knowledge_base_resolves_ordinals() {
    let index = VectorIndex::build(vec![vec![0.0], vec![1.0]]).expect("index should build");
    let chunks = vec![Chunk::new("zero", "z.md"), Chunk::new("one", "o.md")];

    let knowledge = KnowledgeBase::new(index, chunks).expect("cardinality matches");

    assert_eq!(knowledge.len(), 2);
    assert_eq!(knowledge.chunk(1).map(|c| c.text.as_str()), Some("one"));
    assert!(knowledge.chunk(2).is_none());
    assert!(knowledge.manifest().is_none());
}
