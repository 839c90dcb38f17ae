use super::*;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Test double: vector derived from the text, with a few magic inputs
#[derive(Default)]
struct ScriptedEmbedder {
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    calls: AtomicUsize,
}

#[async_trait]
impl Embedder for ScriptedEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.calls.fetch_add(1, Ordering::SeqCst);

        tokio::time::sleep(Duration::from_millis(5)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match text {
            "fail" => Err(EmbeddingError::Status {
                status: 500,
                body: "upstream exploded".to_string(),
            }),
            "wide" => Ok(vec![1.0, 2.0, 3.0, 4.0]),
            "nan" => Ok(vec![f32::NAN, 0.0, 0.0]),
            _ => Ok(vec![text.len() as f32, 0.0, 1.0]),
        }
    }
}

fn chunks(texts: &[&str]) -> Vec<Chunk> {
    texts
        .iter()
        .enumerate()
        .map(|(i, text)| Chunk::new(*text, format!("doc-{}", i)))
        .collect()
}

#[tokio::test]
async fn results_follow_input_order() {
    let batch = BatchEmbedder::new(ScriptedEmbedder::default()).with_concurrency(3);
    let inputs = chunks(&["a", "bbb", "cc", "dddd"]);

    let results = batch.embed_many(inputs.iter().map(EmbeddingInput::from)).await;

    let firsts: Vec<f32> = results
        .iter()
        .map(|r| r.as_ref().expect("all inputs should embed")[0])
        .collect();
    assert_eq!(firsts, vec![1.0, 3.0, 2.0, 4.0]);
}

#[tokio::test]
async fn failure_is_tagged_and_does_not_abort() {
    let batch = BatchEmbedder::new(ScriptedEmbedder::default());
    let inputs = chunks(&["one", "fail", "three"]);

    let results = batch.embed_many(inputs.iter().map(EmbeddingInput::from)).await;

    assert_eq!(results.len(), 3);
    assert!(results[0].is_ok());
    assert!(results[2].is_ok());
    let failure = results[1].as_ref().expect_err("second input should fail");
    assert_eq!(failure.source_id, "doc-1");
    assert_eq!(
        failure.error,
        EmbeddingError::Status {
            status: 500,
            body: "upstream exploded".to_string()
        }
    );
}

#[tokio::test]
async fn first_success_fixes_dimension() {
    let batch = BatchEmbedder::new(ScriptedEmbedder::default());
    let inputs = chunks(&["fail", "abc", "wide", "xy"]);

    let results = batch.embed_many(inputs.iter().map(EmbeddingInput::from)).await;

    assert!(results[0].is_err());
    assert_eq!(results[1].as_ref().map(Vec::len), Ok(3));
    assert_eq!(
        results[2].as_ref().map_err(|f| f.error.clone()),
        Err(EmbeddingError::DimensionMismatch {
            expected: 3,
            actual: 4
        })
    );
    assert!(results[3].is_ok());
}

#[tokio::test]
async fn expected_dimension_is_enforced_from_the_start() {
    let batch = BatchEmbedder::new(ScriptedEmbedder::default()).with_expected_dimension(4);
    let inputs = chunks(&["abc", "wide"]);

    let results = batch.embed_many(inputs.iter().map(EmbeddingInput::from)).await;

    assert!(matches!(
        results[0].as_ref().map_err(|f| &f.error),
        Err(EmbeddingError::DimensionMismatch {
            expected: 4,
            actual: 3
        })
    ));
    assert!(results[1].is_ok());
}

#[tokio::test]
async fn non_finite_vectors_are_rejected() {
    let batch = BatchEmbedder::new(ScriptedEmbedder::default());
    let inputs = chunks(&["nan", "abc"]);

    let results = batch.embed_many(inputs.iter().map(EmbeddingInput::from)).await;

    assert!(matches!(
        results[0].as_ref().map_err(|f| &f.error),
        Err(EmbeddingError::MalformedResponse(_))
    ));
    // the rejected vector must not have fixed the dimension
    assert!(results[1].is_ok());
}

#[tokio::test]
async fn in_flight_calls_are_bounded() {
    let embedder = std::sync::Arc::new(ScriptedEmbedder::default());
    let batch = BatchEmbedder::new(std::sync::Arc::clone(&embedder)).with_concurrency(4);
    let texts: Vec<String> = (0..40).map(|i| format!("text {}", i)).collect();
    let text_refs: Vec<&str> = texts.iter().map(String::as_str).collect();
    let inputs = chunks(&text_refs);

    let progress = ProgressBar::hidden();
    let results = batch
        .embed_many_with_progress(inputs.iter().map(EmbeddingInput::from), &progress)
        .await;

    assert_eq!(results.len(), 40);
    assert_eq!(embedder.calls.load(Ordering::SeqCst), 40);
    let max = embedder.max_in_flight.load(Ordering::SeqCst);
    assert!(max <= 4, "saw {} concurrent calls", max);
    assert!(max > 1, "calls should overlap");
    assert_eq!(progress.position(), 40);
}

#[test]
fn concurrency_is_at_least_one() {
    let batch = BatchEmbedder::new(ScriptedEmbedder::default()).with_concurrency(0);
    assert_eq!(batch.concurrency(), 1);
}
