#[cfg(test)]
mod tests;

use futures::stream::{self, StreamExt};
use indicatif::ProgressBar;
use tracing::{debug, warn};

use super::{Embedder, EmbeddingError, FailedEmbedding, check_vector};
use crate::corpus::Chunk;

const DEFAULT_CONCURRENCY: usize = 8;

/// Borrowed view of a text to embed and where it came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmbeddingInput<'a> {
    pub source_id: &'a str,
    pub text: &'a str,
}

impl<'a> From<&'a Chunk> for EmbeddingInput<'a> {
    #[inline]
    fn from(chunk: &'a Chunk) -> Self {
        Self {
            source_id: &chunk.source,
            text: &chunk.text,
        }
    }
}

/// Embeds many inputs with a fixed number of remote calls in flight.
///
/// Results come back in input order. The first successful vector fixes the
/// dimension; any later vector of a different length is turned into a
/// [`EmbeddingError::DimensionMismatch`] failure instead of being returned.
pub struct BatchEmbedder<E> {
    embedder: E,
    concurrency: usize,
    expected_dimension: Option<usize>,
}

impl<E: Embedder> BatchEmbedder<E> {
    #[inline]
    pub fn new(embedder: E) -> Self {
        Self {
            embedder,
            concurrency: DEFAULT_CONCURRENCY,
            expected_dimension: None,
        }
    }

    #[inline]
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Pin the dimension up front instead of taking it from the first vector
    #[cfg(test)]
    #[must_use]
    pub(crate) fn with_expected_dimension(mut self, dimension: usize) -> Self {
        self.expected_dimension = Some(dimension);
        self
    }

    #[cfg(test)]
    pub(crate) fn concurrency(&self) -> usize {
        self.concurrency
    }

    #[inline]
    pub async fn embed_many<'a, I>(&self, inputs: I) -> Vec<Result<Vec<f32>, FailedEmbedding>>
    where
        I: IntoIterator<Item = EmbeddingInput<'a>>,
    {
        self.embed_many_with_progress(inputs, &ProgressBar::hidden())
            .await
    }

    /// [`embed_many`](Self::embed_many), advancing `progress` once per finished call
    pub async fn embed_many_with_progress<'a, I>(
        &self,
        inputs: I,
        progress: &ProgressBar,
    ) -> Vec<Result<Vec<f32>, FailedEmbedding>>
    where
        I: IntoIterator<Item = EmbeddingInput<'a>>,
    {
        let inputs: Vec<EmbeddingInput<'a>> = inputs.into_iter().collect();
        debug!(
            "Embedding {} inputs with {} calls in flight",
            inputs.len(),
            self.concurrency
        );

        let raw: Vec<Result<Vec<f32>, EmbeddingError>> = stream::iter(inputs.iter())
            .map(|input| async move {
                let result = self.embedder.embed(input.text).await;
                progress.inc(1);
                result
            })
            .buffered(self.concurrency)
            .collect()
            .await;

        let mut dimension = self.expected_dimension;
        raw.into_iter()
            .zip(inputs.iter())
            .map(|(result, input)| {
                result
                    .and_then(|vector| {
                        check_vector(&vector)?;
                        match dimension {
                            None => {
                                dimension = Some(vector.len());
                                Ok(vector)
                            }
                            Some(expected) if expected == vector.len() => Ok(vector),
                            Some(expected) => Err(EmbeddingError::DimensionMismatch {
                                expected,
                                actual: vector.len(),
                            }),
                        }
                    })
                    .map_err(|error| {
                        warn!("Embedding failed for {}: {}", input.source_id, error);
                        FailedEmbedding {
                            source_id: input.source_id.to_string(),
                            error,
                        }
                    })
            })
            .collect()
    }
}
