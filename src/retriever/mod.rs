// Retriever module
// Query text -> nearest chunks of the loaded knowledge base


use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use crate::corpus::Chunk;
use crate::embeddings::{Embedder, EmbeddingError};
use crate::index::{IndexError, KnowledgeBase};

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("failed to embed query: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("search failed: {0}")]
    Search(#[from] IndexError),
}

/// A retrieved chunk and its squared L2 distance to the query
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub distance: f32,
}

/// Embeds a query and looks it up in a shared, read-only knowledge base
#[derive(Clone)]
pub struct Retriever {
    knowledge: Arc<KnowledgeBase>,
    embedder: Arc<dyn Embedder>,
}

impl Retriever {
    #[inline]
    pub fn new(knowledge: Arc<KnowledgeBase>, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            knowledge,
            embedder,
        }
    }

    #[inline]
    pub fn knowledge(&self) -> &KnowledgeBase {
        &self.knowledge
    }

    /// Up to `k` chunks, nearest first
    #[inline]
    pub async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<Chunk>, RetrievalError> {
        Ok(self
            .retrieve_scored(query, k)
            .await?
            .into_iter()
            .map(|scored| scored.chunk)
            .collect())
    }

    /// Like [`retrieve`](Self::retrieve) but keeps the distances.
    ///
    /// Hits whose ordinal has no metadata entry are dropped.
    #[inline]
    pub async fn retrieve_scored(
        &self,
        query: &str,
        k: usize,
    ) -> Result<Vec<ScoredChunk>, RetrievalError> {
        let vector = self.embedder.embed(query).await?;
        let hits = self.knowledge.index().search(&vector, k)?;
        debug!("Search returned {} hits for k = {}", hits.len(), k);

        Ok(hits
            .into_iter()
            .filter_map(|hit| {
                self.knowledge.chunk(hit.ordinal).map(|chunk| ScoredChunk {
                    chunk: chunk.clone(),
                    distance: hit.distance,
                })
            })
            .collect())
    }
}
