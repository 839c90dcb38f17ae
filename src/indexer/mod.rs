// Indexer module
// Offline build: collect chunks, embed them, then publish a new index version


use anyhow::{Context, Result};
use chrono::Utc;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::Config;
use crate::corpus::{Chunk, ChunkStore};
use crate::embeddings::{BatchEmbedder, Embedder, EmbeddingInput, FailedEmbedding};
use crate::index::store::FORMAT_VERSION;
use crate::index::{IndexError, IndexManifest, IndexStore, VectorIndex};

/// Outcome of one index build
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildReport {
    /// Chunks produced by the corpus
    pub collected: usize,
    /// Content units that could not be read
    pub skipped_sources: usize,
    /// Entries in the published index
    pub stored: usize,
    pub failures: Vec<FailedEmbedding>,
    pub dimension: usize,
    pub version: String,
}

/// Builds and publishes the index described by a [`Config`]
pub struct Indexer {
    config: Config,
    embedder: Arc<dyn Embedder>,
}

impl Indexer {
    #[inline]
    pub fn new(config: Config, embedder: Arc<dyn Embedder>) -> Self {
        Self { config, embedder }
    }

    #[inline]
    pub fn store(&self) -> IndexStore {
        IndexStore::new(self.config.index_root())
            .with_keep_versions(self.config.index.keep_versions)
    }

    /// Run a full build; the previous index stays live if this fails
    #[inline]
    pub async fn build(&self) -> Result<BuildReport> {
        let corpus = ChunkStore::new(&self.config);
        let collected = tokio::task::spawn_blocking(move || corpus.collect_detailed())
            .await
            .context("Chunk collection task failed")?;

        let chunks = collected.chunks;
        info!("Embedding {} chunks", chunks.len());

        let progress = progress_bar(chunks.len());
        let batch = BatchEmbedder::new(Arc::clone(&self.embedder))
            .with_concurrency(self.config.index.concurrency);
        let results = batch
            .embed_many_with_progress(chunks.iter().map(EmbeddingInput::from), &progress)
            .await;
        progress.finish_and_clear();

        let stored_text_chars = self.config.index.stored_text_chars;
        let mut vectors = Vec::with_capacity(chunks.len());
        let mut stored: Vec<Chunk> = Vec::with_capacity(chunks.len());
        let mut failures = Vec::new();
        for (chunk, result) in chunks.iter().zip(results) {
            match result {
                Ok(vector) => {
                    vectors.push(vector);
                    stored.push(chunk.truncated(stored_text_chars));
                }
                Err(failure) => failures.push(failure),
            }
        }

        if vectors.is_empty() {
            warn!(
                "{} chunks collected, {} failed to embed",
                chunks.len(),
                failures.len()
            );
            return Err(IndexError::NoVectors.into());
        }

        let index = VectorIndex::build(vectors).context("Failed to build vector index")?;
        let manifest = IndexManifest {
            format_version: FORMAT_VERSION,
            embedding_model: self.config.openai.embedding_model.clone(),
            dimension: index.dimension(),
            entries: index.len(),
            stored_text_chars,
            built_at: Utc::now(),
        };

        let store = self.store();
        let dimension = index.dimension();
        let entries = index.len();
        let version = tokio::task::spawn_blocking(move || store.publish(&index, &stored, &manifest))
            .await
            .context("Index publish task failed")?
            .context("Failed to publish index")?;

        let report = BuildReport {
            collected: chunks.len(),
            skipped_sources: collected.skipped.len(),
            stored: entries,
            failures,
            dimension,
            version,
        };
        info!(
            "Index build complete: {} of {} chunks stored ({} failed), dimension {}",
            report.stored,
            report.collected,
            report.failures.len(),
            report.dimension
        );
        Ok(report)
    }
}

/// Build with the given embedder and the settings in `config`
#[inline]
pub async fn build_index(config: &Config, embedder: Arc<dyn Embedder>) -> Result<BuildReport> {
    Indexer::new(config.clone(), embedder).build().await
}

fn progress_bar(len: usize) -> ProgressBar {
    if !console::user_attended_stderr() {
        return ProgressBar::hidden();
    }

    let bar = ProgressBar::new(len as u64);
    if let Ok(style) = ProgressStyle::with_template("{spinner} [{pos}/{len}] Embedding {wide_bar}")
    {
        bar.set_style(style);
    }
    bar
}
