// Corpus module
// Loads course files and forum posts and normalizes them into chunks

pub mod course;
pub mod discourse;


use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

use crate::config::Config;

pub use discourse::clean;

/// One unit of retrievable text and where it came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// URL of a forum topic or path of a course file
    pub source: String,
    pub text: String,
}

impl Chunk {
    #[inline]
    pub fn new(text: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            source: source.into(),
        }
    }

    /// Copy of this chunk with the text cut to `max_chars` characters
    #[inline]
    #[must_use]
    pub fn truncated(&self, max_chars: usize) -> Self {
        Self {
            source: self.source.clone(),
            text: truncate_chars(&self.text, max_chars).to_string(),
        }
    }
}

/// Longest prefix of `text` with at most `max_chars` characters
#[inline]
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text.get(..idx).unwrap_or(text),
        None => text,
    }
}

/// A content unit that could not be read; logged and skipped by the collector
#[derive(Debug, Error)]
pub enum SourceReadError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Skipping topic #{index} in {path}: {source}")]
    Topic {
        path: PathBuf,
        index: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid search pattern {pattern}: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },

    #[error("Failed to walk {path}: {message}")]
    Walk { path: PathBuf, message: String },
}

/// Everything read by one collection pass
#[derive(Debug, Default)]
pub struct Collected {
    pub chunks: Vec<Chunk>,
    pub skipped: Vec<SourceReadError>,
}

impl Collected {
    fn absorb(&mut self, (chunks, skipped): (Vec<Chunk>, Vec<SourceReadError>)) {
        self.chunks.extend(chunks);
        self.skipped.extend(skipped);
    }
}

/// Reads the configured content locations into chunks
#[derive(Debug, Clone)]
pub struct ChunkStore {
    base_dir: PathBuf,
    course_dir: PathBuf,
    course_extensions: Vec<String>,
    course_min_chars: usize,
    discourse_file: PathBuf,
    discourse_min_chars: usize,
}

impl ChunkStore {
    #[inline]
    pub fn new(config: &Config) -> Self {
        Self {
            base_dir: config.get_base_dir().to_path_buf(),
            course_dir: config.course_dir(),
            course_extensions: config.corpus.course_extensions.clone(),
            course_min_chars: config.corpus.course_min_chars,
            discourse_file: config.discourse_file(),
            discourse_min_chars: config.corpus.discourse_min_chars,
        }
    }

    /// All chunks of the corpus: course files first, then forum posts
    #[inline]
    pub fn collect(&self) -> Vec<Chunk> {
        self.collect_detailed().chunks
    }

    /// Like [`collect`](Self::collect) but also hands back what was skipped
    #[inline]
    pub fn collect_detailed(&self) -> Collected {
        let mut collected = Collected::default();

        match course::discover_course_files(&self.course_dir, &self.course_extensions) {
            Ok(paths) => collected.absorb(course::load_course_files(
                &paths,
                &self.base_dir,
                self.course_min_chars,
            )),
            Err(e) => {
                warn!("Skipping course content: {}", e);
                collected.skipped.push(e);
            }
        }
        let course_count = collected.chunks.len();

        collected.absorb(discourse::load_discourse_chunks(
            &self.discourse_file,
            self.discourse_min_chars,
        ));

        info!(
            "Collected {} chunks ({} course, {} forum), skipped {} units",
            collected.chunks.len(),
            course_count,
            collected.chunks.len() - course_count,
            collected.skipped.len()
        );

        collected
    }
}

/// Whether `text` has enough content to be worth embedding
pub(crate) fn long_enough(text: &str, min_chars: usize) -> bool {
    text.trim().chars().count() > min_chars
}

pub(crate) fn display_source(path: &Path, base_dir: &Path) -> String {
    path.strip_prefix(base_dir)
        .unwrap_or(path)
        .display()
        .to_string()
}
