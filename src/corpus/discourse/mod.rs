
use scraper::Html;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

use super::{Chunk, SourceReadError, long_enough};

/// A forum topic as written by the scraper
#[derive(Debug, Clone, Deserialize)]
pub struct Topic {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub posts: Vec<Post>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Post {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    /// Rendered post HTML
    #[serde(default)]
    pub cooked: String,
}

/// Strip markup from rendered post HTML, keeping only the text nodes
#[inline]
pub fn clean(raw_markup: &str) -> String {
    let fragment = Html::parse_fragment(raw_markup);
    let text: String = fragment.root_element().text().collect();
    text.trim().to_string()
}

/// Chunks for every sufficiently long post, each pointing at its topic URL
#[inline]
pub fn load_discourse_chunks(path: &Path, min_chars: usize) -> (Vec<Chunk>, Vec<SourceReadError>) {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(source) => {
            let error = SourceReadError::Io {
                path: path.to_path_buf(),
                source,
            };
            warn!("Could not read forum dump: {}", error);
            return (Vec::new(), vec![error]);
        }
    };

    parse_discourse_chunks(&content, path, min_chars)
}

pub(crate) fn parse_discourse_chunks(
    content: &str,
    path: &Path,
    min_chars: usize,
) -> (Vec<Chunk>, Vec<SourceReadError>) {
    let raw_topics: Vec<serde_json::Value> = match serde_json::from_str(content) {
        Ok(topics) => topics,
        Err(source) => {
            let error = SourceReadError::Json {
                path: path.to_path_buf(),
                source,
            };
            warn!("Could not parse forum dump: {}", error);
            return (Vec::new(), vec![error]);
        }
    };

    let mut chunks = Vec::new();
    let mut skipped = Vec::new();

    for (index, raw) in raw_topics.into_iter().enumerate() {
        let topic: Topic = match serde_json::from_value(raw) {
            Ok(topic) => topic,
            Err(source) => {
                let error = SourceReadError::Topic {
                    path: path.to_path_buf(),
                    index,
                    source,
                };
                warn!("{}", error);
                skipped.push(error);
                continue;
            }
        };

        let before = chunks.len();
        chunks.extend(
            topic
                .posts
                .iter()
                .map(|post| clean(&post.cooked))
                .filter(|text| long_enough(text, min_chars))
                .map(|text| Chunk::new(text, topic.url.clone())),
        );
        debug!(
            "Topic {:?} '{}' contributed {} of {} posts",
            topic.id,
            topic.title,
            chunks.len() - before,
            topic.posts.len()
        );
    }

    (chunks, skipped)
}
