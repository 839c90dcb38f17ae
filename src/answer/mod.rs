// Answer module
// Prompt assembly, the chat-completion seam and citation links


use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::Config;
use crate::corpus::{Chunk, truncate_chars};
use crate::embeddings::EmbeddingError;
use crate::index::IndexError;
use crate::retriever::{RetrievalError, Retriever};

/// Instructions sent ahead of every question
pub const SYSTEM_PROMPT: &str = "You are a helpful and precise teaching assistant. \
Always answer based on the given context. If applicable, include specific links or \
phrases from the materials. Do not make up information. Keep the answer short and focused.";

const CONTEXT_SEPARATOR: &str = "\n\n";
const DEFAULT_EXCERPT_CHARS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    #[inline]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    #[inline]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Why the chat model produced no answer
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerationError {
    #[error("chat service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("chat request failed: {0}")]
    Transport(String),

    #[error("malformed chat response: {0}")]
    MalformedResponse(String),
}

/// Turns a message list into the assistant's reply
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, GenerationError>;
}

#[async_trait]
impl<T: ChatModel + ?Sized> ChatModel for Arc<T> {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, GenerationError> {
        (**self).complete(messages).await
    }
}

/// Everything a single question can fail with
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("question must not be empty")]
    EmptyQuestion,

    #[error("failed to embed question: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("search failed: {0}")]
    Search(#[from] IndexError),

    #[error("failed to generate answer: {0}")]
    Generation(#[from] GenerationError),
}

impl From<RetrievalError> for QueryError {
    #[inline]
    fn from(error: RetrievalError) -> Self {
        match error {
            RetrievalError::Embedding(e) => Self::Embedding(e),
            RetrievalError::Search(e) => Self::Search(e),
        }
    }
}

/// A citation: where a passage came from and how it starts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub url: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Answer {
    pub text: String,
    pub links: Vec<Link>,
}

/// Retrieved passages joined in retrieval order with a blank line between them
#[inline]
pub fn build_context(chunks: &[Chunk]) -> String {
    chunks
        .iter()
        .map(|chunk| chunk.text.as_str())
        .collect::<Vec<_>>()
        .join(CONTEXT_SEPARATOR)
}

#[inline]
pub fn build_messages(question: &str, chunks: &[Chunk]) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(SYSTEM_PROMPT),
        ChatMessage::user(format!(
            "Question: {}\n\nRelevant Materials:\n{}",
            question,
            build_context(chunks)
        )),
    ]
}

/// One link per chunk that has a source, in retrieval order
#[inline]
pub fn build_links(chunks: &[Chunk], excerpt_chars: usize) -> Vec<Link> {
    chunks
        .iter()
        .filter(|chunk| !chunk.source.is_empty())
        .map(|chunk| Link {
            url: chunk.source.clone(),
            text: truncate_chars(&chunk.text, excerpt_chars).to_string(),
        })
        .collect()
}

/// Asks the chat model about a set of retrieved chunks
#[derive(Clone)]
pub struct AnswerSynthesizer {
    model: Arc<dyn ChatModel>,
    excerpt_chars: usize,
}

impl AnswerSynthesizer {
    #[inline]
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self {
            model,
            excerpt_chars: DEFAULT_EXCERPT_CHARS,
        }
    }

    #[inline]
    #[must_use]
    pub fn with_excerpt_chars(mut self, excerpt_chars: usize) -> Self {
        self.excerpt_chars = excerpt_chars;
        self
    }

    /// The model's reply is used verbatim as the answer text
    #[inline]
    pub async fn synthesize(
        &self,
        question: &str,
        chunks: &[Chunk],
    ) -> Result<Answer, GenerationError> {
        let messages = build_messages(question, chunks);
        debug!(
            "Synthesizing answer from {} chunks ({} chars of context)",
            chunks.len(),
            messages.last().map_or(0, |m| m.content.len())
        );

        let text = self.model.complete(&messages).await?;

        Ok(Answer {
            text,
            links: build_links(chunks, self.excerpt_chars),
        })
    }
}

/// Retrieval plus synthesis: one question in, one answer out
#[derive(Clone)]
pub struct Assistant {
    retriever: Retriever,
    synthesizer: AnswerSynthesizer,
    top_k: usize,
}

impl Assistant {
    #[inline]
    pub fn new(retriever: Retriever, synthesizer: AnswerSynthesizer, top_k: usize) -> Self {
        Self {
            retriever,
            synthesizer,
            top_k,
        }
    }

    /// Wire up retrieval and synthesis with the configured `top_k` and excerpt length
    #[inline]
    pub fn from_config(
        config: &Config,
        retriever: Retriever,
        model: Arc<dyn ChatModel>,
    ) -> Self {
        Self::new(
            retriever,
            AnswerSynthesizer::new(model).with_excerpt_chars(config.retrieval.excerpt_chars),
            config.retrieval.top_k,
        )
    }

    #[inline]
    pub fn retriever(&self) -> &Retriever {
        &self.retriever
    }

    #[inline]
    pub async fn ask(&self, question: &str) -> Result<Answer, QueryError> {
        if question.trim().is_empty() {
            return Err(QueryError::EmptyQuestion);
        }

        let chunks = self.retriever.retrieve(question, self.top_k).await?;
        let answer = self.synthesizer.synthesize(question, &chunks).await?;

        info!(
            "Answered question with {} retrieved chunks, {} links",
            chunks.len(),
            answer.links.len()
        );
        Ok(answer)
    }
}
