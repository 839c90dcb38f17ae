
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::{debug, error, warn};
use url::Url;

use crate::answer::{ChatMessage, ChatModel, GenerationError};
use crate::config::OpenAiConfig;
use crate::embeddings::{Embedder, EmbeddingError, check_vector};

const DEFAULT_RETRY_DELAY_MS: u64 = 1000;
const EXPONENTIAL_BACKOFF_BASE: u32 = 2;
const ERROR_BODY_LIMIT: usize = 500;

/// Blocking client for an OpenAI-compatible API (`/embeddings`, `/chat/completions`).
///
/// The async trait impls run each call on tokio's blocking pool.
#[derive(Clone)]
pub struct OpenAiClient {
    embeddings_url: Url,
    chat_url: Url,
    api_key: String,
    embedding_model: String,
    chat_model: String,
    agent: ureq::Agent,
    retry_attempts: u32,
    retry_delay: Duration,
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    data: Vec<EmbedData>,
}

#[derive(Debug, Deserialize)]
struct EmbedData {
    embedding: Vec<f32>,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

/// What went wrong with one HTTP exchange, before it is mapped to a caller-facing error
#[derive(Debug)]
enum HttpFailure {
    Status { status: u16, body: String },
    Transport(String),
}

impl HttpFailure {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::Transport(_) => true,
        }
    }
}

impl From<HttpFailure> for EmbeddingError {
    fn from(failure: HttpFailure) -> Self {
        match failure {
            HttpFailure::Status { status, body } => Self::Status { status, body },
            HttpFailure::Transport(message) => Self::Transport(message),
        }
    }
}

impl From<HttpFailure> for GenerationError {
    fn from(failure: HttpFailure) -> Self {
        match failure {
            HttpFailure::Status { status, body } => Self::Status { status, body },
            HttpFailure::Transport(message) => Self::Transport(message),
        }
    }
}

impl fmt::Debug for OpenAiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiClient")
            .field("embeddings_url", &self.embeddings_url.as_str())
            .field("chat_url", &self.chat_url.as_str())
            .field("embedding_model", &self.embedding_model)
            .field("chat_model", &self.chat_model)
            .field("retry_attempts", &self.retry_attempts)
            .finish_non_exhaustive()
    }
}

impl OpenAiClient {
    #[inline]
    pub fn new(config: &OpenAiConfig) -> Result<Self> {
        config
            .validate()
            .context("Invalid OpenAI configuration")?;

        if config.api_key.trim().is_empty() {
            warn!("No API key configured; requests will be sent without authorization");
        }

        Ok(Self {
            embeddings_url: config
                .endpoint("embeddings")
                .context("Failed to build embeddings URL")?,
            chat_url: config
                .endpoint("chat/completions")
                .context("Failed to build chat completions URL")?,
            api_key: config.api_key.trim().to_string(),
            embedding_model: config.embedding_model.clone(),
            chat_model: config.chat_model.clone(),
            agent: build_agent(Duration::from_secs(config.timeout_seconds)),
            retry_attempts: config.retry_attempts,
            retry_delay: Duration::from_millis(DEFAULT_RETRY_DELAY_MS),
        })
    }

    #[inline]
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.agent = build_agent(timeout);
        self
    }

    #[inline]
    #[must_use]
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts.max(1);
        self
    }

    /// Delay before the first retry; doubles on every further attempt
    #[inline]
    #[must_use]
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Embed one text, retrying transient failures
    #[inline]
    pub fn embed_blocking(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        debug!("Generating embedding for text (length: {})", text.len());

        let request = EmbedRequest {
            model: &self.embedding_model,
            input: text,
        };
        let request_json = serde_json::to_string(&request)
            .map_err(|e| EmbeddingError::Transport(format!("failed to encode request: {}", e)))?;

        let response_text = self.make_request_with_retry(&self.embeddings_url, &request_json)?;

        let response: EmbedResponse = serde_json::from_str(&response_text)
            .map_err(|e| EmbeddingError::MalformedResponse(e.to_string()))?;
        let embedding = response
            .data
            .into_iter()
            .next()
            .map(|entry| entry.embedding)
            .ok_or_else(|| EmbeddingError::MalformedResponse("response has no data".to_string()))?;
        check_vector(&embedding)?;

        debug!("Generated embedding with {} dimensions", embedding.len());
        Ok(embedding)
    }

    /// Run one chat completion; never retried
    #[inline]
    pub fn complete_blocking(&self, messages: &[ChatMessage]) -> Result<String, GenerationError> {
        debug!("Requesting chat completion with {} messages", messages.len());

        let request = ChatRequest {
            model: &self.chat_model,
            messages,
        };
        let request_json = serde_json::to_string(&request)
            .map_err(|e| GenerationError::Transport(format!("failed to encode request: {}", e)))?;

        let response_text = self.post_json(&self.chat_url, &request_json)?;

        let response: ChatResponse = serde_json::from_str(&response_text)
            .map_err(|e| GenerationError::MalformedResponse(e.to_string()))?;
        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| {
                GenerationError::MalformedResponse("response has no message content".to_string())
            })
    }

    fn post_json(&self, url: &Url, body: &str) -> Result<String, HttpFailure> {
        let mut request = self
            .agent
            .post(url.as_str())
            .header("Content-Type", "application/json");
        if !self.api_key.is_empty() {
            request = request.header("Authorization", format!("Bearer {}", self.api_key));
        }

        let mut response = request
            .send(body)
            .map_err(|e| HttpFailure::Transport(e.to_string()))?;
        let status = response.status();
        let text = response
            .body_mut()
            .read_to_string()
            .map_err(|e| HttpFailure::Transport(format!("failed to read response body: {}", e)))?;

        if status.is_success() {
            Ok(text)
        } else {
            Err(HttpFailure::Status {
                status: status.as_u16(),
                body: crate::corpus::truncate_chars(text.trim(), ERROR_BODY_LIMIT).to_string(),
            })
        }
    }

    fn make_request_with_retry(&self, url: &Url, body: &str) -> Result<String, HttpFailure> {
        let mut attempt = 1;

        loop {
            debug!("HTTP request attempt {}/{}", attempt, self.retry_attempts);

            match self.post_json(url, body) {
                Ok(response_text) => {
                    debug!("Request succeeded on attempt {}", attempt);
                    return Ok(response_text);
                }
                Err(failure) if failure.is_retryable() && attempt < self.retry_attempts => {
                    warn!(
                        "Request to {} failed ({:?}), attempt {}/{}",
                        url, failure, attempt, self.retry_attempts
                    );
                    let delay = self.retry_delay * EXPONENTIAL_BACKOFF_BASE.pow(attempt - 1);
                    debug!("Waiting {:?} before retry", delay);
                    std::thread::sleep(delay);
                    attempt += 1;
                }
                Err(failure) => {
                    error!("Request to {} failed: {:?}", url, failure);
                    return Err(failure);
                }
            }
        }
    }
}

fn build_agent(timeout: Duration) -> ureq::Agent {
    ureq::Agent::config_builder()
        .timeout_global(Some(timeout))
        .http_status_as_error(false)
        .build()
        .into()
}

#[async_trait]
impl Embedder for OpenAiClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let client = self.clone();
        let text = text.to_string();
        tokio::task::spawn_blocking(move || client.embed_blocking(&text))
            .await
            .map_err(|e| EmbeddingError::Transport(format!("embedding task failed: {}", e)))?
    }
}

#[async_trait]
impl ChatModel for OpenAiClient {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, GenerationError> {
        let client = self.clone();
        let messages = messages.to_vec();
        tokio::task::spawn_blocking(move || client.complete_blocking(&messages))
            .await
            .map_err(|e| GenerationError::Transport(format!("generation task failed: {}", e)))?
    }
}
