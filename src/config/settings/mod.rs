
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";
pub const BASE_URL_ENV: &str = "OPENAI_BASE_URL";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub openai: OpenAiConfig,
    #[serde(default)]
    pub corpus: CorpusConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(skip)]
    pub base_dir: PathBuf,
}

/// Remote OpenAI-compatible API used for both embeddings and chat completions
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OpenAiConfig {
    pub base_url: String,
    pub api_key: String,
    pub embedding_model: String,
    pub chat_model: String,
    pub timeout_seconds: u64,
    pub retry_attempts: u32,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://aipipe.org/openai/v1".to_string(),
            api_key: String::new(),
            embedding_model: "text-embedding-3-small".to_string(),
            chat_model: "gpt-4o-mini".to_string(),
            timeout_seconds: 30,
            retry_attempts: 3,
        }
    }
}

/// Where the raw corpus lives and how aggressively near-empty units are filtered
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CorpusConfig {
    pub course_dir: PathBuf,
    pub course_extensions: Vec<String>,
    pub course_min_chars: usize,
    pub discourse_file: PathBuf,
    pub discourse_min_chars: usize,
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            course_dir: PathBuf::from("data/course_content"),
            course_extensions: ["md", "py", "txt", "ipynb"]
                .iter()
                .map(|ext| (*ext).to_string())
                .collect(),
            course_min_chars: 100,
            discourse_file: PathBuf::from("data/discourse/discourse_posts.json"),
            discourse_min_chars: 50,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct IndexConfig {
    /// Index root holding the `CURRENT` pointer and the `versions/` directory
    pub directory: PathBuf,
    /// Stored chunk text is cut to this many characters at build time
    pub stored_text_chars: usize,
    /// Maximum number of embedding calls in flight during a build
    pub concurrency: usize,
    /// Number of index versions kept on disk, the live one included
    pub keep_versions: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("embeddings"),
            stored_text_chars: 200,
            concurrency: 8,
            keep_versions: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetrievalConfig {
    pub top_k: usize,
    /// Length of the text preview attached to each citation link
    pub excerpt_chars: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            excerpt_chars: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
            allowed_origins: vec![
                "http://localhost:8000".to_string(),
                "http://127.0.0.1:8000".to_string(),
            ],
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid URL format: {0}")]
    InvalidUrl(String),
    #[error("Invalid protocol: {0} (must be 'http' or 'https')")]
    InvalidProtocol(String),
    #[error("Invalid model name: {0:?} (cannot be empty)")]
    InvalidModel(String),
    #[error("Invalid timeout: {0} (must be between 1 and 600 seconds)")]
    InvalidTimeout(u64),
    #[error("Invalid retry attempts: {0} (must be between 1 and 10)")]
    InvalidRetryAttempts(u32),
    #[error("Invalid course file extension: {0:?}")]
    InvalidExtension(String),
    #[error("Invalid stored text length: {0} (must be greater than 0)")]
    InvalidStoredTextChars(usize),
    #[error("Invalid concurrency: {0} (must be between 1 and 64)")]
    InvalidConcurrency(usize),
    #[error("Invalid number of kept index versions: {0} (must be at least 1)")]
    InvalidKeepVersions(usize),
    #[error("Invalid top_k: {0} (must be between 1 and 50)")]
    InvalidTopK(usize),
    #[error("Invalid excerpt length: {0} (must be greater than 0)")]
    InvalidExcerptChars(usize),
    #[error("Invalid bind address: {0}")]
    InvalidBindAddress(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl Default for Config {
    #[inline]
    fn default() -> Self {
        Self {
            openai: OpenAiConfig::default(),
            corpus: CorpusConfig::default(),
            index: IndexConfig::default(),
            retrieval: RetrievalConfig::default(),
            server: ServerConfig::default(),
            base_dir: PathBuf::from("."),
        }
    }
}

impl Config {
    /// Load `config.toml` from `base_dir`, falling back to defaults when it is absent.
    /// Credentials from the environment take precedence over the file.
    #[inline]
    pub fn load<P: AsRef<Path>>(base_dir: P) -> Result<Self> {
        let mut config = Self::load_file(base_dir)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config
            .validate()
            .with_context(|| "Configuration validation failed")?;
        Ok(config)
    }

    fn load_file<P: AsRef<Path>>(base_dir: P) -> Result<Self> {
        let base_dir = base_dir.as_ref().to_path_buf();
        let config_path = base_dir.join(CONFIG_FILE_NAME);

        if !config_path.exists() {
            return Ok(Self {
                base_dir,
                ..Self::default()
            });
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;
        config.base_dir = base_dir;

        Ok(config)
    }

    /// Overlay values found through `lookup` (normally the process environment)
    #[inline]
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup(API_KEY_ENV).filter(|k| !k.trim().is_empty()) {
            self.openai.api_key = key.trim().to_string();
        }
        if let Some(url) = lookup(BASE_URL_ENV).filter(|u| !u.trim().is_empty()) {
            self.openai.base_url = url.trim().to_string();
        }
    }

    #[inline]
    pub fn save(&self) -> Result<()> {
        self.validate()
            .context("Configuration validation failed before saving")?;

        fs::create_dir_all(&self.base_dir).with_context(|| {
            format!(
                "Failed to create config directory: {}",
                self.base_dir.display()
            )
        })?;

        let config_path = self.config_file_path();
        let content = toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

        Ok(())
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.openai.validate()?;
        self.validate_corpus_config()?;
        self.validate_index_config()?;

        if !(1..=50).contains(&self.retrieval.top_k) {
            return Err(ConfigError::InvalidTopK(self.retrieval.top_k));
        }
        if self.retrieval.excerpt_chars == 0 {
            return Err(ConfigError::InvalidExcerptChars(self.retrieval.excerpt_chars));
        }

        self.server
            .bind
            .parse::<SocketAddr>()
            .map_err(|_| ConfigError::InvalidBindAddress(self.server.bind.clone()))?;

        Ok(())
    }

    fn validate_corpus_config(&self) -> Result<(), ConfigError> {
        if let Some(bad) = self
            .corpus
            .course_extensions
            .iter()
            .find(|ext| ext.trim().is_empty() || ext.contains(['.', '/', '*']))
        {
            return Err(ConfigError::InvalidExtension(bad.clone()));
        }
        Ok(())
    }

    fn validate_index_config(&self) -> Result<(), ConfigError> {
        let config = &self.index;

        if config.stored_text_chars == 0 {
            return Err(ConfigError::InvalidStoredTextChars(config.stored_text_chars));
        }
        if !(1..=64).contains(&config.concurrency) {
            return Err(ConfigError::InvalidConcurrency(config.concurrency));
        }
        if config.keep_versions == 0 {
            return Err(ConfigError::InvalidKeepVersions(config.keep_versions));
        }

        Ok(())
    }

    /// Get the base directory that relative paths resolve against
    #[inline]
    pub fn get_base_dir(&self) -> &Path {
        &self.base_dir
    }

    #[inline]
    pub fn config_file_path(&self) -> PathBuf {
        self.base_dir.join(CONFIG_FILE_NAME)
    }

    #[inline]
    pub fn index_root(&self) -> PathBuf {
        self.resolve(&self.index.directory)
    }

    #[inline]
    pub fn course_dir(&self) -> PathBuf {
        self.resolve(&self.corpus.course_dir)
    }

    #[inline]
    pub fn discourse_file(&self) -> PathBuf {
        self.resolve(&self.corpus.discourse_file)
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }
}

impl OpenAiConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = Url::parse(&self.base_url)
            .map_err(|_| ConfigError::InvalidUrl(self.base_url.clone()))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ConfigError::InvalidProtocol(url.scheme().to_string()));
        }

        if self.embedding_model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.embedding_model.clone()));
        }
        if self.chat_model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.chat_model.clone()));
        }

        if !(1..=600).contains(&self.timeout_seconds) {
            return Err(ConfigError::InvalidTimeout(self.timeout_seconds));
        }
        if !(1..=10).contains(&self.retry_attempts) {
            return Err(ConfigError::InvalidRetryAttempts(self.retry_attempts));
        }

        Ok(())
    }

    /// Build the URL of an API route below `base_url`, e.g. `embeddings`
    pub fn endpoint(&self, route: &str) -> Result<Url, ConfigError> {
        let joined = format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            route.trim_start_matches('/')
        );
        Url::parse(&joined).map_err(|_| ConfigError::InvalidUrl(joined))
    }

    /// API key with everything but the last four characters hidden
    pub fn masked_api_key(&self) -> String {
        let count = self.api_key.chars().count();
        if count == 0 {
            return "(not set)".to_string();
        }
        let visible: String = self.api_key.chars().skip(count.saturating_sub(4)).collect();
        format!("****{}", visible)
    }
}
