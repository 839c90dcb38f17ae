use thiserror::Error;

pub type Result<T> = std::result::Result<T, RagError>;

#[derive(Error, Debug)]
pub enum RagError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Index build error: {0}")]
    Index(#[from] index::IndexError),

    #[error("Index load error: {0}")]
    IndexLoad(#[from] index::IndexLoadError),

    #[error("Query error: {0}")]
    Query(#[from] answer::QueryError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub mod answer;
pub mod commands;
pub mod config;
pub mod corpus;
pub mod embeddings;
pub mod index;
pub mod indexer;
pub mod openai;
pub mod retriever;
pub mod server;
