//! Error types shared by the indexing and query pipelines.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, IndexError>;

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Corpus error: {0}")]
    Corpus(String),

    #[error("Worker error: {0}")]
    Worker(String),

    #[error("Merge error: {0}")]
    Merge(String),

    #[error("Query error: {0}")]
    Query(String),
}
