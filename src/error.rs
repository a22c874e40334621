//! Error taxonomy for ingestion and serving.
//!
//! Per-document load failures are isolated by the indexer and never abort
//! a run. Every other error aborts the single operation in progress and
//! carries the domain / session / cause needed to diagnose it.

use thiserror::Error;

/// Invalid `(max_size, overlap)` pair passed to the chunker.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid chunk configuration: overlap {overlap} must be < max_size {max_size} and max_size > 0")]
pub struct ChunkConfigError {
    pub max_size: usize,
    pub overlap: usize,
}

/// One source document could not be parsed. Logged and skipped by the indexer.
#[derive(Debug, Error)]
#[error("failed to load {path}: {reason}")]
pub struct DocumentLoadError {
    pub path: String,
    pub reason: String,
}

impl DocumentLoadError {
    pub fn new(path: impl Into<String>, reason: impl ToString) -> Self {
        Self {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

/// Failures of an index build. None of them leave a partial index behind.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("no chunk-able content found; index at {location} not written")]
    EmptyCorpus { location: String },

    #[error(transparent)]
    ChunkConfig(#[from] ChunkConfigError),

    #[error("embedding failed: {0:#}")]
    Embedding(anyhow::Error),

    #[error("embedding provider returned {actual} vectors for {expected} texts")]
    VectorCountMismatch { expected: usize, actual: usize },

    #[error("vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("I/O error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid index artifact {path}: {reason}")]
    InvalidArtifact { path: String, reason: String },

    #[error(transparent)]
    Serialize(#[from] serde_json::Error),
}

impl IndexError {
    pub(crate) fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

/// A domain index could not be served.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("index for domain '{domain}' not found at {location}")]
    NotFound { domain: String, location: String },

    #[error("index for domain '{domain}' at {location} is unreadable: {source}")]
    Corrupt {
        domain: String,
        location: String,
        #[source]
        source: IndexError,
    },
}

/// The generation provider failed. Never retried.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("generation provider is disabled; set [generation] provider in config")]
    Disabled,

    #[error("generation provider '{provider}' failed: {source:#}")]
    Provider {
        provider: String,
        source: anyhow::Error,
    },

    #[error("generation provider '{provider}' returned an empty response")]
    EmptyResponse { provider: String },
}

/// Failures of [`Responder::answer`](crate::responder::Responder::answer).
///
/// Whatever the variant, no turn has been appended to the conversation.
#[derive(Debug, Error)]
pub enum AnswerError {
    #[error("query must not be empty")]
    EmptyQuery,

    #[error("index unavailable for domain '{domain}': {source}")]
    IndexUnavailable {
        domain: String,
        #[source]
        source: RegistryError,
    },

    #[error("retrieval failed for domain '{domain}': {source:#}")]
    Retrieval {
        domain: String,
        source: anyhow::Error,
    },

    #[error("generation failed for domain '{domain}', session '{session_id}': {source}")]
    Generation {
        domain: String,
        session_id: String,
        #[source]
        source: GenerationError,
    },

    #[error("conversation store failed for domain '{domain}', session '{session_id}': {source:#}")]
    Store {
        domain: String,
        session_id: String,
        source: anyhow::Error,
    },
}

/// User registration failures.
#[derive(Debug, Error)]
pub enum UserError {
    #[error("{0} is required")]
    MissingField(&'static str),

    #[error("email already exists: {0}")]
    EmailExists(String),

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}
