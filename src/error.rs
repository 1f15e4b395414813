use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StargazerError {
    #[error("GitHub API error: {0}")]
    ApiError(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    #[error("Invalid repository URL: {0}")]
    InvalidRepoUrl(String),

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Store is locked by another writer: {0}")]
    LockContention(String),

    #[error("Deadline exceeded: {0}")]
    DeadlineExceeded(String),

    #[error("Unknown source: {0}")]
    UnknownSource(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl StargazerError {
    /// Whether a load attempt that failed with this error may be retried.
    pub fn is_lock_contention(&self) -> bool {
        matches!(self, StargazerError::LockContention(_))
    }
}

pub type Result<T> = std::result::Result<T, StargazerError>;

/// Pipeline step in which a source failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Extract,
    Load,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Extract => write!(f, "extract"),
            Phase::Load => write!(f, "load"),
        }
    }
}

/// Failure of one source's pipeline, carrying enough context to re-run it alone.
#[derive(Error, Debug)]
#[error("[{source_name}] {phase} failed: {cause}")]
pub struct PipelineError {
    pub source_name: String,
    pub phase: Phase,
    #[source]
    pub cause: StargazerError,
}

impl PipelineError {
    pub fn new(source_name: impl Into<String>, phase: Phase, cause: StargazerError) -> Self {
        Self {
            source_name: source_name.into(),
            phase,
            cause,
        }
    }
}
