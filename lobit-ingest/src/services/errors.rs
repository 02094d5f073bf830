//! Error taxonomy for the release pipeline
//!
//! Errors raised inside worker stages are captured into the task's state;
//! errors from caller-facing operations are returned directly.

use thiserror::Error;

/// Release pipeline errors
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Archive fetch failed (network error or non-2xx response)
    #[error("File download failed: {0}")]
    Download(String),

    /// Archive could not be written or unpacked
    #[error("Archive extraction failed: {0}")]
    Extract(String),

    /// Release content violates an ingestion rule (missing cover, mixed albums, ...)
    #[error("{0}")]
    Validation(String),

    /// A track's tags could not be read or a required tag is missing
    #[error("Cannot read tags of {file}: {reason}")]
    TagRead { file: String, reason: String },

    /// A task for the same key is still pending
    #[error("{0}")]
    Conflict(String),

    /// No task (or row) exists for the key
    #[error("{0}")]
    NotFound(String),

    /// The prerequisite task has not completed successfully
    #[error("{0}")]
    NotReady(String),

    /// Publishing a file to object storage failed
    #[error("Upload failed: {0}")]
    Upload(String),

    /// archive.org submission failed
    #[error("archive.org submission failed: {0}")]
    Submission(String),

    /// Persistence error
    #[error(transparent)]
    Database(#[from] lobit_common::Error),

    /// Local filesystem error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<sqlx::Error> for PipelineError {
    fn from(err: sqlx::Error) -> Self {
        PipelineError::Database(lobit_common::Error::Database(err))
    }
}

/// Result type for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;
