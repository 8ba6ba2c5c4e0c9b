//! # Error taxonomy
//!
//! Every fallible operation in the crate returns [`Result<T>`], whose error side is
//! [`RagError`]. Variants map one-to-one onto the failure classes a caller has to tell
//! apart: extraction rejects, empty input, backend failures, unusable index artifacts,
//! queries issued before an index exists, and generation output that could not be parsed.
//!
//! None of these touch caller-side state. A failed build leaves the previous index (if
//! any) in place; a failed generation leaves the loaded index queryable.

use std::path::PathBuf;

use thiserror::Error;

/// Errors produced by the chunking, indexing and retrieval pipeline.
#[derive(Debug, Error)]
pub enum RagError {
    /// No extractor is registered for the file's extension.
    #[error("unsupported file format: {extension:?}")]
    UnsupportedFormat { extension: String },

    /// Extraction produced no text, or chunking produced no chunks.
    #[error("document is empty: nothing to index")]
    EmptyDocument,

    /// The embedding service failed (network, auth, rate limit, timeout, bad shape).
    #[error("embedding backend error: {0}")]
    EmbeddingBackend(String),

    /// The completion service failed during chat, quiz, flashcard or summary generation.
    #[error("generation backend error: {0}")]
    GenerationBackend(String),

    /// One of the two index artifacts is missing, unreadable, or inconsistent with the other.
    #[error("corrupt index at {}: {reason}", path.display())]
    CorruptIndex { path: PathBuf, reason: String },

    /// A query was issued before any index was built or loaded.
    #[error("index not ready: build or load an index first")]
    IndexNotReady,

    /// Structured generation output could not be turned into records.
    #[error("malformed generation output: {reason}")]
    MalformedGenerationOutput { reason: String, raw: String },

    /// Caller-supplied arguments violate an operation's preconditions.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Configuration could not be resolved or failed validation.
    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl RagError {
    pub(crate) fn corrupt(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        RagError::CorruptIndex {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, RagError>;
