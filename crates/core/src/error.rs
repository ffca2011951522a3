//! Error types for codegraph-core.
//!
//! Uses a hierarchical error enum so callers can pattern-match on
//! the subsystem that failed, matching the taxonomy of kinds (not type
//! names) in the design: recoverable, degraded, fatal, and wrapped.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type for all codegraph-core operations.
#[derive(Debug, Error)]
pub enum IndexError {
    // ---- Recoverable (single file, rest of index unaffected) ----
    /// The grammar rejected the input; chunker falls back to whole-file chunking.
    #[error("parse error for {path}: {message}")]
    Parse {
        /// Path to the file that failed to parse.
        path: PathBuf,
        /// Human-readable error description.
        message: String,
    },

    /// No parser is registered for this language tag.
    #[error("unsupported language tag: {tag}")]
    UnsupportedLanguage {
        /// The unrecognized tag.
        tag: String,
    },

    /// File exceeds the configured size ceiling; skipped, not marked processed.
    #[error("file too large: {path} ({size} bytes > {limit} byte limit)")]
    FileTooLarge {
        /// Path to the oversized file.
        path: PathBuf,
        /// Actual file size in bytes.
        size: u64,
        /// Configured limit in bytes.
        limit: u64,
    },

    /// Requested file, chunk, or symbol was not found in the index.
    #[error("not found: {entity}")]
    NotFound {
        /// Description of what was not found.
        entity: String,
    },

    // ---- Degraded (system works with reduced capability) ----
    /// FTS index is corrupt; searches fall back to vector-only for the session.
    #[error("full-text index corrupted: {details}")]
    FtsCorruption {
        /// Diagnostic details from the integrity check.
        details: String,
    },

    // ---- Fatal (threatens whole-run consistency) ----
    /// Embedding batch rejected by the provider; run aborts, prior per-file state stays.
    #[error("embedding failure: {message}")]
    Embedding {
        /// Human-readable error description.
        message: String,
    },

    /// Storage transaction failed and was rolled back.
    #[error("storage failure: {message}")]
    Storage {
        /// Human-readable error description.
        message: String,
    },

    /// The run was cancelled via the cancellation token.
    #[error("cancelled: {reason}")]
    Cancelled {
        /// Why the run was cancelled.
        reason: String,
    },

    /// Configuration is invalid or missing required fields.
    #[error("configuration error: {details}")]
    Config {
        /// What's wrong with the config.
        details: String,
    },

    // ---- Wrapped external errors ----
    /// SQLite error.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Generic internal error for unexpected conditions.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Convenience type alias for Results in codegraph-core.
pub type IndexResult<T> = Result<T, IndexError>;
