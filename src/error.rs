//! Error types for omnidict.
//!
//! Uses `thiserror` for structured error definitions. Storage faults,
//! backend faults and lookup-level failures are kept apart so callers can
//! tell which layer gave up.

use thiserror::Error;

/// Errors raised by a per-source cache store.
#[derive(Error, Debug)]
pub enum CacheError {
    /// The backing database could not be created or opened.
    #[error("Cache store for '{source_id}' unavailable: {message}")]
    StoreUnavailable { source_id: String, message: String },

    /// A read failed for a reason other than a missing entry.
    #[error("Cache read failed: {0}")]
    Read(#[source] rusqlite::Error),

    /// A write failed.
    #[error("Cache write failed: {0}")]
    Write(#[source] rusqlite::Error),

    /// The blocking task running a store operation failed.
    #[error("Cache task failed: {0}")]
    Blocking(String),
}

/// Errors raised while fetching or parsing a dictionary entry.
#[derive(Error, Debug)]
pub enum DictionaryError {
    /// HTTP request failed or returned a non-success status
    #[error("Fetch failed: {0}")]
    Fetch(String),

    /// The source has no entry for the term
    #[error("No entry found for '{0}'")]
    NotFound(String),

    /// The payload could not be turned into a document
    #[error("Failed to parse entry: {0}")]
    Parse(String),
}

impl From<reqwest::Error> for DictionaryError {
    fn from(err: reqwest::Error) -> Self {
        DictionaryError::Fetch(err.to_string())
    }
}

/// Errors raised while rendering a result document.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    /// The document carries nothing to display
    #[error("Document for '{0}' has no content")]
    Empty(String),
}

/// Which stage of a per-source lookup failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Fetch,
    Parse,
    Render,
    /// The backend panicked mid-lookup.
    Panic,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            FailureKind::Fetch => "fetch",
            FailureKind::Parse => "parse",
            FailureKind::Render => "render",
            FailureKind::Panic => "panic",
        };
        f.write_str(label)
    }
}

impl DictionaryError {
    /// Classifies this error for aggregate reporting.
    pub fn kind(&self) -> FailureKind {
        match self {
            DictionaryError::Fetch(_) | DictionaryError::NotFound(_) => FailureKind::Fetch,
            DictionaryError::Parse(_) => FailureKind::Parse,
        }
    }
}

/// Errors returned by the aggregator.
#[derive(Error, Debug)]
pub enum LookupError {
    /// The lookup term was empty or whitespace-only
    #[error("Lookup term cannot be empty")]
    EmptyTerm,

    /// One source failed, so the whole lookup failed
    #[error("{kind} error from {source_id} dictionary: {message}")]
    Source {
        source_id: String,
        kind: FailureKind,
        message: String,
    },

    /// The lookup was cancelled before every source finished
    #[error("Lookup cancelled")]
    Cancelled,

    /// Two backends were registered under the same identifier
    #[error("Duplicate dictionary source: {0}")]
    DuplicateSource(String),

    /// A cache store could not be opened at construction time
    #[error(transparent)]
    Store(#[from] CacheError),

    /// A lookup task panicked or was aborted unexpectedly
    #[error("Lookup task failed: {0}")]
    Task(String),
}

impl LookupError {
    /// Returns the source identifier this error refers to, if any.
    pub fn source_id(&self) -> Option<&str> {
        match self {
            LookupError::Source { source_id, .. } => Some(source_id),
            LookupError::DuplicateSource(id) => Some(id),
            _ => None,
        }
    }
}

/// Validation and backend errors from a text-rewrite service.
#[derive(Error, Debug)]
pub enum RewriteError {
    /// Mode is not one of the supported rewrite modes
    #[error("Invalid mode: {0}")]
    InvalidMode(String),

    /// The text to rewrite was empty
    #[error("Input text cannot be empty")]
    EmptyInput,

    /// The underlying generator failed
    #[error("Rewrite failed: {0}")]
    Backend(String),
}

/// Error type for configuration operations.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    /// Failed to parse config file
    #[error("Failed to parse config: {0}")]
    ParseError(String),

    /// Invalid configuration value
    #[error("Invalid config value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Config directory not found
    #[error("Could not determine config directory")]
    NoConfigDir,
}

/// Result type alias using anyhow for application-level error handling.
pub type Result<T> = anyhow::Result<T>;
