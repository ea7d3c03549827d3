//! Omnidict - multi-source dictionary lookup.
//!
//! This library provides functionality for:
//! - Querying several online dictionaries concurrently for one term
//! - Caching raw dictionary responses per source in SQLite
//! - Describing the text-rewrite service the lookup UI sits next to

pub mod aggregator;
pub mod cache;
pub mod config;
pub mod console;
pub mod dictionaries;
pub mod error;
pub mod rewrite;

// Re-export commonly used types
pub use aggregator::{AggregateResult, Aggregator, LookupOptions};
pub use cache::{CacheStats, CacheStore};
pub use config::Config;
pub use console::Console;
pub use dictionaries::{Dictionary, DictionaryRegistry, ResultDocument, SourceId};
pub use error::{CacheError, ConfigError, DictionaryError, FailureKind, LookupError, RewriteError};
pub use rewrite::{RewriteMode, RewriteRequest, TextRewriter};
