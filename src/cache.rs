//! Per-source persistent cache of raw dictionary responses.
//!
//! Each store owns one SQLite database bound to a single source for its
//! whole lifetime, so entries never cross sources.

use crate::error::CacheError;
use rusqlite::{Connection, OptionalExtension, params};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS entries (
    term TEXT PRIMARY KEY,
    payload TEXT NOT NULL,
    fetched_at INTEGER NOT NULL
);
"#;

/// Hit and miss counters for a store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

/// SQLite-backed cache bound to one dictionary source.
pub struct CacheStore {
    source: String,
    path: Option<PathBuf>,
    conn: Mutex<Connection>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl std::fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheStore")
            .field("source", &self.source)
            .field("path", &self.path)
            .finish()
    }
}

impl CacheStore {
    /// Opens (or creates) the store for `source` inside `dir`.
    ///
    /// Opening the same source twice is harmless; the schema is only created
    /// when missing.
    pub fn open(source: &str, dir: &Path) -> Result<Self, CacheError> {
        let unavailable = |message: String| CacheError::StoreUnavailable {
            source_id: source.to_string(),
            message,
        };

        std::fs::create_dir_all(dir)
            .map_err(|e| unavailable(format!("{}: {}", dir.display(), e)))?;

        let path = dir.join(format!("{}.db", source));
        let conn = Connection::open(&path).map_err(|e| unavailable(e.to_string()))?;
        conn.execute_batch(SCHEMA)
            .map_err(|e| unavailable(e.to_string()))?;

        tracing::debug!(source, path = %path.display(), "opened cache store");
        Ok(Self::from_connection(source, Some(path), conn))
    }

    /// Opens a store that lives only as long as this handle.
    pub fn open_in_memory(source: &str) -> Result<Self, CacheError> {
        let unavailable = |e: rusqlite::Error| CacheError::StoreUnavailable {
            source_id: source.to_string(),
            message: e.to_string(),
        };
        let conn = Connection::open_in_memory().map_err(unavailable)?;
        conn.execute_batch(SCHEMA).map_err(unavailable)?;
        Ok(Self::from_connection(source, None, conn))
    }

    fn from_connection(source: &str, path: Option<PathBuf>, conn: Connection) -> Self {
        Self {
            source: source.to_string(),
            path,
            conn: Mutex::new(conn),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// The source this store is bound to.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Database file path, `None` for in-memory stores.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Looks up the cached payload for `term`. A miss is `Ok(None)`.
    pub fn get(&self, term: &str) -> Result<Option<String>, CacheError> {
        let key = cache_key(term);
        let payload = self
            .lock()
            .query_row(
                "SELECT payload FROM entries WHERE term = ?1",
                params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()
            .map_err(CacheError::Read)?;

        match payload {
            Some(_) => self.hits.fetch_add(1, Ordering::Relaxed),
            None => self.misses.fetch_add(1, Ordering::Relaxed),
        };
        tracing::debug!(source = %self.source, term = %key, hit = payload.is_some(), "cache lookup");
        Ok(payload)
    }

    /// Stores `payload` for `term`, replacing any previous entry.
    pub fn put(&self, term: &str, payload: &str) -> Result<(), CacheError> {
        let fetched_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or_default();

        self.lock()
            .execute(
                "INSERT OR REPLACE INTO entries (term, payload, fetched_at) VALUES (?1, ?2, ?3)",
                params![cache_key(term), payload, fetched_at],
            )
            .map_err(CacheError::Write)?;
        Ok(())
    }

    /// Drops the entry for `term`. Returns whether one existed.
    pub fn remove(&self, term: &str) -> Result<bool, CacheError> {
        let removed = self
            .lock()
            .execute("DELETE FROM entries WHERE term = ?1", params![cache_key(term)])
            .map_err(CacheError::Write)?;
        Ok(removed > 0)
    }

    /// Removes every entry.
    pub fn clear(&self) -> Result<(), CacheError> {
        self.lock()
            .execute("DELETE FROM entries", [])
            .map_err(CacheError::Write)?;
        Ok(())
    }

    /// Number of cached terms.
    pub fn len(&self) -> Result<usize, CacheError> {
        let count: i64 = self
            .lock()
            .query_row("SELECT COUNT(*) FROM entries", [], |row| row.get(0))
            .map_err(CacheError::Read)?;
        Ok(count as usize)
    }

    /// Returns true if nothing is cached.
    pub fn is_empty(&self) -> Result<bool, CacheError> {
        Ok(self.len()? == 0)
    }

    /// Hit/miss counters since the store was opened.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    /// Closes the underlying database, flushing pending state.
    pub fn close(self) -> Result<(), CacheError> {
        let conn = self
            .conn
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        conn.close().map_err(|(_, e)| CacheError::Write(e))?;
        tracing::debug!(source = %self.source, "closed cache store");
        Ok(())
    }

    /// [`get`](Self::get) on the blocking thread pool.
    pub async fn get_async(self: &Arc<Self>, term: &str) -> Result<Option<String>, CacheError> {
        let store = Arc::clone(self);
        let term = term.to_string();
        tokio::task::spawn_blocking(move || store.get(&term))
            .await
            .map_err(|e| CacheError::Blocking(e.to_string()))?
    }

    /// [`put`](Self::put) on the blocking thread pool.
    pub async fn put_async(self: &Arc<Self>, term: &str, payload: &str) -> Result<(), CacheError> {
        let store = Arc::clone(self);
        let term = term.to_string();
        let payload = payload.to_string();
        tokio::task::spawn_blocking(move || store.put(&term, &payload))
            .await
            .map_err(|e| CacheError::Blocking(e.to_string()))?
    }

    #[cfg(test)]
    pub(crate) fn drop_schema(&self) {
        self.lock()
            .execute_batch("DROP TABLE entries")
            .expect("drop entries table");
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        // Poisoning is ignored; SQLite keeps its own transactional state.
        self.conn
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Normalizes a term into its cache key.
///
/// Only surrounding whitespace is dropped; case policy belongs to each
/// dictionary.
pub fn cache_key(term: &str) -> String {
    term.trim().to_string()
}
