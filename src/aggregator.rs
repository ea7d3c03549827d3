//! Multi-source lookup aggregation.
//!
//! An [`Aggregator`] owns every configured dictionary together with its
//! cache store. A lookup fans out one task per source, waits for all of them
//! and returns either every rendered result or a single error naming the
//! source that failed. Partial results are never returned.

use crate::cache::{CacheStats, CacheStore};
use crate::dictionaries::{Dictionary, DictionaryRegistry, search};
use crate::error::{CacheError, FailureKind, LookupError};
use regex::Regex;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, LazyLock};
use tokio::sync::Semaphore;
use tokio::task::{self, JoinSet};
use tokio_util::sync::CancellationToken;

static WHITESPACE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("Invalid WHITESPACE_REGEX"));

/// Rendered output keyed by source identifier.
pub type AggregateResult = HashMap<String, String>;

/// Per-call lookup options.
#[derive(Debug, Clone, Default)]
pub struct LookupOptions {
    /// Skip cached payloads and fetch every source again.
    pub force_refresh: bool,

    /// Aborts in-flight fetches when triggered.
    pub cancel: Option<CancellationToken>,
}

/// A dictionary paired with the store bound to it.
struct Backend {
    dictionary: Arc<dyn Dictionary>,
    store: Arc<CacheStore>,
}

/// Queries several dictionaries concurrently and merges their output.
pub struct Aggregator {
    backends: Vec<Backend>,
    permits: Arc<Semaphore>,
}

impl Aggregator {
    /// Opens one cache store per registered dictionary under `cache_dir`.
    ///
    /// Fails if any store cannot be opened; no dictionary is ever queried
    /// without its cache.
    pub fn new(
        registry: DictionaryRegistry,
        cache_dir: &Path,
        max_concurrent: usize,
    ) -> Result<Self, LookupError> {
        let mut parts = Vec::with_capacity(registry.len());
        for dictionary in registry.all() {
            let store = CacheStore::open(dictionary.id(), cache_dir)?;
            parts.push((Arc::clone(dictionary), store));
        }
        Self::from_parts(parts, max_concurrent)
    }

    /// Builds an aggregator from already opened stores.
    ///
    /// Each store must be bound to the dictionary it is paired with.
    pub fn from_parts(
        parts: Vec<(Arc<dyn Dictionary>, CacheStore)>,
        max_concurrent: usize,
    ) -> Result<Self, LookupError> {
        let mut backends: Vec<Backend> = Vec::with_capacity(parts.len());
        for (dictionary, store) in parts {
            if backends.iter().any(|b| b.dictionary.id() == dictionary.id()) {
                return Err(LookupError::DuplicateSource(dictionary.id().to_string()));
            }
            if store.source() != dictionary.id() {
                return Err(LookupError::Store(CacheError::StoreUnavailable {
                    source_id: dictionary.id().to_string(),
                    message: format!("store is bound to '{}'", store.source()),
                }));
            }
            backends.push(Backend {
                dictionary,
                store: Arc::new(store),
            });
        }

        Ok(Self {
            backends,
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
        })
    }

    /// Identifiers of every configured source.
    pub fn sources(&self) -> Vec<&str> {
        self.backends.iter().map(|b| b.dictionary.id()).collect()
    }

    /// `(identifier, display name)` of every configured source.
    pub fn source_names(&self) -> Vec<(&str, &str)> {
        self.backends
            .iter()
            .map(|b| (b.dictionary.id(), b.dictionary.name()))
            .collect()
    }

    /// Cache hit/miss counters per source.
    pub fn cache_stats(&self) -> HashMap<String, CacheStats> {
        self.backends
            .iter()
            .map(|b| (b.dictionary.id().to_string(), b.store.stats()))
            .collect()
    }

    /// Looks `term` up in every source, using cached payloads when present.
    pub async fn lookup(&self, term: &str) -> Result<AggregateResult, LookupError> {
        self.lookup_with(term, LookupOptions::default()).await
    }

    /// Looks `term` up in every source.
    ///
    /// When several sources fail, an arbitrary one of them is reported.
    pub async fn lookup_with(
        &self,
        term: &str,
        options: LookupOptions,
    ) -> Result<AggregateResult, LookupError> {
        let term = normalize_term(term).ok_or(LookupError::EmptyTerm)?;
        let cancel = options.cancel.unwrap_or_default();
        if cancel.is_cancelled() {
            return Err(LookupError::Cancelled);
        }

        let mut tasks = JoinSet::new();
        let mut task_sources: HashMap<task::Id, String> = HashMap::new();
        for backend in &self.backends {
            let dictionary = Arc::clone(&backend.dictionary);
            let store = Arc::clone(&backend.store);
            let permits = Arc::clone(&self.permits);
            let term = term.clone();
            let force_refresh = options.force_refresh;

            let handle = tasks.spawn(async move {
                let id = dictionary.id().to_string();
                let result =
                    lookup_one(dictionary.as_ref(), &store, &permits, &term, force_refresh).await;
                (id, result)
            });
            task_sources.insert(handle.id(), backend.dictionary.id().to_string());
        }

        let mut results = AggregateResult::with_capacity(self.backends.len());
        loop {
            let joined = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tasks.abort_all();
                    tracing::info!(term = %term, "lookup cancelled");
                    return Err(LookupError::Cancelled);
                }
                joined = tasks.join_next() => joined,
            };

            let Some(joined) = joined else {
                break;
            };

            match joined {
                Ok((id, Ok(html))) => {
                    results.insert(id, html);
                }
                Ok((_, Err(e))) => {
                    tasks.abort_all();
                    tracing::warn!(term = %term, error = %e, "lookup failed");
                    return Err(e);
                }
                Err(e) => {
                    tasks.abort_all();
                    let error = match task_sources.remove(&e.id()) {
                        Some(source_id) if e.is_panic() => LookupError::Source {
                            source_id,
                            kind: FailureKind::Panic,
                            message: e.to_string(),
                        },
                        _ => LookupError::Task(e.to_string()),
                    };
                    tracing::warn!(term = %term, error = %error, "lookup task failed");
                    return Err(error);
                }
            }
        }

        tracing::info!(term = %term, sources = results.len(), "lookup complete");
        Ok(results)
    }

    /// Closes every cache store.
    ///
    /// Every store is closed even if an earlier one fails; the first failure
    /// is returned.
    pub fn close(self) -> Result<(), LookupError> {
        let mut first_error = None;
        for backend in self.backends {
            let id = backend.dictionary.id().to_string();
            // Lookups that were aborted mid-flight may still hold a clone.
            let closed = match Arc::try_unwrap(backend.store) {
                Ok(store) => store.close(),
                Err(_) => {
                    tracing::debug!(source = %id, "store still shared, dropping handle");
                    Ok(())
                }
            };
            if let Err(e) = closed {
                tracing::warn!(source = %id, error = %e, "failed to close cache store");
                first_error.get_or_insert(LookupError::Store(e));
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

/// Runs search + render for one source under a concurrency permit.
async fn lookup_one(
    dictionary: &dyn Dictionary,
    store: &Arc<CacheStore>,
    permits: &Semaphore,
    term: &str,
    force_refresh: bool,
) -> Result<String, LookupError> {
    let _permit = permits
        .acquire()
        .await
        .map_err(|e| LookupError::Task(e.to_string()))?;

    let source_error = |kind: FailureKind, message: String| LookupError::Source {
        source_id: dictionary.id().to_string(),
        kind,
        message,
    };

    let outcome = search(dictionary, store, term, force_refresh)
        .await
        .map_err(|e| source_error(e.kind(), e.to_string()))?;

    tracing::debug!(
        source = dictionary.id(),
        term,
        from_cache = outcome.from_cache,
        "search finished"
    );

    outcome
        .document
        .render()
        .map_err(|e| source_error(FailureKind::Render, e.to_string()))
}

/// Trims and collapses whitespace; `None` for blank terms.
pub fn normalize_term(term: &str) -> Option<String> {
    let trimmed = term.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(WHITESPACE_REGEX.replace_all(trimmed, " ").into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dictionaries::ResultDocument;
    use crate::error::DictionaryError;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;

    #[derive(Clone, Copy)]
    enum Behavior {
        Succeed,
        FailFetch,
        FailParse,
        RenderNothing,
        Hang,
        Panic,
    }

    struct FakeDictionary {
        id: &'static str,
        behavior: Behavior,
        delay: Duration,
        fetches: AtomicUsize,
        in_flight: Arc<AtomicUsize>,
        max_in_flight: Arc<AtomicUsize>,
    }

    impl FakeDictionary {
        fn new(id: &'static str, behavior: Behavior) -> Arc<Self> {
            Self::build(id, behavior, Duration::ZERO, Arc::default(), Arc::default())
        }

        fn build(
            id: &'static str,
            behavior: Behavior,
            delay: Duration,
            in_flight: Arc<AtomicUsize>,
            max_in_flight: Arc<AtomicUsize>,
        ) -> Arc<Self> {
            Arc::new(Self {
                id,
                behavior,
                delay,
                fetches: AtomicUsize::new(0),
                in_flight,
                max_in_flight,
            })
        }

        fn fetches(&self) -> usize {
            self.fetches.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Dictionary for FakeDictionary {
        fn id(&self) -> &str {
            self.id
        }

        async fn fetch(&self, term: &str) -> Result<String, DictionaryError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);

            let result = match self.behavior {
                Behavior::FailFetch => Err(DictionaryError::Fetch("connection refused".into())),
                Behavior::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok(String::new())
                }
                _ => {
                    tokio::time::sleep(self.delay).await;
                    Ok(format!("<doc-{}:{}>", self.id, term))
                }
            };

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            result
        }

        fn parse(&self, term: &str, raw: &str) -> Result<ResultDocument, DictionaryError> {
            let sections = match self.behavior {
                Behavior::FailParse => {
                    return Err(DictionaryError::Parse("malformed entry".into()));
                }
                Behavior::RenderNothing => Vec::new(),
                Behavior::Panic => vec![raw[raw.len() + 1..].to_string()],
                _ => vec![raw.to_string()],
            };
            Ok(ResultDocument {
                source: self.id.to_string(),
                term: term.to_string(),
                headword: None,
                sections,
            })
        }
    }

    fn aggregator(dictionaries: &[Arc<FakeDictionary>]) -> Aggregator {
        let parts = dictionaries
            .iter()
            .map(|d| {
                let store = CacheStore::open_in_memory(d.id).unwrap();
                (Arc::clone(d) as Arc<dyn Dictionary>, store)
            })
            .collect();
        Aggregator::from_parts(parts, 8).unwrap()
    }

    fn three_succeeding() -> Vec<Arc<FakeDictionary>> {
        vec![
            FakeDictionary::new("alpha", Behavior::Succeed),
            FakeDictionary::new("beta", Behavior::Succeed),
            FakeDictionary::new("gamma", Behavior::Succeed),
        ]
    }

    #[test]
    fn test_normalize_term() {
        assert_eq!(normalize_term("  run  "), Some("run".to_string()));
        assert_eq!(normalize_term("look \t  up"), Some("look up".to_string()));
        assert_eq!(normalize_term(""), None);
        assert_eq!(normalize_term(" \n\t "), None);
    }

    #[tokio::test]
    async fn test_all_sources_succeed() {
        let dictionaries = three_succeeding();
        let aggregator = aggregator(&dictionaries);

        let result = aggregator.lookup("run").await.unwrap();

        let keys: HashSet<&str> = result.keys().map(String::as_str).collect();
        assert_eq!(keys, HashSet::from(["alpha", "beta", "gamma"]));
        for id in ["alpha", "beta", "gamma"] {
            assert!(result[id].contains(&format!("<doc-{}:run>", id)));
        }
    }

    #[tokio::test]
    async fn test_one_failing_source_fails_lookup() {
        let dictionaries = vec![
            FakeDictionary::new("alpha", Behavior::Succeed),
            FakeDictionary::new("beta", Behavior::FailFetch),
            FakeDictionary::new("gamma", Behavior::Succeed),
        ];
        let aggregator = aggregator(&dictionaries);

        for _ in 0..2 {
            let err = aggregator.lookup("run").await.unwrap_err();
            match err {
                LookupError::Source {
                    source_id, kind, ..
                } => {
                    assert_eq!(source_id, "beta");
                    assert_eq!(kind, FailureKind::Fetch);
                }
                other => panic!("unexpected error: {other}"),
            }
        }
    }

    #[tokio::test]
    async fn test_parse_and_render_failures_are_classified() {
        let aggregator = aggregator(&[FakeDictionary::new("alpha", Behavior::FailParse)]);
        let err = aggregator.lookup("run").await.unwrap_err();
        assert!(matches!(err, LookupError::Source { kind: FailureKind::Parse, .. }));

        let aggregator = aggregator_with_render_failure();
        let err = aggregator.lookup("run").await.unwrap_err();
        assert!(matches!(err, LookupError::Source { kind: FailureKind::Render, .. }));
        assert_eq!(err.source_id(), Some("gamma"));
    }

    fn aggregator_with_render_failure() -> Aggregator {
        aggregator(&[
            FakeDictionary::new("alpha", Behavior::Succeed),
            FakeDictionary::new("gamma", Behavior::RenderNothing),
        ])
    }

    #[tokio::test]
    async fn test_panicking_source_is_named() {
        let aggregator = aggregator(&[
            FakeDictionary::new("alpha", Behavior::Succeed),
            FakeDictionary::new("beta", Behavior::Panic),
        ]);

        let err = aggregator.lookup("run").await.unwrap_err();
        match err {
            LookupError::Source {
                source_id, kind, ..
            } => {
                assert_eq!(source_id, "beta");
                assert_eq!(kind, FailureKind::Panic);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_source_names() {
        let aggregator = aggregator(&[FakeDictionary::new("alpha", Behavior::Succeed)]);
        assert_eq!(aggregator.source_names(), vec![("alpha", "alpha")]);
    }

    #[tokio::test]
    async fn test_cached_source_is_not_fetched() {
        let dictionaries = three_succeeding();
        let alpha_store = CacheStore::open_in_memory("alpha").unwrap();
        alpha_store.put("run", "<doc-alpha:cached>").unwrap();

        let mut parts: Vec<(Arc<dyn Dictionary>, CacheStore)> =
            vec![(Arc::clone(&dictionaries[0]) as Arc<dyn Dictionary>, alpha_store)];
        for d in &dictionaries[1..] {
            parts.push((
                Arc::clone(d) as Arc<dyn Dictionary>,
                CacheStore::open_in_memory(d.id).unwrap(),
            ));
        }
        let aggregator = Aggregator::from_parts(parts, 8).unwrap();

        let result = aggregator.lookup("run").await.unwrap();
        assert!(result["alpha"].contains("<doc-alpha:cached>"));
        assert_eq!(dictionaries[0].fetches(), 0);
        assert_eq!(dictionaries[1].fetches(), 1);
        assert_eq!(aggregator.cache_stats()["alpha"].hits, 1);
    }

    #[tokio::test]
    async fn test_repeated_lookup_hits_cache() {
        let dictionaries = three_succeeding();
        let aggregator = aggregator(&dictionaries);

        let first = aggregator.lookup("run").await.unwrap();
        let second = aggregator.lookup("run").await.unwrap();

        assert_eq!(first, second);
        for d in &dictionaries {
            assert_eq!(d.fetches(), 1);
        }
    }

    #[tokio::test]
    async fn test_force_refresh_refetches() {
        let dictionaries = three_succeeding();
        let aggregator = aggregator(&dictionaries);

        aggregator.lookup("run").await.unwrap();
        let options = LookupOptions {
            force_refresh: true,
            ..Default::default()
        };
        aggregator.lookup_with("run", options).await.unwrap();

        for d in &dictionaries {
            assert_eq!(d.fetches(), 2);
        }
    }

    #[tokio::test]
    async fn test_empty_term_short_circuits() {
        let dictionaries = three_succeeding();
        let aggregator = aggregator(&dictionaries);

        assert!(matches!(aggregator.lookup("   ").await, Err(LookupError::EmptyTerm)));
        assert!(dictionaries.iter().all(|d| d.fetches() == 0));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_lookups_do_not_mix_results() {
        let aggregator = Arc::new(aggregator(&three_succeeding()));
        let terms = ["run", "walk", "swim", "jump", "fly", "crawl"];

        let mut handles = Vec::new();
        for term in terms {
            let aggregator = Arc::clone(&aggregator);
            handles.push(tokio::spawn(async move {
                (term, aggregator.lookup(term).await)
            }));
        }

        for handle in handles {
            let (term, result) = handle.await.unwrap();
            let result = result.unwrap();
            assert_eq!(result.len(), 3);
            for (id, html) in &result {
                assert!(html.contains(&format!("<doc-{}:{}>", id, term)));
            }
        }
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let max_in_flight = Arc::new(AtomicUsize::new(0));
        let dictionaries: Vec<Arc<FakeDictionary>> = ["a", "b", "c", "d"]
            .into_iter()
            .map(|id| {
                FakeDictionary::build(
                    id,
                    Behavior::Succeed,
                    Duration::from_millis(20),
                    Arc::clone(&in_flight),
                    Arc::clone(&max_in_flight),
                )
            })
            .collect();

        let parts = dictionaries
            .iter()
            .map(|d| {
                (
                    Arc::clone(d) as Arc<dyn Dictionary>,
                    CacheStore::open_in_memory(d.id).unwrap(),
                )
            })
            .collect();
        let aggregator = Aggregator::from_parts(parts, 2).unwrap();

        let result = aggregator.lookup("run").await.unwrap();
        assert_eq!(result.len(), 4);
        assert!(max_in_flight.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_cancellation_aborts_lookup() {
        let dictionaries = vec![
            FakeDictionary::new("alpha", Behavior::Succeed),
            FakeDictionary::new("slow", Behavior::Hang),
        ];
        let aggregator = aggregator(&dictionaries);

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let options = LookupOptions {
            force_refresh: false,
            cancel: Some(cancel),
        };
        let err = aggregator.lookup_with("run", options).await.unwrap_err();
        assert!(matches!(err, LookupError::Cancelled));
    }

    #[tokio::test]
    async fn test_already_cancelled_token() {
        let dictionaries = three_succeeding();
        let aggregator = aggregator(&dictionaries);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let options = LookupOptions {
            cancel: Some(cancel),
            ..Default::default()
        };
        assert!(matches!(
            aggregator.lookup_with("run", options).await,
            Err(LookupError::Cancelled)
        ));
        assert!(dictionaries.iter().all(|d| d.fetches() == 0));
    }

    #[test]
    fn test_mismatched_store_rejected() {
        let alpha = FakeDictionary::new("alpha", Behavior::Succeed);
        let store = CacheStore::open_in_memory("beta").unwrap();
        let result = Aggregator::from_parts(vec![(alpha as Arc<dyn Dictionary>, store)], 1);
        assert!(matches!(result, Err(LookupError::Store(_))));
    }

    #[test]
    fn test_unavailable_store_fails_construction() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "x").unwrap();

        let mut registry = DictionaryRegistry::new();
        registry
            .register(FakeDictionary::new("alpha", Behavior::Succeed))
            .unwrap();

        let result = Aggregator::new(registry, &blocker, 4);
        assert!(matches!(
            result,
            Err(LookupError::Store(CacheError::StoreUnavailable { .. }))
        ));
    }

    #[tokio::test]
    async fn test_close_after_lookup() {
        let dir = TempDir::new().unwrap();
        let mut registry = DictionaryRegistry::new();
        for d in three_succeeding() {
            registry.register(d).unwrap();
        }

        let aggregator = Aggregator::new(registry, dir.path(), 4).unwrap();
        assert_eq!(aggregator.sources(), vec!["alpha", "beta", "gamma"]);
        aggregator.lookup("run").await.unwrap();
        aggregator.close().unwrap();

        assert!(dir.path().join("alpha.db").exists());
        let reopened = CacheStore::open("alpha", dir.path()).unwrap();
        assert!(reopened.get("run").unwrap().is_some());
    }
}
