//! Dictionary trait and common types for dictionary backends.
//!
//! This module defines the interface that every backend implements, the
//! normalized [`ResultDocument`] they produce, and the cache-first
//! [`search`] routine shared by all of them.

mod cambridge;
mod soha;
mod webster;

pub use cambridge::CambridgeDictionary;
pub use soha::SohaDictionary;
pub use webster::WebsterDictionary;

use crate::cache::CacheStore;
use crate::config::LookupConfig;
use crate::error::{DictionaryError, LookupError, RenderError};
use async_trait::async_trait;
use scraper::{Html, Selector};
use serde::Serialize;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// The dictionary sources shipped with omnidict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceId {
    Webster,
    Cambridge,
    Soha,
}

impl SourceId {
    /// Every built-in source, in default order.
    pub const ALL: [SourceId; 3] = [SourceId::Webster, SourceId::Cambridge, SourceId::Soha];

    /// Stable identifier used for cache files and result keys.
    pub fn as_str(self) -> &'static str {
        match self {
            SourceId::Webster => "webster",
            SourceId::Cambridge => "cambridge",
            SourceId::Soha => "soha",
        }
    }
}

impl std::fmt::Display for SourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "webster" => Ok(SourceId::Webster),
            "cambridge" => Ok(SourceId::Cambridge),
            "soha" => Ok(SourceId::Soha),
            other => Err(format!("unknown dictionary source: {}", other)),
        }
    }
}

/// Normalized output of one backend's search for one term.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResultDocument {
    /// Identifier of the source that produced this document.
    pub source: String,

    /// The term as it was looked up.
    pub term: String,

    /// Headword as printed by the source, when it has one.
    pub headword: Option<String>,

    /// HTML fragments making up the entry body.
    pub sections: Vec<String>,
}

impl ResultDocument {
    /// Renders the document as an HTML fragment ready for display.
    pub fn render(&self) -> Result<String, RenderError> {
        if self.sections.iter().all(|s| s.trim().is_empty()) {
            return Err(RenderError::Empty(self.term.clone()));
        }

        let mut html = format!(
            "<div class=\"dict-entry\" data-source=\"{}\">",
            escape_html(&self.source)
        );
        if let Some(headword) = &self.headword {
            html.push_str(&format!("<h2 class=\"headword\">{}</h2>", escape_html(headword)));
        }
        for section in self.sections.iter().filter(|s| !s.trim().is_empty()) {
            html.push_str(section);
        }
        html.push_str("</div>");
        Ok(html)
    }
}

/// Trait for dictionary backends.
///
/// Each implementation handles one external source. Implementations only
/// know how to fetch and parse; caching is handled by [`search`].
#[async_trait]
pub trait Dictionary: Send + Sync {
    /// Stable source identifier, unique within a registry.
    fn id(&self) -> &str;

    /// Human-readable name of this dictionary.
    fn name(&self) -> &str {
        self.id()
    }

    /// Key under which this dictionary's payload for `term` is cached.
    ///
    /// Case is preserved by default; case-insensitive sources fold it.
    fn cache_key(&self, term: &str) -> String {
        term.trim().to_string()
    }

    /// Fetches the raw payload for `term` from the remote source.
    async fn fetch(&self, term: &str) -> Result<String, DictionaryError>;

    /// Parses a raw payload (fresh or cached) into a document.
    fn parse(&self, term: &str, raw: &str) -> Result<ResultDocument, DictionaryError>;
}

/// Outcome of a single backend search.
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    /// Raw payload the document was parsed from.
    pub raw: String,

    /// The parsed document.
    pub document: ResultDocument,

    /// Whether the payload came from the cache.
    pub from_cache: bool,
}

/// Searches `dictionary` for `term`, preferring the cached payload.
///
/// Cache read faults fall through to a fresh fetch and cache write faults are
/// only logged; neither fails the search.
pub async fn search(
    dictionary: &dyn Dictionary,
    store: &Arc<CacheStore>,
    term: &str,
    force_refresh: bool,
) -> Result<SearchOutcome, DictionaryError> {
    let key = dictionary.cache_key(term);

    if !force_refresh {
        match store.get_async(&key).await {
            Ok(Some(raw)) => {
                let document = dictionary.parse(term, &raw)?;
                return Ok(SearchOutcome {
                    raw,
                    document,
                    from_cache: true,
                });
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(source = dictionary.id(), term, error = %e, "cache read failed, fetching");
            }
        }
    }

    let raw = dictionary.fetch(term).await?;
    let document = dictionary.parse(term, &raw)?;

    if let Err(e) = store.put_async(&key, &raw).await {
        tracing::warn!(source = dictionary.id(), term, error = %e, "cache write failed");
    }

    Ok(SearchOutcome {
        raw,
        document,
        from_cache: false,
    })
}

/// Registry of configured dictionaries.
#[derive(Default)]
pub struct DictionaryRegistry {
    dictionaries: Vec<Arc<dyn Dictionary>>,
}

impl DictionaryRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding the given built-in sources.
    pub fn with_sources(
        sources: &[SourceId],
        config: &LookupConfig,
    ) -> Result<Self, LookupError> {
        let client = create_http_client(Duration::from_secs(config.request_timeout_sec))
            .map_err(|e| LookupError::Task(format!("failed to build HTTP client: {}", e)))?;
        let delay = config.delay_between_requests_sec;

        let mut registry = Self::new();
        for source in sources {
            let dictionary: Arc<dyn Dictionary> = match source {
                SourceId::Webster => Arc::new(WebsterDictionary::new(client.clone(), delay)),
                SourceId::Cambridge => Arc::new(CambridgeDictionary::new(client.clone(), delay)),
                SourceId::Soha => Arc::new(SohaDictionary::new(client.clone(), delay)),
            };
            registry.register(dictionary)?;
        }
        Ok(registry)
    }

    /// Adds a dictionary. Identifiers must be unique.
    pub fn register(&mut self, dictionary: Arc<dyn Dictionary>) -> Result<(), LookupError> {
        if self.get(dictionary.id()).is_some() {
            return Err(LookupError::DuplicateSource(dictionary.id().to_string()));
        }
        self.dictionaries.push(dictionary);
        Ok(())
    }

    /// Finds a dictionary by identifier.
    pub fn get(&self, id: &str) -> Option<&Arc<dyn Dictionary>> {
        self.dictionaries.iter().find(|d| d.id() == id)
    }

    /// Returns all registered dictionaries.
    pub fn all(&self) -> &[Arc<dyn Dictionary>] {
        &self.dictionaries
    }

    pub fn len(&self) -> usize {
        self.dictionaries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dictionaries.is_empty()
    }
}

/// Common HTTP client configuration for dictionaries.
pub fn create_http_client(timeout: Duration) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36")
        .timeout(timeout)
        .build()
}

/// Applies rate limiting delay.
pub async fn rate_limit(delay_sec: f64) {
    if delay_sec > 0.0 {
        tokio::time::sleep(Duration::from_secs_f64(delay_sec)).await;
    }
}

/// Builds `base` + the term as a single percent-encoded path segment.
pub(crate) fn entry_url(base: &str, term: &str) -> Result<url::Url, DictionaryError> {
    let mut url =
        url::Url::parse(base).map_err(|e| DictionaryError::Fetch(format!("bad base URL: {}", e)))?;
    url.path_segments_mut()
        .map_err(|_| DictionaryError::Fetch(format!("base URL cannot take a path: {}", base)))?
        .pop_if_empty()
        .push(term.trim());
    Ok(url)
}

/// Fetches a page body, mapping 404 to [`DictionaryError::NotFound`].
pub(crate) async fn fetch_page(
    client: &reqwest::Client,
    url: url::Url,
    term: &str,
    delay_sec: f64,
) -> Result<String, DictionaryError> {
    rate_limit(delay_sec).await;

    tracing::debug!(%url, "fetching dictionary page");
    let response = client.get(url).send().await?;
    let status = response.status();

    if status == reqwest::StatusCode::NOT_FOUND {
        return Err(DictionaryError::NotFound(term.to_string()));
    }
    if !status.is_success() {
        return Err(DictionaryError::Fetch(format!("HTTP {}", status)));
    }

    Ok(response.text().await?)
}

/// Extracts a document from `raw` using a headword and a section selector.
pub(crate) fn extract_document(
    source: &str,
    term: &str,
    raw: &str,
    headword: &Selector,
    sections: &Selector,
) -> Result<ResultDocument, DictionaryError> {
    let html = Html::parse_document(raw);

    let sections: Vec<String> = html
        .select(sections)
        .map(|elem| elem.html())
        .filter(|fragment| !fragment.trim().is_empty())
        .collect();

    if sections.is_empty() {
        return Err(DictionaryError::Parse(format!(
            "no entry for '{}' in {} page",
            term.trim(),
            source
        )));
    }

    let headword = html
        .select(headword)
        .next()
        .map(|elem| elem.text().collect::<String>().trim().to_string())
        .filter(|text| !text.is_empty());

    Ok(ResultDocument {
        source: source.to_string(),
        term: term.trim().to_string(),
        headword,
        sections,
    })
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
