//! Merriam-Webster (merriam-webster.com) dictionary backend.

use super::{Dictionary, ResultDocument, extract_document, entry_url, fetch_page};
use crate::error::DictionaryError;
use async_trait::async_trait;
use scraper::Selector;
use std::sync::LazyLock;

const BASE_URL: &str = "https://www.merriam-webster.com/dictionary/";

/// CSS selectors used for parsing.
struct Selectors {
    /// Headword of the first entry.
    headword: Selector,
    /// One block per part-of-speech entry.
    entry: Selector,
}

static SELECTORS: LazyLock<Selectors> = LazyLock::new(|| Selectors {
    headword: Selector::parse("h1.hword").expect("valid headword selector"),
    entry: Selector::parse("div[id^=\"dictionary-entry-\"]").expect("valid entry selector"),
});

/// Merriam-Webster English dictionary.
pub struct WebsterDictionary {
    client: reqwest::Client,
    delay_sec: f64,
}

impl WebsterDictionary {
    /// Creates a backend sharing the given HTTP client.
    pub fn new(client: reqwest::Client, delay_sec: f64) -> Self {
        Self { client, delay_sec }
    }
}

#[async_trait]
impl Dictionary for WebsterDictionary {
    fn id(&self) -> &str {
        "webster"
    }

    fn name(&self) -> &str {
        "Merriam-Webster"
    }

    fn cache_key(&self, term: &str) -> String {
        term.trim().to_lowercase()
    }

    async fn fetch(&self, term: &str) -> Result<String, DictionaryError> {
        let url = entry_url(BASE_URL, term)?;
        fetch_page(&self.client, url, term, self.delay_sec).await
    }

    fn parse(&self, term: &str, raw: &str) -> Result<ResultDocument, DictionaryError> {
        extract_document(self.id(), term, raw, &SELECTORS.headword, &SELECTORS.entry)
    }
}
