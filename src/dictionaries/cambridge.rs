//! Cambridge (dictionary.cambridge.org) English dictionary backend.

use super::{Dictionary, ResultDocument, extract_document, entry_url, fetch_page};
use crate::error::DictionaryError;
use async_trait::async_trait;
use scraper::Selector;
use std::sync::LazyLock;

const BASE_URL: &str = "https://dictionary.cambridge.org/dictionary/english/";

struct Selectors {
    headword: Selector,
    entry: Selector,
}

static SELECTORS: LazyLock<Selectors> = LazyLock::new(|| Selectors {
    headword: Selector::parse(".di-title .headword").expect("valid headword selector"),
    entry: Selector::parse(".pr.entry-body__el").expect("valid entry selector"),
});

/// Cambridge English dictionary.
pub struct CambridgeDictionary {
    client: reqwest::Client,
    delay_sec: f64,
}

impl CambridgeDictionary {
    pub fn new(client: reqwest::Client, delay_sec: f64) -> Self {
        Self { client, delay_sec }
    }
}

#[async_trait]
impl Dictionary for CambridgeDictionary {
    fn id(&self) -> &str {
        "cambridge"
    }

    fn name(&self) -> &str {
        "Cambridge Dictionary"
    }

    fn cache_key(&self, term: &str) -> String {
        term.trim().to_lowercase()
    }

    async fn fetch(&self, term: &str) -> Result<String, DictionaryError> {
        // Cambridge redirects unknown words to the search landing page
        // instead of answering 404.
        let url = entry_url(BASE_URL, &term.trim().to_lowercase())?;
        fetch_page(&self.client, url, term, self.delay_sec).await
    }

    fn parse(&self, term: &str, raw: &str) -> Result<ResultDocument, DictionaryError> {
        extract_document(self.id(), term, raw, &SELECTORS.headword, &SELECTORS.entry)
    }
}
