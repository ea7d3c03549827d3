//! Soha (tratu.soha.vn) English-Vietnamese dictionary backend.

use super::{Dictionary, ResultDocument, extract_document, entry_url, fetch_page};
use crate::error::DictionaryError;
use async_trait::async_trait;
use scraper::Selector;
use std::sync::LazyLock;

const BASE_URL: &str = "http://tratu.soha.vn/dict/en_vn/";

struct Selectors {
    headword: Selector,
    entry: Selector,
}

static SELECTORS: LazyLock<Selectors> = LazyLock::new(|| Selectors {
    headword: Selector::parse("#firstHeading").expect("valid headword selector"),
    entry: Selector::parse("#show-alter .section-h2").expect("valid entry selector"),
});

/// Soha English-Vietnamese dictionary.
pub struct SohaDictionary {
    client: reqwest::Client,
    delay_sec: f64,
}

impl SohaDictionary {
    pub fn new(client: reqwest::Client, delay_sec: f64) -> Self {
        Self { client, delay_sec }
    }
}

#[async_trait]
impl Dictionary for SohaDictionary {
    fn id(&self) -> &str {
        "soha"
    }

    fn name(&self) -> &str {
        "Soha Tra Từ"
    }

    async fn fetch(&self, term: &str) -> Result<String, DictionaryError> {
        // Soha titles its pages with a capitalised first letter.
        let url = entry_url(BASE_URL, &capitalize(term.trim()))?;
        fetch_page(&self.client, url, term, self.delay_sec).await
    }

    fn parse(&self, term: &str, raw: &str) -> Result<ResultDocument, DictionaryError> {
        extract_document(self.id(), term, raw, &SELECTORS.headword, &SELECTORS.entry)
    }
}

fn capitalize(term: &str) -> String {
    let mut chars = term.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
