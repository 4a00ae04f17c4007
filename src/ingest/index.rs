// src/ingest/index.rs
//! Headline deduplication index: normalized title -> source item.

use std::collections::HashMap;

use crate::ingest::normalize_key;
use crate::ingest::types::NewsItem;

/// Per-competitor lookup table plus the flat candidate list sent to curation.
///
/// Build order is company-name results first, then site results, so on a key
/// collision the site item is the one kept.
#[derive(Debug, Clone, Default)]
pub struct HeadlineIndex {
    entries: HashMap<String, NewsItem>,
    candidates: Vec<String>,
}

impl HeadlineIndex {
    pub fn build(company_items: Vec<NewsItem>, site_items: Vec<NewsItem>) -> Self {
        let mut idx = Self {
            entries: HashMap::with_capacity(company_items.len() + site_items.len()),
            candidates: Vec::with_capacity(company_items.len() + site_items.len()),
        };
        for item in company_items.into_iter().chain(site_items) {
            idx.insert(item);
        }
        idx
    }

    fn insert(&mut self, item: NewsItem) {
        self.candidates.push(item.title.clone());
        self.entries.insert(normalize_key(&item.title), item);
    }

    pub fn get(&self, key: &str) -> Option<&NewsItem> {
        self.entries.get(key)
    }

    /// Titles in concatenation order, duplicates included.
    pub fn candidates(&self) -> &[String] {
        &self.candidates
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
