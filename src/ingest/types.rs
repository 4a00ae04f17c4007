// src/ingest/types.rs
use anyhow::Result;

/// One search hit as returned by a news provider.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct NewsItem {
    pub title: String,
    pub url: String,
    pub published_date: String, // provider text, e.g. RFC 2822 from RSS
}

impl NewsItem {
    pub fn new(title: impl Into<String>, url: impl Into<String>, date: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            published_date: date.into(),
        }
    }
}

/// The two query shapes a news provider must answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NewsQuery {
    /// Free-text search on the company name.
    Company(String),
    /// `site:` restricted search on the competitor's domain (already `www.`-stripped).
    Site(String),
}

impl NewsQuery {
    pub fn as_search_terms(&self) -> String {
        match self {
            NewsQuery::Company(name) => name.clone(),
            NewsQuery::Site(domain) => format!("site:{domain}"),
        }
    }
}

#[async_trait::async_trait]
pub trait NewsProvider: Send + Sync {
    /// Recent items for `query`, newest-first as the provider returns them, capped by config.
    async fn search(&self, query: &NewsQuery) -> Result<Vec<NewsItem>>;
    fn name(&self) -> &'static str;
}

/// Strip a leading `www.` only. Scheme, case and trailing slashes are left alone.
pub fn remove_www(url: &str) -> &str {
    url.strip_prefix("www.").unwrap_or(url)
}
