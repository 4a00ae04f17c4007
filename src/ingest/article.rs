// src/ingest/article.rs
//! Best-effort full-article retrieval. Failures come back as `ArticleOutcome::Absent`.

use async_trait::async_trait;
use metrics::counter;
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use serde::Serialize;
use std::time::Duration;

use crate::config::research::ArticleSettings;
use crate::ingest::clean_text;
use crate::ingest::types::NewsItem;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FetchedArticle {
    pub item: NewsItem,
    pub title: String,
    pub text: String,
}

/// Why an article was left out of the aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum ArticleFailure {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("http status {0}")]
    Status(u16),
    #[error("no article text could be extracted")]
    Empty,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ArticleOutcome {
    Fetched(FetchedArticle),
    Absent { item: NewsItem, reason: ArticleFailure },
}

impl ArticleOutcome {
    pub fn article(&self) -> Option<&FetchedArticle> {
        match self {
            ArticleOutcome::Fetched(a) => Some(a),
            ArticleOutcome::Absent { .. } => None,
        }
    }
}

#[async_trait]
pub trait ArticleFetcher: Send + Sync {
    async fn fetch(&self, item: &NewsItem) -> ArticleOutcome;
}

/// Fetch items in order; one failed item never affects the others.
pub async fn fetch_all(fetcher: &dyn ArticleFetcher, items: &[NewsItem]) -> Vec<ArticleOutcome> {
    super::ensure_metrics_described();
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        let outcome = fetcher.fetch(item).await;
        match &outcome {
            ArticleOutcome::Fetched(_) => counter!("articles_fetched_total").increment(1),
            ArticleOutcome::Absent { item, reason } => {
                tracing::warn!(url = %item.url, reason = %reason, "article skipped");
                counter!("articles_dropped_total").increment(1);
            }
        }
        out.push(outcome);
    }
    out
}

/// reqwest + scraper implementation.
pub struct HttpArticleFetcher {
    client: reqwest::Client,
    max_chars: usize,
}

impl HttpArticleFetcher {
    pub fn new(settings: &ArticleSettings) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent("Mozilla/5.0 (compatible; competitor-research/0.1)")
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            max_chars: settings.max_chars,
        })
    }

    async fn download(&self, url: &str) -> Result<String, ArticleFailure> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ArticleFailure::Transport(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ArticleFailure::Status(status.as_u16()));
        }
        resp.text()
            .await
            .map_err(|e| ArticleFailure::Transport(e.to_string()))
    }
}

#[async_trait]
impl ArticleFetcher for HttpArticleFetcher {
    async fn fetch(&self, item: &NewsItem) -> ArticleOutcome {
        let extracted = match self.download(&item.url).await {
            Ok(html) => extract_article(&html, self.max_chars),
            Err(reason) => {
                return ArticleOutcome::Absent {
                    item: item.clone(),
                    reason,
                }
            }
        };
        match extracted {
            Some((title, text)) => ArticleOutcome::Fetched(FetchedArticle {
                item: item.clone(),
                title: title.unwrap_or_else(|| item.title.clone()),
                text,
            }),
            None => ArticleOutcome::Absent {
                item: item.clone(),
                reason: ArticleFailure::Empty,
            },
        }
    }
}

static SEL_OG_TITLE: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"meta[property="og:title"]"#).unwrap());
static SEL_TITLE: Lazy<Selector> = Lazy::new(|| Selector::parse("title").unwrap());
static SEL_H1: Lazy<Selector> = Lazy::new(|| Selector::parse("h1").unwrap());
static SEL_ARTICLE: Lazy<Selector> = Lazy::new(|| Selector::parse("article").unwrap());
static SEL_P: Lazy<Selector> = Lazy::new(|| Selector::parse("p").unwrap());

/// Pull (title, body) out of an HTML page. Returns `None` when no paragraph text exists.
///
/// Body is the `<p>` text inside `<article>` when present, else every `<p>` in the page,
/// one paragraph per line, cut at `max_chars` characters.
pub fn extract_article(html: &str, max_chars: usize) -> Option<(Option<String>, String)> {
    let doc = Html::parse_document(html);

    let title = doc
        .select(&SEL_OG_TITLE)
        .filter_map(|m| m.value().attr("content"))
        .map(clean_text)
        .find(|t| !t.is_empty())
        .or_else(|| {
            doc.select(&SEL_TITLE)
                .chain(doc.select(&SEL_H1))
                .map(|el| clean_text(&el.text().collect::<String>()))
                .find(|t| !t.is_empty())
        });

    let paragraphs: Vec<String> = match doc.select(&SEL_ARTICLE).next() {
        Some(article) => article
            .select(&SEL_P)
            .map(|p| clean_text(&p.text().collect::<String>()))
            .filter(|t| !t.is_empty())
            .collect(),
        None => doc
            .select(&SEL_P)
            .map(|p| clean_text(&p.text().collect::<String>()))
            .filter(|t| !t.is_empty())
            .collect(),
    };
    if paragraphs.is_empty() {
        return None;
    }

    let mut text = paragraphs.join("\n");
    if text.chars().count() > max_chars {
        text = text.chars().take(max_chars).collect();
    }
    Some((title, text))
}
