// src/ingest/mod.rs
pub mod article;
pub mod config;
pub mod index;
pub mod providers;
pub mod types;

use anyhow::{Context, Result};
use metrics::{counter, describe_counter, describe_histogram, histogram};
use once_cell::sync::OnceCell;
use regex::Regex;

use crate::ingest::index::HeadlineIndex;
use crate::ingest::types::{remove_www, NewsProvider, NewsQuery};

/// One-time metrics registration (so series show up on /metrics).
pub(crate) fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "news_items_fetched_total",
            "News items returned by providers (both query forms)."
        );
        describe_counter!(
            "articles_fetched_total",
            "Full articles retrieved and extracted."
        );
        describe_counter!(
            "articles_dropped_total",
            "Curated articles that could not be retrieved."
        );
        describe_histogram!("news_fetch_ms", "Provider search time in milliseconds.");
    });
}

/// Canonical lookup key for a headline: every run of non-word characters
/// becomes a single `_`, then the result is lowercased.
///
/// Leading/trailing separators are kept, so `"Acme!"` and `"Acme"` differ.
pub fn normalize_key(s: &str) -> String {
    static RE_NON_WORD: OnceCell<Regex> = OnceCell::new();
    let re = RE_NON_WORD.get_or_init(|| Regex::new(r"\W+").unwrap());
    re.replace_all(s, "_").to_lowercase()
}

/// Clean scraped text: decode entities, strip tags, ASCII quotes, collapse whitespace.
pub fn clean_text(s: &str) -> String {
    let mut out = html_escape::decode_html_entities(s).to_string();

    static RE_TAGS: OnceCell<Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, "").to_string();

    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    static RE_WS: OnceCell<Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| Regex::new(r"\s+").unwrap());
    re_ws.replace_all(&out, " ").trim().to_string()
}

/// Run both news queries for one competitor and index the results.
///
/// Provider errors are not retried; they fail the competitor.
pub async fn gather_headlines(
    provider: &dyn NewsProvider,
    competitor_name: &str,
    website: &str,
) -> Result<HeadlineIndex> {
    ensure_metrics_described();

    let company_q = NewsQuery::Company(competitor_name.to_string());
    let site_q = NewsQuery::Site(remove_www(website).to_string());

    let t0 = std::time::Instant::now();
    let company_items = provider
        .search(&company_q)
        .await
        .with_context(|| format!("{} company search for {competitor_name}", provider.name()))?;
    let site_items = provider
        .search(&site_q)
        .await
        .with_context(|| format!("{} site search for {website}", provider.name()))?;
    histogram!("news_fetch_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);

    counter!("news_items_fetched_total")
        .increment((company_items.len() + site_items.len()) as u64);
    tracing::debug!(
        competitor = competitor_name,
        company = company_items.len(),
        site = site_items.len(),
        "news search done"
    );

    Ok(HeadlineIndex::build(company_items, site_items))
}
